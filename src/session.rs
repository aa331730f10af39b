use crate::auth::generate_token;
use crate::config::Config;
use crate::db::{parse_timestamp, timestamp, DbConnection};
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use cookie::time;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    #[serde(rename = "type")]
    pub kind: FlashKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    pub is_auth: bool,
    pub username: Option<String>,
    pub flash: Option<Flash>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
    persisted: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: generate_token(),
            data: SessionData::default(),
            expires_at: Utc::now() + Duration::hours(SESSION_TTL_HOURS),
            persisted: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.is_auth
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn username(&self) -> Option<&str> {
        self.data.username.as_deref()
    }

    /// Loads a live session. Expired rows are deleted and reported as absent.
    pub async fn load(conn: &DbConnection, id: &str) -> Result<Option<Session>> {
        let guard = conn.lock().await;
        let row = guard
            .query_row(
                "SELECT data, expires_at FROM sessions WHERE id = ?",
                [id],
                |row| Ok((row.get::<_, String>(0)?, parse_timestamp(row, 1)?)),
            )
            .optional()?;

        let Some((data, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= Utc::now() {
            guard.execute("DELETE FROM sessions WHERE id = ?", [id])?;
            debug!("Dropped expired session");
            return Ok(None);
        }

        Ok(Some(Session {
            id: id.to_string(),
            data: serde_json::from_str(&data)?,
            expires_at,
            persisted: true,
        }))
    }

    pub async fn save(&mut self, conn: &DbConnection) -> Result<()> {
        self.expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        let data = serde_json::to_string(&self.data)?;

        conn.lock().await.execute(
            "INSERT INTO sessions (id, data, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, expires_at = excluded.expires_at",
            params![self.id, data, timestamp(self.expires_at)],
        )?;

        self.persisted = true;
        Ok(())
    }

    pub async fn destroy(self, conn: &DbConnection) -> Result<()> {
        if self.persisted {
            conn.lock()
                .await
                .execute("DELETE FROM sessions WHERE id = ?", [&self.id])?;
        }
        Ok(())
    }

    pub async fn regenerate(self, conn: &DbConnection) -> Result<Session> {
        self.destroy(conn).await?;
        Ok(Session::new())
    }

    pub fn flash(&mut self, kind: FlashKind, text: impl Into<String>) {
        self.data.flash = Some(Flash {
            kind,
            text: text.into(),
        });
    }

    pub fn take_flash(&mut self) -> Option<Flash> {
        self.data.flash.take()
    }

    pub fn cookie(&self, config: &Config) -> Cookie<'static> {
        Cookie::build((config.session_name.clone(), self.id.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.production)
            .max_age(time::Duration::hours(SESSION_TTL_HOURS))
            .build()
    }

    pub fn removal_cookie(config: &Config) -> Cookie<'static> {
        Cookie::build((config.session_name.clone(), String::new()))
            .path("/")
            .build()
    }
}

pub async fn purge_expired(conn: &DbConnection) -> Result<usize> {
    let purged = conn.lock().await.execute(
        "DELETE FROM sessions WHERE expires_at <= ?",
        [timestamp(Utc::now())],
    )?;
    Ok(purged)
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        if let Some(cookie) = jar.get(&state.config.session_name) {
            if let Some(session) = Session::load(&state.db, cookie.value()).await? {
                return Ok(session);
            }
        }

        Ok(Session::new())
    }
}
