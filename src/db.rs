use crate::error::{AppError, Result};
use crate::models::{NewSnippet, NewUser, Snippet, User};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub type DbConnection = Arc<Mutex<Connection>>;

pub const UNSET_SESSION: &str = "session";

pub fn establish_connection(path: &Path) -> rusqlite::Result<DbConnection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    init_schema(&conn)?;

    info!("Database opened at {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
pub fn in_memory() -> DbConnection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    init_schema(&conn).expect("create schema");
    Arc::new(Mutex::new(conn))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            session_id TEXT NOT NULL,
            snippet_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS users_session_id ON users (session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snippets (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            code_content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_id_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<Uuid>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const USER_COLUMNS: &str =
    "id, username, password_hash, session_id, snippet_ids, created_at, updated_at";
const SNIPPET_COLUMNS: &str = "id, title, code_content, created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row, 0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        session_id: row.get(3)?,
        snippet_ids: parse_id_list(row, 4)?,
        created_at: parse_timestamp(row, 5)?,
        updated_at: parse_timestamp(row, 6)?,
    })
}

fn snippet_from_row(row: &Row) -> rusqlite::Result<Snippet> {
    Ok(Snippet {
        id: parse_uuid(row, 0)?,
        title: row.get(1)?,
        code_content: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
        updated_at: parse_timestamp(row, 4)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

// -- Users --

pub async fn insert_user(conn: &DbConnection, new_user: &NewUser<'_>) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        username: new_user.username.trim().to_string(),
        password_hash: new_user.password_hash.to_string(),
        session_id: UNSET_SESSION.to_string(),
        snippet_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let result = conn.lock().await.execute(
        "INSERT INTO users (id, username, password_hash, session_id, snippet_ids, created_at, updated_at)
         VALUES (?, ?, ?, ?, '[]', ?, ?)",
        params![
            user.id.to_string(),
            user.username,
            user.password_hash,
            user.session_id,
            timestamp(now),
            timestamp(now)
        ],
    );

    match result {
        Ok(_) => {
            info!(user_id = %user.id, username = %user.username, "User registered");
            Ok(user)
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::UsernameTaken),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_user_by_username(conn: &DbConnection, username: &str) -> Result<Option<User>> {
    let user = conn
        .lock()
        .await
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
            [username.trim()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub async fn find_user_by_session(conn: &DbConnection, session_id: &str) -> Result<Option<User>> {
    let guard = conn.lock().await;
    Ok(query_user_by_session(&guard, session_id)?)
}

fn query_user_by_session(conn: &Connection, session_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE session_id = ?"),
        [session_id],
        user_from_row,
    )
    .optional()
}

pub async fn set_user_session(conn: &DbConnection, user_id: &Uuid, session_id: &str) -> Result<()> {
    conn.lock().await.execute(
        "UPDATE users SET session_id = ?, updated_at = ? WHERE id = ?",
        params![session_id, timestamp(Utc::now()), user_id.to_string()],
    )?;
    Ok(())
}

fn store_id_list(conn: &Connection, user_id: &Uuid, ids: &[Uuid]) -> Result<()> {
    conn.execute(
        "UPDATE users SET snippet_ids = ?, updated_at = ? WHERE id = ?",
        params![
            serde_json::to_string(ids)?,
            timestamp(Utc::now()),
            user_id.to_string()
        ],
    )?;
    Ok(())
}

// -- Snippets --

pub async fn create_snippet(
    conn: &DbConnection,
    session_id: &str,
    new_snippet: &NewSnippet<'_>,
) -> Result<Snippet> {
    let mut guard = conn.lock().await;
    let tx = guard.transaction()?;

    let mut owner = query_user_by_session(&tx, session_id)?.ok_or(AppError::NotFound)?;

    let now = Utc::now();
    let snippet = Snippet {
        id: Uuid::new_v4(),
        title: new_snippet.title.to_string(),
        code_content: new_snippet.code_content.to_string(),
        created_at: now,
        updated_at: now,
    };

    tx.execute(
        "INSERT INTO snippets (id, title, code_content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        params![
            snippet.id.to_string(),
            snippet.title,
            snippet.code_content,
            timestamp(now),
            timestamp(now)
        ],
    )?;

    owner.snippet_ids.push(snippet.id);
    store_id_list(&tx, &owner.id, &owner.snippet_ids)?;
    tx.commit()?;

    debug!(snippet_id = %snippet.id, owner = %owner.username, "Snippet created");
    Ok(snippet)
}

pub async fn all_snippets(conn: &DbConnection) -> Result<Vec<Snippet>> {
    let guard = conn.lock().await;
    let mut stmt = guard.prepare(&format!(
        "SELECT {SNIPPET_COLUMNS} FROM snippets ORDER BY created_at DESC, rowid DESC"
    ))?;
    let snippets = stmt
        .query_map([], snippet_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snippets)
}

/// The snippets named in `ids`, newest first. Ids with no record are skipped.
pub async fn snippets_by_ids(conn: &DbConnection, ids: &[Uuid]) -> Result<Vec<Snippet>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let guard = conn.lock().await;
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = guard.prepare(&format!(
        "SELECT {SNIPPET_COLUMNS} FROM snippets WHERE id IN ({placeholders}) ORDER BY created_at DESC, rowid DESC"
    ))?;
    let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    let snippets = stmt
        .query_map(rusqlite::params_from_iter(keys.iter()), snippet_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snippets)
}

pub async fn find_snippet(conn: &DbConnection, id: &Uuid) -> Result<Option<Snippet>> {
    let snippet = conn
        .lock()
        .await
        .query_row(
            &format!("SELECT {SNIPPET_COLUMNS} FROM snippets WHERE id = ?"),
            [id.to_string()],
            snippet_from_row,
        )
        .optional()?;
    Ok(snippet)
}

/// Returns `true` when the stored snippet actually changed.
pub async fn update_snippet(conn: &DbConnection, id: &Uuid, changes: &NewSnippet<'_>) -> Result<bool> {
    let modified = conn.lock().await.execute(
        "UPDATE snippets SET title = ?1, code_content = ?2, updated_at = ?3
         WHERE id = ?4 AND (title <> ?1 OR code_content <> ?2)",
        params![
            changes.title,
            changes.code_content,
            timestamp(Utc::now()),
            id.to_string()
        ],
    )?;
    Ok(modified == 1)
}

pub async fn delete_snippet(conn: &DbConnection, session_id: &str, id: &Uuid) -> Result<()> {
    let mut guard = conn.lock().await;
    let tx = guard.transaction()?;

    let mut owner = query_user_by_session(&tx, session_id)?.ok_or(AppError::NotFound)?;
    if !owner.owns(id) {
        return Err(AppError::Forbidden);
    }

    tx.execute("DELETE FROM snippets WHERE id = ?", [id.to_string()])?;
    owner.snippet_ids.retain(|owned| owned != id);
    store_id_list(&tx, &owner.id, &owner.snippet_ids)?;
    tx.commit()?;

    debug!(snippet_id = %id, owner = %owner.username, "Snippet deleted");
    Ok(())
}
