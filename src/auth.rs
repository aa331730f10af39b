use crate::db::{self, DbConnection};
use crate::error::{AppError, Result};
use crate::models::User;
use crate::session::Session;
use bcrypt::{hash, verify};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Looks the user up by name and checks the password against the stored hash.
/// An unknown user and a wrong password fail the same way.
pub async fn authenticate(conn: &DbConnection, username: &str, password: &str) -> Result<User> {
    let user = db::find_user_by_username(conn, username).await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            warn!(username, "Invalid login attempt");
            Err(AppError::InvalidCredentials)
        }
    }
}

/// Binds an authenticated user to a freshly regenerated session.
pub async fn log_in(conn: &DbConnection, session: Session, user: &User) -> Result<Session> {
    let mut session = session.regenerate(conn).await?;
    db::set_user_session(conn, &user.id, &session.id).await?;

    session.data.is_auth = true;
    session.data.username = Some(user.username.clone());
    session.save(conn).await?;

    info!(user_id = %user.id, "User logged in");
    Ok(session)
}

/// The user logged in under this session, or `NotFound` for anonymous
/// sessions and sessions no user is bound to.
pub async fn current_user(conn: &DbConnection, session: &Session) -> Result<User> {
    if !session.is_authenticated() {
        return Err(AppError::NotFound);
    }

    db::find_user_by_session(conn, &session.id)
        .await?
        .ok_or(AppError::NotFound)
}

/// Permits access only when `snippet_id` is in the caller's owned-id list.
pub async fn authorize_owner(conn: &DbConnection, session: &Session, snippet_id: &str) -> Result<User> {
    let user = current_user(conn, session).await?;

    let owned = Uuid::parse_str(snippet_id)
        .map(|id| user.owns(&id))
        .unwrap_or(false);

    if owned {
        Ok(user)
    } else {
        debug!(user_id = %user.id, snippet_id, "Ownership check failed");
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSnippet, NewUser};

    const TEST_COST: u32 = 4;

    async fn register(conn: &DbConnection, username: &str, password: &str) -> User {
        let password_hash = hash_password(password, TEST_COST).unwrap();
        db::insert_user(
            conn,
            &NewUser {
                username,
                password_hash: &password_hash,
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn hashes_verify_only_the_hashed_password() {
        let hashed = hash_password("correct-horse", TEST_COST).unwrap();
        assert_ne!(hashed, "correct-horse");
        assert!(verify_password("correct-horse", &hashed));
        assert!(!verify_password("battery-staple", &hashed));
        assert!(!verify_password("correct-horse", "not-a-hash"));
    }

    #[test]
    fn tokens_are_random_alphanumerics() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_and_wrong_password() {
        let conn = db::in_memory();
        register(&conn, "alice", "correct-horse").await;

        assert!(authenticate(&conn, "alice", "correct-horse").await.is_ok());
        assert!(matches!(
            authenticate(&conn, "alice", "wrong-password").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&conn, "mallory", "correct-horse").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn log_in_binds_user_to_new_session() {
        let conn = db::in_memory();
        let user = register(&conn, "alice", "correct-horse").await;

        let anonymous = Session::new();
        let old_id = anonymous.id.clone();
        let session = log_in(&conn, anonymous, &user).await.unwrap();

        assert_ne!(session.id, old_id);
        assert!(session.is_authenticated());
        let bound = db::find_user_by_session(&conn, &session.id).await.unwrap().unwrap();
        assert_eq!(bound.id, user.id);
    }

    #[tokio::test]
    async fn authorization_checks_owned_ids() {
        let conn = db::in_memory();
        let alice = register(&conn, "alice", "correct-horse").await;
        let bob = register(&conn, "bobby", "correct-horse").await;
        let alice_session = log_in(&conn, Session::new(), &alice).await.unwrap();
        let bob_session = log_in(&conn, Session::new(), &bob).await.unwrap();

        let snippet = db::create_snippet(
            &conn,
            &alice_session.id,
            &NewSnippet {
                title: "hello",
                code_content: "print('hi')",
            },
        )
        .await
        .unwrap();
        let id = snippet.id.to_string();

        assert!(authorize_owner(&conn, &alice_session, &id).await.is_ok());
        assert!(matches!(
            authorize_owner(&conn, &bob_session, &id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            authorize_owner(&conn, &alice_session, "not-a-uuid").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            authorize_owner(&conn, &Session::new(), &id).await,
            Err(AppError::NotFound)
        ));
    }
}
