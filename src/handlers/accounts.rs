use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tera::Context;
use tracing::info;
use validator::Validate;

use super::{recover_form, redirect, render_form_errors, render_page};
use crate::auth;
use crate::db;
use crate::error::{AppError, Result};
use crate::models::{error_messages, password_short_enough, username_long_enough, NewUser};
use crate::session::{FlashKind, Session};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(custom(function = "username_long_enough"))]
    username: String,
    #[serde(default)]
    #[validate(
        length(min = 10, message = "Password must be longer than 10 characters."),
        custom(function = "password_short_enough")
    )]
    password: String,
    #[serde(default, rename = "confirmPassword")]
    confirm_password: String,
}

/// Route layer for the edit/update/remove/delete routes: only the owner of
/// the snippet named in the path gets through.
pub async fn authorize_edit_and_delete(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response> {
    auth::authorize_owner(&state.db, &session, &id).await?;
    Ok(next.run(request).await)
}

pub async fn login(State(state): State<AppState>, session: Session) -> Result<Response> {
    if session.is_authenticated() {
        return Ok(redirect(&state, &session, "profile"));
    }

    let mut context = Context::new();
    context.insert("form_username", "");
    render_page(&state, session, "accounts/login.html", context).await
}

pub async fn login_post(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    match auth::authenticate(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            let session = auth::log_in(&state.db, session, &user).await?;
            Ok(redirect(&state, &session, "profile"))
        }
        Err(err) if err.is_user_facing() => {
            let mut context = Context::new();
            context.insert("form_username", &form.username);
            render_form_errors(
                &state,
                session,
                "accounts/login.html",
                context,
                err.status(),
                vec![err.to_string()],
            )
            .await
        }
        Err(err) => Err(err),
    }
}

pub async fn register(State(state): State<AppState>, session: Session) -> Result<Response> {
    if session.is_authenticated() {
        return Ok(redirect(&state, &session, "profile"));
    }

    let mut context = Context::new();
    context.insert("form_username", "");
    render_page(&state, session, "accounts/register.html", context).await
}

pub async fn register_user(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    if form.password != form.confirm_password {
        session.flash(FlashKind::Danger, "Passwords do not match.");
        session.save(&state.db).await?;
        return Ok(redirect(&state, &session, "register"));
    }

    let mut context = Context::new();
    context.insert("form_username", &form.username);

    if let Err(errors) = form.validate() {
        return render_form_errors(
            &state,
            session,
            "accounts/register.html",
            context,
            StatusCode::UNPROCESSABLE_ENTITY,
            error_messages(&errors, &["username", "password"]),
        )
        .await;
    }

    let inserted = match auth::hash_password(&form.password, state.config.bcrypt_cost) {
        Ok(password_hash) => {
            let new_user = NewUser {
                username: &form.username,
                password_hash: &password_hash,
            };
            db::insert_user(&state.db, &new_user).await
        }
        Err(err) => Err(err),
    };

    match inserted {
        Ok(_) => {
            session.flash(FlashKind::Success, "Registration successful, please login.");
            session.save(&state.db).await?;
            Ok(redirect(&state, &session, "login"))
        }
        Err(err @ AppError::UsernameTaken) => {
            render_form_errors(
                &state,
                session,
                "accounts/register.html",
                context,
                err.status(),
                vec![err.to_string()],
            )
            .await
        }
        Err(err) => {
            recover_form(
                &state,
                session,
                "accounts/register.html",
                context,
                err,
                "Could not create the account. Try again.",
            )
            .await
        }
    }
}

pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Response> {
    session.destroy(&state.db).await?;
    info!("Session closed");

    let jar = CookieJar::new().remove(Session::removal_cookie(&state.config));
    Ok((jar, Redirect::to(&state.config.base_url)).into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use validator::Validate;

    use super::super::test_support::*;
    use super::RegisterForm;
    use crate::config::Config;
    use crate::db;
    use crate::models::error_messages;

    fn registration(username: &str, password: &str) -> RegisterForm {
        RegisterForm {
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
        }
    }

    fn messages(form: &RegisterForm) -> Vec<String> {
        form.validate()
            .err()
            .map(|errors| error_messages(&errors, &["username", "password"]))
            .unwrap_or_default()
    }

    #[test]
    fn registration_rules() {
        assert!(messages(&registration("alice", "correct-horse")).is_empty());
        assert_eq!(
            messages(&registration("  bob  ", "correct-horse")),
            vec!["Username must be longer than 5 characters."]
        );
        assert_eq!(
            messages(&registration("al", "short")),
            vec![
                "Username must be longer than 5 characters.",
                "Password must be longer than 10 characters.",
            ]
        );
        assert_eq!(
            messages(&registration("alice", &"x".repeat(101))),
            vec!["Password must be shorter than 100 characters."]
        );
        assert!(messages(&registration("alice", &"x".repeat(100))).is_empty());
    }

    #[tokio::test]
    async fn login_page_renders_for_anonymous_visitors() {
        let state = test_state();
        let response = get(&state, "/login", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("action=\"/login\""));
    }

    #[tokio::test]
    async fn links_follow_the_base_url() {
        let state = test_state_with(Config {
            base_url: "/snippets/".to_string(),
            ..Config::default()
        });
        let page = body_text(get(&state, "/login", None).await).await;
        assert!(page.contains("action=\"/snippets/login\""));
        assert!(page.contains("href=\"/snippets/register\""));
        assert!(!page.contains("&#x2F;"));
    }

    #[tokio::test]
    async fn successful_login_redirects_to_profile() {
        let state = test_state();
        let cookie = logged_in(&state, "alice").await;

        let response = get(&state, "/login", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/profile");

        let user = db::find_user_by_username(&state.db, "alice").await.unwrap().unwrap();
        assert_eq!(format!("snipshare.sid={}", user.session_id), cookie);
    }

    #[tokio::test]
    async fn wrong_password_never_authenticates() {
        let state = test_state();
        register(&state, "alice").await;

        let response = post_form(&state, "/login", "username=alice&password=not-the-password", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(session_cookie(&response).is_none());
        assert!(body_text(response).await.contains("Invalid login attempt."));

        let user = db::find_user_by_username(&state.db, "alice").await.unwrap().unwrap();
        assert_eq!(user.session_id, db::UNSET_SESSION);
        let authenticated: i64 = state
            .db
            .lock()
            .await
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(authenticated, 0);
    }

    #[tokio::test]
    async fn unknown_user_gets_the_same_message() {
        let state = test_state();
        let response = post_form(&state, "/login", "username=nobody&password=whatever-it-is", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Invalid login attempt."));
    }

    #[tokio::test]
    async fn mismatched_passwords_never_create_a_user() {
        let state = test_state();
        let response = post_form(
            &state,
            "/createUser",
            "username=alice&password=correct-horse-1&confirmPassword=correct-horse-2",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/register");
        assert!(db::find_user_by_username(&state.db, "alice").await.unwrap().is_none());

        let cookie = session_cookie(&response).unwrap();
        let page = body_text(get(&state, "/register", Some(&cookie)).await).await;
        assert!(page.contains("Passwords do not match."));

        let again = body_text(get(&state, "/register", Some(&cookie)).await).await;
        assert!(!again.contains("Passwords do not match."));
    }

    #[tokio::test]
    async fn registration_stores_a_hashed_password() {
        let state = test_state();
        let response = post_form(
            &state,
            "/createUser",
            &format!("username=alice&password={PASSWORD}&confirmPassword={PASSWORD}"),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let user = db::find_user_by_username(&state.db, "alice").await.unwrap().unwrap();
        assert_ne!(user.password_hash, PASSWORD);
        assert!(crate::auth::verify_password(PASSWORD, &user.password_hash));

        let cookie = session_cookie(&response).unwrap();
        let page = body_text(get(&state, "/login", Some(&cookie)).await).await;
        assert!(page.contains("Registration successful, please login."));
    }

    #[tokio::test]
    async fn registration_rejects_short_credentials() {
        let state = test_state();
        let response = post_form(
            &state,
            "/createUser",
            "username=abc&password=short&confirmPassword=short",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let page = body_text(response).await;
        assert!(page.contains("Username must be longer than 5 characters."));
        assert!(page.contains("Password must be longer than 10 characters."));
        assert!(db::find_user_by_username(&state.db, "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_reported() {
        let state = test_state();
        register(&state, "alice").await;

        let response = post_form(
            &state,
            "/createUser",
            &format!("username=alice&password={PASSWORD}&confirmPassword={PASSWORD}"),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_text(response).await.contains("Username already exists."));
    }

    #[tokio::test]
    async fn storage_failure_keeps_the_registration_form() {
        let state = test_state();
        state.db.lock().await.execute("DROP TABLE users", []).unwrap();

        let response = post_form(
            &state,
            "/createUser",
            &format!("username=alice&password={PASSWORD}&confirmPassword={PASSWORD}"),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = body_text(response).await;
        assert!(page.contains("Could not create the account. Try again."));
        assert!(page.contains("action=\"/createUser\""));
        assert!(page.contains("value=\"alice\""));
    }

    #[tokio::test]
    async fn logged_in_users_skip_registration() {
        let state = test_state();
        let cookie = logged_in(&state, "alice").await;

        let response = get(&state, "/register", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/profile");
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let state = test_state();
        let cookie = logged_in(&state, "alice").await;

        let response = post_form(&state, "/logout", "", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = get(&state, "/profile", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
