pub mod accounts;
pub mod snippets;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tera::Context;
use tracing::error;

use crate::error::{AppError, ErrorPage, Result};
use crate::session::Session;
use crate::state::AppState;

/// Renders a page with the layout variables every template expects.
/// Showing a flash consumes it.
pub async fn render_page(
    state: &AppState,
    mut session: Session,
    template: &str,
    mut context: Context,
) -> Result<Response> {
    context.insert("base_url", &state.config.base_url);
    context.insert("logged_in", &session.is_authenticated());
    context.insert("username", session.username().unwrap_or_default());
    if !context.contains_key("validation_errors") {
        context.insert("validation_errors", &Vec::<String>::new());
    }

    let flash = session.take_flash();
    context.insert("flash", &flash);
    if flash.is_some() && session.is_persisted() {
        session.save(&state.db).await?;
    }

    Ok(state.views.render(template, &context)?.into_response())
}

/// Re-renders a form together with the messages explaining why it was rejected.
pub async fn render_form_errors(
    state: &AppState,
    session: Session,
    template: &str,
    mut context: Context,
    status: StatusCode,
    errors: Vec<String>,
) -> Result<Response> {
    context.insert("validation_errors", &errors);
    let page = render_page(state, session, template, context).await?;
    Ok((status, page).into_response())
}

/// Keeps a form on screen when the store rejects a write. Anything other than
/// a storage failure is passed on unchanged.
pub async fn recover_form(
    state: &AppState,
    session: Session,
    template: &str,
    context: Context,
    err: AppError,
    message: &str,
) -> Result<Response> {
    if !err.is_storage_failure() {
        return Err(err);
    }

    error!("{message} {err}");
    render_form_errors(
        state,
        session,
        template,
        context,
        StatusCode::INTERNAL_SERVER_ERROR,
        vec![message.to_string()],
    )
    .await
}

/// Redirects under the base URL, handing out the session cookie once the
/// session has been stored.
pub fn redirect(state: &AppState, session: &Session, to: &str) -> Response {
    let location = state.config.path(to);

    if session.is_persisted() {
        let jar = CookieJar::new().add(session.cookie(&state.config));
        (jar, Redirect::to(&location)).into_response()
    } else {
        Redirect::to(&location).into_response()
    }
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}

pub async fn render_error_page(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let Some(page) = response.extensions().get::<ErrorPage>().copied() else {
        return response;
    };

    let mut context = Context::new();
    context.insert("base_url", &state.config.base_url);
    match state.views.render(page.template(), &context) {
        Ok(html) => (page.0, html).into_response(),
        Err(e) => {
            error!("Failed to render error page: {e}");
            response
        }
    }
}
