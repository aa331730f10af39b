use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::handlers::{accounts, not_found, render_error_page, snippets};
use crate::state::AppState;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
     script-src 'self' code.jquery.com cdn.jsdelivr.net; \
     style-src 'self' https: 'unsafe-inline'; \
     img-src 'self' data:; \
     object-src 'none'; \
     frame-ancestors 'self'; \
     base-uri 'self'; \
     form-action 'self'";

pub fn build_router(state: AppState) -> Router {
    let owner_only = Router::new()
        .route("/:id/edit", get(snippets::edit))
        .route("/:id/update", post(snippets::update))
        .route("/:id/remove", get(snippets::remove))
        .route("/:id/delete", post(snippets::delete))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            accounts::authorize_edit_and_delete,
        ));

    Router::new()
        .route("/", get(snippets::index))
        .route("/login", get(accounts::login).post(accounts::login_post))
        .route("/profile", get(snippets::profile))
        .route("/new", get(snippets::new))
        .route("/create", post(snippets::create))
        .route("/:id/snippetfullview", get(snippets::view))
        .route("/register", get(accounts::register))
        .route("/createUser", post(accounts::register_user))
        .route("/logout", post(accounts::logout))
        .merge(owner_only)
        .nest_service("/public", ServeDir::new(&state.config.public_dir))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), render_error_page))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
