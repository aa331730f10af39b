use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use tera::Context;
use uuid::Uuid;
use validator::Validate;

use super::{recover_form, redirect, render_form_errors, render_page};
use crate::auth;
use crate::db;
use crate::error::{AppError, Result};
use crate::models::{error_messages, NewSnippet, Snippet};
use crate::session::{FlashKind, Session};
use crate::state::AppState;
use crate::views::SnippetView;

#[derive(Deserialize, Validate)]
pub struct CreateSnippet {
    #[serde(default)]
    #[validate(length(min = 1, message = "`title` is required!"))]
    title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "`codeContent` is required!"))]
    value: String,
}

#[derive(Deserialize, Validate)]
pub struct UpdateSnippet {
    #[serde(default)]
    #[validate(length(min = 1, message = "`title` is required!"))]
    title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "`codeContent` is required!"))]
    code: String,
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::NotFound)
}

async fn fetch_snippet(state: &AppState, id: &str) -> Result<Snippet> {
    db::find_snippet(&state.db, &parse_id(id)?)
        .await?
        .ok_or(AppError::NotFound)
}

fn snippet_context(snippet: &Snippet) -> Context {
    let mut context = Context::new();
    context.insert("snippet", &SnippetView::from_snippet(snippet, Utc::now()));
    context
}

fn edit_context(id: &Uuid, title: &str, code_content: &str) -> Context {
    let submitted = SnippetView {
        id: id.to_string(),
        title: title.to_string(),
        code_content: code_content.to_string(),
        created_at: String::new(),
    };
    let mut context = Context::new();
    context.insert("snippet", &submitted);
    context
}

fn list_context(snippets: &[Snippet]) -> Context {
    let now = Utc::now();
    let views: Vec<SnippetView> = snippets
        .iter()
        .map(|snippet| SnippetView::from_snippet(snippet, now))
        .collect();

    let mut context = Context::new();
    context.insert("snippets", &views);
    context
}

pub async fn index(State(state): State<AppState>, session: Session) -> Result<Response> {
    let snippets = db::all_snippets(&state.db).await?;
    render_page(&state, session, "snippets/index.html", list_context(&snippets)).await
}

pub async fn profile(State(state): State<AppState>, mut session: Session) -> Result<Response> {
    let user = auth::current_user(&state.db, &session).await?;
    let snippets = db::snippets_by_ids(&state.db, &user.snippet_ids).await?;

    if session.username() != Some(user.username.as_str()) {
        session.data.username = Some(user.username.clone());
        session.save(&state.db).await?;
    }

    render_page(&state, session, "accounts/profile.html", list_context(&snippets)).await
}

pub async fn new(State(state): State<AppState>, session: Session) -> Result<Response> {
    if !session.is_authenticated() {
        return Err(AppError::NotFound);
    }

    let mut context = Context::new();
    context.insert("form_title", "");
    context.insert("form_code", "");
    render_page(&state, session, "snippets/new.html", context).await
}

pub async fn create(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<CreateSnippet>,
) -> Result<Response> {
    if !session.is_authenticated() {
        return Err(AppError::NotFound);
    }

    let mut context = Context::new();
    context.insert("form_title", &form.title);
    context.insert("form_code", &form.value);

    if let Err(errors) = form.validate() {
        return render_form_errors(
            &state,
            session,
            "snippets/new.html",
            context,
            StatusCode::UNPROCESSABLE_ENTITY,
            error_messages(&errors, &["title", "value"]),
        )
        .await;
    }

    let new_snippet = NewSnippet {
        title: &form.title,
        code_content: &form.value,
    };
    if let Err(err) = db::create_snippet(&state.db, &session.id, &new_snippet).await {
        return recover_form(
            &state,
            session,
            "snippets/new.html",
            context,
            err,
            "Could not save the snippet.",
        )
        .await;
    }

    session.flash(FlashKind::Success, "Saved successfully.");
    session.save(&state.db).await?;
    Ok(redirect(&state, &session, ""))
}

pub async fn edit(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let snippet = fetch_snippet(&state, &id).await?;
    render_page(&state, session, "snippets/edit.html", snippet_context(&snippet)).await
}

pub async fn update(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<String>,
    Form(form): Form<UpdateSnippet>,
) -> Result<Response> {
    let snippet_id = parse_id(&id)?;
    let context = edit_context(&snippet_id, &form.title, &form.code);

    if let Err(errors) = form.validate() {
        return render_form_errors(
            &state,
            session,
            "snippets/edit.html",
            context,
            StatusCode::UNPROCESSABLE_ENTITY,
            error_messages(&errors, &["title", "code"]),
        )
        .await;
    }

    let changes = NewSnippet {
        title: &form.title,
        code_content: &form.code,
    };

    match db::update_snippet(&state.db, &snippet_id, &changes).await {
        Ok(true) => session.flash(FlashKind::Success, "The snippet was updated successfully."),
        Ok(false) => session.flash(FlashKind::Danger, "Update failed. Try again."),
        Err(err) => {
            return recover_form(
                &state,
                session,
                "snippets/edit.html",
                context,
                err,
                "Could not update the snippet.",
            )
            .await;
        }
    }
    session.save(&state.db).await?;
    Ok(redirect(&state, &session, ""))
}

pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let snippet = fetch_snippet(&state, &id).await?;
    render_page(&state, session, "snippets/remove.html", snippet_context(&snippet)).await
}

pub async fn delete(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let snippet_id = parse_id(&id)?;
    if let Err(err) = db::delete_snippet(&state.db, &session.id, &snippet_id).await {
        if !err.is_storage_failure() {
            return Err(err);
        }
        let snippet = fetch_snippet(&state, &id).await?;
        return recover_form(
            &state,
            session,
            "snippets/remove.html",
            snippet_context(&snippet),
            err,
            "Could not delete the snippet.",
        )
        .await;
    }

    session.flash(FlashKind::Success, "The snippet was deleted successfully.");
    session.save(&state.db).await?;
    Ok(redirect(&state, &session, ""))
}

pub async fn view(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let snippet = fetch_snippet(&state, &id).await?;
    render_page(&state, session, "snippets/fullview.html", snippet_context(&snippet)).await
}
