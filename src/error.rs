use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid login attempt.")]
    InvalidCredentials,

    #[error("Username already exists.")]
    UsernameTaken,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::UsernameTaken => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Hash(_)
            | AppError::Template(_)
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message is meant for the person filling in a form.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AppError::InvalidCredentials | AppError::UsernameTaken)
    }

    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Hash(_) | AppError::Serialization(_)
        )
    }
}

/// Marks a response whose body is replaced by the matching error page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPage(pub StatusCode);

impl ErrorPage {
    pub fn template(&self) -> &'static str {
        match self.0 {
            StatusCode::NOT_FOUND => "errors/404.html",
            StatusCode::FORBIDDEN => "errors/403.html",
            _ => "errors/500.html",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_user_facing() {
            return (status, self.to_string()).into_response();
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {self}");
        }

        let mut response = (status, status.to_string()).into_response();
        response.extensions_mut().insert(ErrorPage(status));
        response
    }
}
