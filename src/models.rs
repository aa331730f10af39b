use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub session_id: String,
    pub snippet_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn owns(&self, snippet_id: &Uuid) -> bool {
        self.snippet_ids.contains(snippet_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub id: Uuid,
    pub title: String,
    pub code_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSnippet<'a> {
    pub title: &'a str,
    pub code_content: &'a str,
}

pub const USERNAME_MIN_LEN: usize = 5;
pub const PASSWORD_MAX_LEN: usize = 100;

pub fn username_long_enough(username: &str) -> Result<(), ValidationError> {
    if username.trim().chars().count() < USERNAME_MIN_LEN {
        return Err(ValidationError::new("username_length")
            .with_message(Cow::Borrowed("Username must be longer than 5 characters.")));
    }
    Ok(())
}

pub fn password_short_enough(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() > PASSWORD_MAX_LEN {
        return Err(ValidationError::new("password_length")
            .with_message(Cow::Borrowed("Password must be shorter than 100 characters.")));
    }
    Ok(())
}

/// Flattens validation failures into form messages, listed in `fields` order.
pub fn error_messages(errors: &ValidationErrors, fields: &[&str]) -> Vec<String> {
    let by_field = errors.field_errors();
    fields
        .iter()
        .filter_map(|field| by_field.get(*field))
        .flat_map(|errors| errors.iter())
        .map(|error| match &error.message {
            Some(message) => message.to_string(),
            None => error.code.to_string(),
        })
        .collect()
}
