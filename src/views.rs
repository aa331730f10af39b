use std::collections::HashMap;

use axum::response::Html;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera, Value};

use crate::error::Result;
use crate::models::Snippet;

pub const PREVIEW_LEN: usize = 150;
const PREVIEW_MARKER: &str = "[...]";

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("accounts/login.html", include_str!("../templates/accounts/login.html")),
    ("accounts/register.html", include_str!("../templates/accounts/register.html")),
    ("accounts/profile.html", include_str!("../templates/accounts/profile.html")),
    ("snippets/index.html", include_str!("../templates/snippets/index.html")),
    ("snippets/new.html", include_str!("../templates/snippets/new.html")),
    ("snippets/edit.html", include_str!("../templates/snippets/edit.html")),
    ("snippets/remove.html", include_str!("../templates/snippets/remove.html")),
    ("snippets/fullview.html", include_str!("../templates/snippets/fullview.html")),
    ("errors/403.html", include_str!("../templates/errors/403.html")),
    ("errors/404.html", include_str!("../templates/errors/404.html")),
    ("errors/500.html", include_str!("../templates/errors/500.html")),
];

pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        tera.register_filter("preview", preview_filter);
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<Html<String>> {
        Ok(Html(self.tera.render(template, context)?))
    }
}

#[derive(Debug, Serialize)]
pub struct SnippetView {
    pub id: String,
    pub title: String,
    pub code_content: String,
    pub created_at: String,
}

impl SnippetView {
    pub fn from_snippet(snippet: &Snippet, now: DateTime<Utc>) -> Self {
        Self {
            id: snippet.id.to_string(),
            title: snippet.title.clone(),
            code_content: snippet.code_content.clone(),
            created_at: time_ago(snippet.created_at, now),
        }
    }
}

pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((cut, _)) => format!("{}{PREVIEW_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

fn preview_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = tera::try_get_value!("preview", "value", String, value);
    Ok(Value::String(preview(&text)))
}

/// Relative age such as "a few seconds ago" or "3 days ago".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    let round = |unit: i64| (seconds + unit / 2) / unit;

    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    match seconds {
        s if s < 45 => "a few seconds ago".to_string(),
        s if s < 90 => "a minute ago".to_string(),
        s if s < 45 * MINUTE => format!("{} minutes ago", round(MINUTE)),
        s if s < 90 * MINUTE => "an hour ago".to_string(),
        s if s < 22 * HOUR => format!("{} hours ago", round(HOUR)),
        s if s < 36 * HOUR => "a day ago".to_string(),
        s if s < 26 * DAY => format!("{} days ago", round(DAY)),
        s if s < 45 * DAY => "a month ago".to_string(),
        s if s < 320 * DAY => format!("{} months ago", round(30 * DAY)),
        s if s < 548 * DAY => "a year ago".to_string(),
        _ => format!("{} years ago", round(365 * DAY)),
    }
}
