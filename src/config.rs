use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub session_name: String,
    pub base_url: String,
    pub production: bool,
    pub public_dir: PathBuf,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn load() -> Self {
        let app_env: String = try_load("APP_ENV", "development");

        Self {
            port: try_load("PORT", "3000"),
            database_path: try_load("DATABASE_PATH", "snippets.db"),
            session_name: try_load("SESSION_NAME", "snipshare.sid"),
            base_url: normalize_base_url(try_load("BASE_URL", "/")),
            production: app_env == "production",
            public_dir: try_load("PUBLIC_DIR", "public"),
            bcrypt_cost: try_load("BCRYPT_COST", "8"),
        }
    }

    /// Absolute path under the configured base URL, e.g. `path("profile")`.
    pub fn path(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative.trim_start_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: PathBuf::from("snippets.db"),
            session_name: "snipshare.sid".to_string(),
            base_url: "/".to_string(),
            production: false,
            public_dir: PathBuf::from("public"),
            bcrypt_cost: 8,
        }
    }
}

fn normalize_base_url(mut url: String) -> String {
    if !url.starts_with('/') {
        url.insert(0, '/');
    }
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            match default.parse() {
                Ok(value) => value,
                Err(e) => panic!("Default for {key} does not parse: {e}"),
            }
        }
    }
}
