use std::sync::Arc;

use crate::{config::Config, db::DbConnection, views::Views};

#[derive(Clone)]
pub struct AppState {
    pub db: DbConnection,
    pub config: Arc<Config>,
    pub views: Arc<Views>,
}

impl AppState {
    pub fn new(db: DbConnection, config: Config, views: Views) -> Self {
        Self {
            db,
            config: Arc::new(config),
            views: Arc::new(views),
        }
    }
}
