mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod routes;
mod session;
mod state;
mod views;

use tokio::{
    net::TcpListener,
    signal::{
        self,
        unix::{signal, SignalKind},
    },
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use state::AppState;
use views::Views;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load();
    let conn = db::establish_connection(&config.database_path)
        .expect("Failed to establish database connection");

    match session::purge_expired(&conn).await {
        Ok(0) => {}
        Ok(purged) => info!("Purged {purged} expired sessions"),
        Err(e) => warn!("Failed to purge expired sessions: {e}"),
    }

    let views = Views::new().expect("Failed to load templates");
    let state = AppState::new(conn, config, views);
    let app = routes::build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&address)
        .await
        .expect("Failed to bind listener");
    info!("Server running on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
