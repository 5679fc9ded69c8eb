use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::users;
use crate::db::repo::UserStore;
use crate::ids::IdGenerator;

pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub ids: Arc<dyn IdGenerator>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, ids }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/user/create", post(users::create_user))
        .route("/user/update", put(users::update_user))
        .route("/user/delete", delete(users::delete_user))
        .route("/user/get", get(users::get_user))
        .route("/user/all", get(users::list_users))
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C or SIGTERM, letting in-flight requests finish.
pub async fn start_server(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state);

    info!(addr = %listener.local_addr()?, "Server is running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
