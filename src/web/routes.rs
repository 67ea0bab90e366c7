use std::sync::Arc;

use axum::{routing::get, Router};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::repository::Store;

/// Runs the embedded HTTP server until the context is canceled. The root
/// route is reserved and currently serves nothing; the store handle is
/// threaded through for the routes that will grow here.
pub async fn serve(
    ctx: &CancellationToken,
    store: Arc<Store>,
    port: u16,
) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/", get(root))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("serving on :{port}");

    let shutdown = ctx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn root() {}
