use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::repository::Store;
use crate::web;

pub async fn run(ctx: &CancellationToken, store: Arc<Store>, port: u16) -> anyhow::Result<()> {
    web::serve(ctx, store, port).await?;
    Ok(())
}
