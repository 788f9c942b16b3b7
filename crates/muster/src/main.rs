//! Server binary: in-memory store, reaper, WebSocket front end.

use std::sync::Arc;

use muster::{GameService, MusterError, MusterServerBuilder};
use muster_engine::GameEngine;
use muster_reaper::{Reaper, ReaperConfig};
use muster_session::Registry;
use muster_store::MemStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MusterError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("MUSTER_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let store = Arc::new(MemStore::new());
    let registry = Arc::new(Registry::new());
    let engine = GameEngine::new(Arc::clone(&store));
    let service =
        Arc::new(GameService::new(engine, Arc::clone(&registry)));

    tokio::spawn(
        Reaper::new(store, registry, ReaperConfig::default()).run(),
    );

    let server =
        MusterServerBuilder::new().bind(&addr).build(service).await?;
    server.run().await
}
