//! # Muster
//!
//! A real-time scoreboard server for tabletop wargames. One person hosts
//! a game and reads the six-character join code across the table; the
//! other player joins from their own device and both screens stay in
//! sync over WebSockets while the engine keeps the battle log honest.
//!
//! This crate ties the layers together:
//!
//! - [`muster_protocol`] — ids, enums, wire messages, snapshots
//! - [`muster_store`] — records and the persistence trait
//! - [`muster_engine`] — the rules: unit state machine, consolidating
//!   event log, and every game operation
//! - [`muster_session`] — rooms and broadcast fan-out
//! - [`muster_reaper`] — the idle-game expiry sweep
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use muster::{GameService, MusterServerBuilder};
//! use muster_engine::GameEngine;
//! use muster_session::Registry;
//! use muster_store::MemStore;
//!
//! # async fn run() -> Result<(), muster::MusterError> {
//! let store = Arc::new(MemStore::new());
//! let registry = Arc::new(Registry::new());
//! let service = Arc::new(GameService::new(
//!     GameEngine::new(store),
//!     registry,
//! ));
//!
//! let server = MusterServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(service)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
mod service;

pub use error::MusterError;
pub use server::{MusterServer, MusterServerBuilder};
pub use service::GameService;
