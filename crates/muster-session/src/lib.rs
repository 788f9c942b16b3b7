//! Live-connection bookkeeping for Muster.
//!
//! The [`Registry`] maps join codes to rooms of connected WebSocket
//! clients and fans server messages out to them. It knows nothing about
//! game rules; the server layer decides what to send, the registry
//! decides who hears it.

mod registry;

pub use registry::{ConnectionId, Registry, DEFAULT_CHANNEL_SIZE};
