//! `MusterServer` builder and accept loop.
//!
//! Clients connect to `ws://host/ws/{code}` with the six-character join
//! code in the path. The accept loop captures the path during the
//! WebSocket upgrade and hands the stream plus the parsed code to the
//! per-connection handler.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::SinkExt;
use muster_protocol::{GameCode, ServerMessage};
use muster_store::Store;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::handler::handle_connection;
use crate::service::GameService;
use crate::MusterError;

/// Builder for configuring and starting a Muster server.
pub struct MusterServerBuilder {
    bind_addr: String,
}

impl MusterServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Binds the listener and wraps it around the service.
    pub async fn build<S: Store>(
        self,
        service: Arc<GameService<S>>,
    ) -> Result<MusterServer<S>, MusterError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "muster server listening");
        Ok(MusterServer { listener, service })
    }
}

impl Default for MusterServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Muster server.
pub struct MusterServer<S> {
    listener: TcpListener,
    service: Arc<GameService<S>>,
}

impl<S: Store> MusterServer<S> {
    pub fn builder() -> MusterServerBuilder {
        MusterServerBuilder::new()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated. Each
    /// connection gets its own task.
    pub async fn run(self) -> Result<(), MusterError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) =
                            accept_client(stream, addr, service).await
                        {
                            tracing::debug!(
                                %addr,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Upgrades one TCP stream to a WebSocket, pulls the join code out of the
/// request path, and runs the handler.
async fn accept_client<S: Store>(
    stream: TcpStream,
    addr: SocketAddr,
    service: Arc<GameService<S>>,
) -> Result<(), MusterError> {
    let mut path = String::new();
    let mut ws = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        },
    )
    .await?;
    tracing::debug!(%addr, %path, "accepted websocket connection");

    let code = match path.strip_prefix("/ws/").filter(|c| !c.is_empty()) {
        Some(raw) => GameCode::new(raw),
        None => {
            let reply =
                ServerMessage::error("expected path /ws/{code}").to_json()?;
            let _ = ws.send(Message::Text(reply.into())).await;
            let _ = ws.close(None).await;
            return Ok(());
        }
    };

    handle_connection(ws, code, service).await
}
