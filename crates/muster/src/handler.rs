//! Per-connection handler: resolve the game, sync state, relay messages.
//!
//! Each accepted connection gets its own task running this handler. The
//! flow is:
//!   1. Resolve the join code → full `state` snapshot, or `error` + close
//!   2. Register in the game's room (multiplayer only; solo sockets get
//!      a private queue); spawn a writer task for the socket
//!   3. Loop: `join` binds the connection to a player seat, `ping`,
//!      `request_state` and `state_update` are served in place
//!   4. On disconnect: free the slot, flag the player offline, tell the
//!      rest of the room

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use muster_engine::player_snapshot;
use muster_protocol::{ClientMessage, GameCode, ServerMessage};
use muster_session::DEFAULT_CHANNEL_SIZE;
use muster_store::Store;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::service::GameService;
use crate::MusterError;

pub(crate) async fn handle_connection<S: Store>(
    ws: WebSocketStream<TcpStream>,
    code: GameCode,
    service: Arc<GameService<S>>,
) -> Result<(), MusterError> {
    let engine = service.engine().clone();
    let registry = Arc::clone(service.registry());

    // Resolve before spending a room slot; bad codes get one error frame.
    let snapshot = match engine.snapshot(&code).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let mut ws = ws;
            let reply = ServerMessage::error(err.to_string()).to_json()?;
            let _ = ws.send(Message::Text(reply.into())).await;
            let _ = ws.close(None).await;
            return Ok(());
        }
    };

    // Solo games never enter the registry: one human, one socket,
    // nothing to fan out to. They get a private queue instead.
    let (room_slot, sender, mut receiver) = if snapshot.is_solo {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        (None, tx, rx)
    } else {
        let (id, tx, rx) = registry.register(&code);
        (Some(id), tx, rx)
    };
    let (mut sink, mut stream) = ws.split();

    // Writer task: drains this connection's outbound queue. Ends when the
    // last sender is dropped or the reaper closes the room.
    let writer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unencodable message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // First frame out is always the full state.
    let _ = sender.send(ServerMessage::State { data: snapshot }).await;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // binary, ping, pong
            Err(err) => {
                tracing::debug!(%code, error = %err, "socket error");
                break;
            }
        };

        match ClientMessage::from_json(&text) {
            Ok(ClientMessage::Join { player_id }) => {
                match engine.mark_connected(&code, player_id, true).await {
                    Ok(player) => {
                        if let Some(conn_id) = room_slot {
                            registry.bind_player(&code, conn_id, player_id);
                            registry.broadcast_except(
                                &code,
                                conn_id,
                                &ServerMessage::PlayerJoined {
                                    player: player_snapshot(&player),
                                },
                            );
                        }
                        tracing::info!(
                            %code,
                            player = %player.name,
                            "connection bound to player"
                        );
                    }
                    Err(err) => {
                        let _ = sender
                            .send(ServerMessage::error(err.to_string()))
                            .await;
                    }
                }
            }

            Ok(ClientMessage::RequestState) => match engine
                .snapshot(&code)
                .await
            {
                Ok(data) => {
                    let _ =
                        sender.send(ServerMessage::State { data }).await;
                }
                Err(err) => {
                    let _ = sender
                        .send(ServerMessage::error(err.to_string()))
                        .await;
                }
            },

            Ok(ClientMessage::StateUpdate { data }) => {
                // Opaque UI sync: relay to everyone else at the table.
                if let Some(conn_id) = room_slot {
                    registry.broadcast_except(
                        &code,
                        conn_id,
                        &ServerMessage::StateUpdate { data },
                    );
                }
            }

            Ok(ClientMessage::Ping) => {
                let _ = sender.send(ServerMessage::Pong).await;
            }

            Err(err) => {
                let _ = sender
                    .send(ServerMessage::error(format!(
                        "unrecognized message: {err}"
                    )))
                    .await;
            }
        }
    }

    drop(sender);
    if let Some(conn_id) = room_slot {
        if let Some(player_id) = registry.unregister(&code, conn_id) {
            if let Err(err) =
                engine.mark_connected(&code, player_id, false).await
            {
                tracing::debug!(
                    %player_id,
                    error = %err,
                    "could not flag player disconnected"
                );
            }
            registry
                .broadcast(&code, &ServerMessage::PlayerLeft { player_id });
        }
    }
    let _ = writer.await;
    tracing::debug!(%code, "connection closed");
    Ok(())
}
