//! Integration tests for the server, handler, and full connection flow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use muster::{GameService, MusterServerBuilder};
use muster_engine::{CreateGame, GameEngine};
use muster_protocol::{GameCode, PlayerId};
use muster_session::Registry;
use muster_store::MemStore;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port with one multiplayer lobby already
/// created. Returns the address, the service, the join code, and the
/// host's player id.
async fn start_server()
-> (String, Arc<GameService<MemStore>>, GameCode, PlayerId) {
    let store = Arc::new(MemStore::new());
    let registry = Arc::new(Registry::new());
    let service = Arc::new(GameService::new(
        GameEngine::new(store),
        registry,
    ));

    let snap = service
        .create_game(CreateGame {
            name: "Table one".into(),
            host_name: "Rowan".into(),
            host_color: None,
            is_solo: false,
        })
        .await
        .expect("game should create");
    let code = snap.code.clone();
    let host = snap.players[0].id;

    let server = MusterServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(Arc::clone(&service))
        .await
        .expect("server should build");
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, service, code, host)
}

async fn connect(addr: &str, code: &str) -> ClientWs {
    let (ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{code}"))
            .await
            .expect("should connect");
    ws
}

/// Receives the next text frame as JSON, with a timeout.
async fn recv_json(ws: &mut ClientWs) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("frame should be JSON");
        }
    }
}

fn text(value: serde_json::Value) -> Message {
    Message::Text(value.to_string().into())
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_receives_full_state() {
    let (addr, _service, code, _host) = start_server().await;
    let mut ws = connect(&addr, code.as_str()).await;

    let state = recv_json(&mut ws).await;

    assert_eq!(state["type"], "state");
    assert_eq!(state["data"]["code"], code.as_str());
    assert_eq!(state["data"]["status"], "lobby");
    assert_eq!(state["data"]["players"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_code_gets_error() {
    let (addr, _service, _code, _host) = start_server().await;
    let mut ws = connect(&addr, "QQQQQQ").await;

    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "game not found");
}

#[tokio::test]
async fn test_ping_pong() {
    let (addr, _service, code, _host) = start_server().await;
    let mut ws = connect(&addr, code.as_str()).await;
    recv_json(&mut ws).await; // initial state

    ws.send(text(serde_json::json!({"type": "ping"})))
        .await
        .expect("send");

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn test_request_state_returns_fresh_snapshot() {
    let (addr, _service, code, _host) = start_server().await;
    let mut ws = connect(&addr, code.as_str()).await;
    recv_json(&mut ws).await;

    ws.send(text(serde_json::json!({"type": "request_state"})))
        .await
        .expect("send");

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "state");
    assert_eq!(reply["data"]["code"], code.as_str());
}

#[tokio::test]
async fn test_garbage_message_gets_error_and_keeps_connection() {
    let (addr, _service, code, _host) = start_server().await;
    let mut ws = connect(&addr, code.as_str()).await;
    recv_json(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.expect("send");
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // The connection is still usable.
    ws.send(text(serde_json::json!({"type": "ping"})))
        .await
        .expect("send");
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_join_notifies_the_other_connection() {
    let (addr, _service, code, host) = start_server().await;
    let mut ws_host = connect(&addr, code.as_str()).await;
    let mut ws_other = connect(&addr, code.as_str()).await;
    recv_json(&mut ws_host).await;
    recv_json(&mut ws_other).await;

    ws_host
        .send(text(
            serde_json::json!({"type": "join", "player_id": host}),
        ))
        .await
        .expect("send");

    let seen = recv_json(&mut ws_other).await;
    assert_eq!(seen["type"], "player_joined");
    assert_eq!(seen["player"]["name"], "Rowan");
    assert_eq!(seen["player"]["is_connected"], true);
}

#[tokio::test]
async fn test_join_with_foreign_player_id_rejected() {
    let (addr, service, code, _host) = start_server().await;
    let other_game = service
        .create_game(CreateGame {
            name: "Table two".into(),
            host_name: "Kai".into(),
            host_color: None,
            is_solo: false,
        })
        .await
        .expect("game should create");
    let outsider = other_game.players[0].id;

    let mut ws = connect(&addr, code.as_str()).await;
    let mut ws_other = connect(&addr, code.as_str()).await;
    recv_json(&mut ws).await;
    recv_json(&mut ws_other).await;

    ws.send(text(
        serde_json::json!({"type": "join", "player_id": outsider}),
    ))
    .await
    .expect("send");

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "player not found");

    // Nothing leaks to the rest of the room; its next frame is the pong.
    ws_other
        .send(text(serde_json::json!({"type": "ping"})))
        .await
        .expect("send");
    assert_eq!(recv_json(&mut ws_other).await["type"], "pong");

    // The foreign player was never flagged connected in their own game.
    let theirs = service
        .engine()
        .snapshot(&other_game.code)
        .await
        .expect("snapshot");
    assert!(!theirs.players[0].is_connected);
}

#[tokio::test]
async fn test_state_update_relays_to_others_only() {
    let (addr, _service, code, _host) = start_server().await;
    let mut ws_a = connect(&addr, code.as_str()).await;
    let mut ws_b = connect(&addr, code.as_str()).await;
    recv_json(&mut ws_a).await;
    recv_json(&mut ws_b).await;

    ws_a.send(text(serde_json::json!({
        "type": "state_update",
        "data": {"panel": "wounds", "open": true}
    })))
    .await
    .expect("send");

    let relayed = recv_json(&mut ws_b).await;
    assert_eq!(relayed["type"], "state_update");
    assert_eq!(relayed["data"]["panel"], "wounds");

    // The originator hears nothing back; a ping proves the line is idle.
    ws_a.send(text(serde_json::json!({"type": "ping"})))
        .await
        .expect("send");
    assert_eq!(recv_json(&mut ws_a).await["type"], "pong");
}

#[tokio::test]
async fn test_service_mutation_broadcasts_state() {
    let (addr, service, code, _host) = start_server().await;
    let mut ws = connect(&addr, code.as_str()).await;
    recv_json(&mut ws).await;

    service
        .join_game(&code, "Noor".into(), None)
        .await
        .expect("join should work");

    // The room hears the join and then the fresh snapshot.
    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["type"], "player_joined");
    assert_eq!(joined["player"]["name"], "Noor");

    let state = recv_json(&mut ws).await;
    assert_eq!(state["type"], "state");
    assert_eq!(state["data"]["players"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_disconnect_flags_player_and_notifies_room() {
    let (addr, _service, code, host) = start_server().await;
    let mut ws_host = connect(&addr, code.as_str()).await;
    let mut ws_other = connect(&addr, code.as_str()).await;
    recv_json(&mut ws_host).await;
    recv_json(&mut ws_other).await;

    ws_host
        .send(text(
            serde_json::json!({"type": "join", "player_id": host}),
        ))
        .await
        .expect("send");
    recv_json(&mut ws_other).await; // player_joined

    ws_host.close(None).await.expect("close");

    let left = recv_json(&mut ws_other).await;
    assert_eq!(left["type"], "player_left");
    assert_eq!(
        left["player_id"],
        serde_json::to_value(host).unwrap()
    );
}
