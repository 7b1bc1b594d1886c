//! Integration tests for end-to-end room synchronization.
//!
//! These tests start a real server and connect real WebSocket clients,
//! verifying the full pipeline from frame to fan-out.

use std::sync::Arc;

use coedit_collab::client::{ClientEvent, CollabClient, ConnectionState};
use coedit_collab::config::ServerConfig;
use coedit_collab::protocol::ServerMessage;
use coedit_collab::server::SyncServer;
use coedit_core::NodeKind;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on a free port, return its URL and a handle for inspection.
async fn start_test_server() -> (String, Arc<SyncServer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        heartbeat_interval_secs: 0,
        ..ServerConfig::default()
    };
    let server = Arc::new(SyncServer::new(config));
    let serving = Arc::clone(&server);
    tokio::spawn(async move {
        serving.serve(listener, std::future::pending()).await.unwrap();
    });
    (format!("ws://127.0.0.1:{port}"), server)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data}).to_string();
    ws.send(Message::text(frame)).await.unwrap();
}

/// Next text frame as JSON.
async fn recv(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn recv_event(ws: &mut Ws, expected: &str) -> Value {
    let value = recv(ws).await;
    assert_eq!(value["event"], expected, "unexpected frame {value}");
    value["data"].clone()
}

async fn join(ws: &mut Ws, room: &str, user: &str) {
    send(ws, "join-room", json!({"roomId": room, "userId": user, "name": user.to_uppercase()})).await;
    recv_event(ws, "user-joined").await;
    recv_event(ws, "files-update").await;
    recv_event(ws, "participants-update").await;
}

#[tokio::test]
async fn test_join_create_and_move_scenario() {
    let (url, _server) = start_test_server().await;
    let mut a = connect(&url).await;

    send(&mut a, "join-room", json!({"roomId": "R1", "userId": "a"})).await;
    assert_eq!(recv_event(&mut a, "user-joined").await, json!({"roomId": "R1", "userId": "a"}));
    assert_eq!(recv_event(&mut a, "files-update").await, json!({"roomId": "R1", "files": []}));
    let users = recv_event(&mut a, "participants-update").await;
    assert_eq!(users["users"].as_array().unwrap().len(), 1);
    assert_eq!(users["users"][0]["userId"], "a");

    send(
        &mut a,
        "file-create",
        json!({"roomId": "R1", "fileId": "f1", "name": "x.js", "kind": "file", "parentId": null}),
    )
    .await;
    assert_eq!(
        recv_event(&mut a, "files-update").await["files"],
        json!([{"id": "f1", "name": "x.js", "kind": "file", "content": ""}])
    );

    send(
        &mut a,
        "file-create",
        json!({"roomId": "R1", "fileId": "d1", "name": "src", "kind": "folder"}),
    )
    .await;
    recv_event(&mut a, "files-update").await;

    send(&mut a, "file-move", json!({"roomId": "R1", "fileId": "f1", "targetFolderId": "d1"})).await;
    let files = recv_event(&mut a, "files-update").await["files"].clone();
    assert_eq!(files.as_array().unwrap().len(), 1);
    assert_eq!(files[0]["id"], "d1");
    assert_eq!(files[0]["children"][0]["id"], "f1");
}

#[tokio::test]
async fn test_files_update_reaches_every_member() {
    let (url, _server) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "R1", "a").await;
    join(&mut b, "R1", "b").await;
    recv_event(&mut a, "user-joined").await;
    recv_event(&mut a, "participants-update").await;

    send(&mut b, "file-create", json!({"roomId": "R1", "fileId": "f1", "name": "a.rs", "kind": "file"})).await;
    let seen_by_a = recv_event(&mut a, "files-update").await;
    let seen_by_b = recv_event(&mut b, "files-update").await;
    assert_eq!(seen_by_a, seen_by_b);
}

#[tokio::test]
async fn test_code_change_excludes_sender() {
    let (url, _server) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "R2", "a").await;
    join(&mut b, "R2", "b").await;
    recv_event(&mut a, "user-joined").await;
    recv_event(&mut a, "participants-update").await;

    send(&mut a, "code-change", json!({"roomId": "R2", "fileId": "f1", "code": "fn main() {}"})).await;
    assert_eq!(
        recv_event(&mut b, "code-change").await,
        json!({"roomId": "R2", "fileId": "f1", "code": "fn main() {}"})
    );

    // Frames from one connection are handled in order, so the reply to this
    // request would come after any echo of the code-change.
    send(&mut a, "get-participants", json!({"roomId": "R2"})).await;
    recv_event(&mut a, "participants-update").await;
}

#[tokio::test]
async fn test_disconnect_emits_user_left() {
    let (url, server) = start_test_server().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    join(&mut a, "R1", "a").await;
    join(&mut b, "R1", "b").await;

    a.close(None).await.unwrap();
    drop(a);

    let update = recv_event(&mut b, "participants-update").await;
    assert_eq!(update["users"].as_array().unwrap().len(), 1);
    assert_eq!(update["users"][0]["userId"], "b");
    assert_eq!(recv_event(&mut b, "user-left").await, json!({"roomId": "R1", "userId": "a", "name": "A"}));

    let snapshot = server.engine().snapshot("R1").await.unwrap();
    assert_eq!(snapshot.participants.len(), 1);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (url, server) = start_test_server().await;
    let mut a = connect(&url).await;

    a.send(Message::text("not json".to_string())).await.unwrap();
    send(&mut a, "file-rename", json!({"roomId": "R1"})).await;
    a.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();

    // The connection survives and the next valid frame is handled.
    send(&mut a, "join-room", json!({"roomId": "R1", "userId": "a"})).await;
    recv_event(&mut a, "user-joined").await;

    assert_eq!(server.stats().await.malformed_messages, 3);
}

#[tokio::test]
async fn test_room_is_reset_after_last_leave() {
    let (url, server) = start_test_server().await;
    let mut a = connect(&url).await;
    join(&mut a, "R1", "a").await;
    send(&mut a, "file-create", json!({"roomId": "R1", "fileId": "f1", "name": "x", "kind": "file"})).await;
    recv_event(&mut a, "files-update").await;

    send(&mut a, "leave-room", json!({"roomId": "R1", "userId": "a"})).await;
    assert_eq!(recv_event(&mut a, "participants-update").await["users"], json!([]));
    recv_event(&mut a, "user-left").await;

    // Leaving unsubscribed us; a get-participants round-trip shows the room is gone.
    send(&mut a, "get-participants", json!({"roomId": "R1"})).await;
    assert_eq!(recv_event(&mut a, "participants-update").await["users"], json!([]));
    assert_eq!(server.engine().room_count().await, 0);

    join(&mut a, "R1", "a").await;
    assert!(server.engine().snapshot("R1").await.unwrap().files.is_empty());
}

#[tokio::test]
async fn test_client_replays_offline_queue() {
    let (url, server) = start_test_server().await;
    let mut client = CollabClient::with_url(&url);
    let mut events = client.take_event_rx().unwrap();

    client.join_room("R1", "a", Some("Alice")).await.unwrap();
    client.create_file("R1", "f1", "main.rs", NodeKind::File, None).await.unwrap();
    assert_eq!(client.offline_queue_len().await, 2);

    client.connect().await.unwrap();
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    assert_eq!(client.offline_queue_len().await, 0);

    let mut received = Vec::new();
    while received.len() < 5 {
        let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
        received.push(event);
    }
    assert_eq!(received[0], ClientEvent::Connected);
    let names: Vec<&str> = received[1..]
        .iter()
        .map(|e| match e {
            ClientEvent::Message(msg) => msg.event_name(),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["user-joined", "files-update", "participants-update", "files-update"]);

    match &received[4] {
        ClientEvent::Message(ServerMessage::FilesUpdate(update)) => {
            assert_eq!(update.files.len(), 1);
            assert_eq!(update.files[0].id, "f1");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(server.engine().snapshot("R1").await.unwrap().participants.len(), 1);
}
