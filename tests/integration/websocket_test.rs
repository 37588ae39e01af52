// tests/integration/websocket_test.rs

use super::test_helpers::init_tracing;
use futures::{SinkExt, StreamExt};
use launchsite::core::rcon::{RandomIds, RconClient, RconSettings, WebSocketTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Runs a one-connection WebRCON stand-in that echoes every command back.
async fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"Identifier":0,"Message":"welcome","Type":"Generic"}"#.to_string(),
        ))
        .await
        .unwrap();

        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let command: serde_json::Value = serde_json::from_str(&text).unwrap();
            let reply = serde_json::json!({
                "Identifier": command["Identifier"],
                "Message": format!("echo:{}", command["Message"].as_str().unwrap_or_default()),
                "Type": "Generic",
            });
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    });

    port
}

async fn wait_connected(client: &RconClient) {
    for _ in 0..100 {
        if client.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("RCON client never connected");
}

#[tokio::test]
async fn test_websocket_round_trip() {
    init_tracing();
    let port = spawn_echo_server().await;

    let client = RconClient::connect(
        RconSettings {
            host: "127.0.0.1".to_string(),
            port,
            password: "secret".to_string(),
            log_messages: true,
            chat_identifier: -1,
        },
        Arc::new(WebSocketTransport::new()),
        Arc::new(RandomIds::new()),
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.register_broadcast_listener(move |message| {
        let _ = tx.send(message.to_string());
    });

    wait_connected(&client).await;

    let response = client.send("status", Duration::from_secs(5)).await;
    assert_eq!(response, "echo:status");

    let welcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(
        welcome.as_deref(),
        Some(r#"{"Identifier":0,"Message":"welcome","Type":"Generic"}"#)
    );
}

#[tokio::test]
async fn test_unreachable_server_is_not_an_error() {
    init_tracing();
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = RconClient::connect(
        RconSettings {
            host: "127.0.0.1".to_string(),
            port,
            password: "secret".to_string(),
            log_messages: false,
            chat_identifier: -1,
        },
        Arc::new(WebSocketTransport::new()),
        Arc::new(RandomIds::new()),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!client.is_connected());
    assert_eq!(client.send("status", Duration::from_secs(1)).await, "");
}

#[test]
fn test_url_carries_password_in_path() {
    let settings = RconSettings {
        host: "10.0.0.5".to_string(),
        port: 28016,
        password: "p4ss".to_string(),
        log_messages: false,
        chat_identifier: -1,
    };
    assert_eq!(settings.url(), "ws://10.0.0.5:28016/p4ss");
}
