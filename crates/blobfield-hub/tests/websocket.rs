//! End-to-end tests over a real WebSocket connection.

use std::time::Duration;

use blobfield_hub::{BlobfieldServer, HubConfig, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    url: String,
    _stop: oneshot::Sender<()>,
}

async fn start(max_users: usize) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        addr,
        hub: HubConfig {
            max_users,
            tick_interval: Duration::from_millis(20),
            ..HubConfig::default()
        },
        ..ServerConfig::default()
    };

    let server = BlobfieldServer::new(config);
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(server.serve_on(listener, async move {
        let _ = stopped.await;
    }));

    TestServer {
        url: format!("ws://{addr}/ws"),
        _stop: stop,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (client, _) = connect_async(server.url.as_str()).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Read frames until one of the given type arrives.
async fn next_of_type(client: &mut Client, kind: &str) -> Value {
    timeout(Duration::from_secs(3), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    if value["type"] == kind {
                        return value;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for {kind}: {other:?}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}

#[tokio::test]
async fn welcome_identity_and_tick() {
    let server = start(4).await;
    let mut client = connect(&server).await;

    let welcome = next_of_type(&mut client, "welcome").await;
    assert_eq!(welcome["payload"]["sessionId"], 1);
    assert!(welcome["payload"]["neutralDNA"]["color"].is_array());
    assert!(!welcome["payload"]["questions"].as_array().unwrap().is_empty());
    assert_eq!(welcome["payload"]["world"]["mood"], "VOID");

    let presence = next_of_type(&mut client, "presence").await;
    assert_eq!(presence["payload"], json!({"lobbyCount": 0, "total": 1}));

    send(
        &mut client,
        json!({
            "type": "submit_identity",
            "payload": {"answers": ["water", "dusk", "glass"], "imageHash": 5150, "intent": {"ai": 20, "artist": 60, "user": 20}}
        }),
    )
    .await;

    let confirmed = next_of_type(&mut client, "identity_confirmed").await;
    let dna = confirmed["payload"]["dna"].clone();
    assert_eq!(dna["freqs"].as_array().unwrap().len(), 6);

    let tick = next_of_type(&mut client, "tick").await;
    assert_eq!(tick["payload"]["myDNA"], dna);
    assert_eq!(tick["payload"]["world"]["lobbyCount"], 1);
    assert_eq!(tick["payload"]["world"]["ai"], 20);
    assert!(tick["payload"]["others"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn peers_see_redacted_views() {
    let server = start(4).await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;

    for (client, word) in [(&mut a, "moss"), (&mut b, "ember")] {
        send(client, json!({"type": "submit_identity", "payload": {"answers": [word]}})).await;
        next_of_type(client, "identity_confirmed").await;
    }

    let tick = loop {
        let tick = next_of_type(&mut a, "tick").await;
        if tick["payload"]["others"].as_array().unwrap().len() == 1 {
            break tick;
        }
    };
    let peer = tick["payload"]["others"][0].as_object().unwrap().clone();
    assert_eq!(peer["id"], 2);
    let mut keys: Vec<&str> = peer.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["breathAmt", "color", "glossiness", "id", "innerGlow"]);
}

#[tokio::test]
async fn capacity_refusal_closes_with_reason() {
    let server = start(1).await;
    let mut first = connect(&server).await;
    next_of_type(&mut first, "welcome").await;

    let mut second = connect(&server).await;
    let frame = timeout(Duration::from_secs(3), second.next())
        .await
        .expect("timed out waiting for close");
    match frame {
        Some(Ok(Message::Close(Some(close)))) => {
            assert_eq!(u16::from(close.code), 1013);
            assert!(close.reason.as_str().contains("full"));
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_and_disconnect() {
    let server = start(4).await;
    let mut a = connect(&server).await;
    next_of_type(&mut a, "welcome").await;

    send(&mut a, json!({"type": "ping", "payload": {}})).await;
    let pong = next_of_type(&mut a, "pong").await;
    assert!(pong["payload"]["ts"].as_u64().unwrap() > 0);

    let mut b = connect(&server).await;
    next_of_type(&mut b, "welcome").await;
    let joined = next_of_type(&mut a, "presence").await;
    assert_eq!(joined["payload"]["total"], 2);

    b.close(None).await.unwrap();
    let left = next_of_type(&mut a, "presence").await;
    assert_eq!(left["payload"]["total"], 1);
}

#[tokio::test]
async fn garbage_is_ignored() {
    let server = start(4).await;
    let mut a = connect(&server).await;
    next_of_type(&mut a, "welcome").await;

    a.send(Message::Text("definitely not json".into())).await.unwrap();
    send(&mut a, json!({"type": "teleport", "payload": {}})).await;
    send(&mut a, json!({"type": "ping"})).await;

    // The connection survives and still answers.
    next_of_type(&mut a, "pong").await;
}
