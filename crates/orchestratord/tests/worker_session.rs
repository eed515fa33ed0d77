//! Exercises the worker WebSocket edge end to end: register, then drive the
//! share-key / resource-limit admin endpoints against the real binary.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{process::Command, thread, time::Duration};
use tokio_tungstenite::tungstenite::Message;

struct Harness {
    child: std::process::Child,
    port: u16,
}

impl Harness {
    fn spawn() -> Self {
        let bin = std::env::var("CARGO_BIN_EXE_orchestratord").expect("CARGO_BIN_EXE_orchestratord not set");
        let port = pick_free_port();
        let child = Command::new(&bin)
            .env("ORCHESTRATORD_PORT", port.to_string())
            .spawn()
            .expect("failed to spawn orchestratord");
        thread::sleep(Duration::from_millis(500));
        Self { child, port }
    }

    fn http(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws/node", self.port)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn pick_free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|sock| sock.local_addr())
        .map(|addr| addr.port())
        .expect("failed to bind ephemeral port")
}

#[tokio::test]
async fn register_then_consume_share_key_binds_workspace() {
    let harness = Harness::spawn();

    let (mut ws, _) = tokio_tungstenite::connect_async(harness.ws_url()).await.expect("ws connect failed");
    ws.send(Message::Text(
        json!({
            "type": "register",
            "node_id": "integration-node-1",
            "capabilities": {
                "cpu": {"model": "x", "cores": 4, "threads": 4, "features": []},
                "memory": {"total_mb": 8192, "available_mb": 8192},
                "storage": {"total_gb": 100, "available_gb": 100},
                "gpus": [],
                "adapters": ["docker"]
            }
        })
        .to_string(),
    ))
    .await
    .unwrap();

    let reply = ws.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "registered");
    let share_key = reply["share_key"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let workspace_id = uuid::Uuid::new_v4();
    let resp = client
        .post(harness.http(&format!("/share-keys/{share_key}/consume")))
        .json(&json!({ "workspace_id": workspace_id }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "consume failed: {}", resp.status());

    // The worker should observe the binding as a pushed `workspaces_updated`.
    let pushed = ws.next().await.unwrap().unwrap();
    let pushed: Value = serde_json::from_str(pushed.to_text().unwrap()).unwrap();
    assert_eq!(pushed["type"], "workspaces_updated");
    assert_eq!(pushed["workspace_ids"][0], workspace_id.to_string());

    // A second consume of the same key is rejected once it no longer maps to
    // an unconsumed binding request distinct from the one already applied —
    // here we assert the key still resolves (idempotent rebind), per
    // spec.md's "idempotent if already bound" clause.
    let resp = client
        .post(harness.http(&format!("/share-keys/{share_key}/consume")))
        .json(&json!({ "workspace_id": workspace_id }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn unknown_share_key_consume_returns_not_found() {
    let harness = Harness::spawn();
    let client = reqwest::Client::new();
    let resp = client
        .post(harness.http("/share-keys/NOPE0000/consume"))
        .json(&json!({ "workspace_id": uuid::Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
