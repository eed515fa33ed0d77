//! Worker Session WebSocket edge (spec.md §4.3, `/ws/node`). One task per
//! connection: a handshake (first frame must be `register`), then a loop
//! forwarding inbound protocol messages into the Node Registry / Job Queue
//! and outbound messages from the connection's `WorkerConnections` sender
//! straight onto the socket.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use orchestrator_core::HeartbeatOutcome;
use orchestrator_protocol::{Inbound, Outbound, TerminalJobStatus};
use orchestrator_types::SessionId;
use tokio::sync::mpsc;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    let forward = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let session_id = match handshake(&mut stream, &state, outbound_tx.clone()).await {
        Some(session_id) => session_id,
        None => {
            forward.abort();
            return;
        }
    };

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else { continue };
        let inbound: Inbound = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(err) => {
                let _ = outbound_tx.send(Outbound::Error { message: format!("malformed message: {err}") });
                continue;
            }
        };

        if !dispatch(inbound, session_id, &state, &outbound_tx).await {
            break;
        }
    }

    // Transport closed: evict the session right away rather than waiting on
    // the liveness sweep or job timeout (spec.md §4.3 Reconnect, §5 — worker
    // disconnect is immediate WorkerLost cancellation plus one requeue).
    state.connections.detach(session_id);
    let lost_jobs = state.registry.disconnect(session_id);
    if !lost_jobs.is_empty() {
        state.queue.requeue_lost(lost_jobs).await;
    }
    forward.abort();
}

/// Blocks until the worker's first frame is a valid `register`, or the
/// socket closes without one. Returns the new session id on success.
async fn handshake(
    stream: &mut (impl futures::Stream<Item = Result<Message, axum::Error>> + Unpin),
    state: &AppState,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
) -> Option<SessionId> {
    let message = stream.next().await?.ok()?;
    let Message::Text(text) = message else { return None };
    let Ok(Inbound::Register { node_id, capabilities, workspace_ids, share_key, resource_limits }) = serde_json::from_str(&text) else {
        let _ = outbound_tx.send(Outbound::Error { message: "first message must be register".into() });
        return None;
    };

    let outcome = match state.registry.register(node_id.clone(), capabilities, workspace_ids, resource_limits, share_key) {
        Ok(outcome) => outcome,
        Err(err) => {
            let _ = outbound_tx.send(Outbound::Error { message: err.to_string() });
            return None;
        }
    };

    if !outcome.evicted_jobs.is_empty() {
        state.queue.requeue_lost(outcome.evicted_jobs.into_iter().collect()).await;
    }

    state.connections.attach(outcome.session_id, outbound_tx.clone());
    let _ = outbound_tx.send(Outbound::Registered { node_id: outcome.node_id, share_key: outcome.share_key });
    Some(outcome.session_id)
}

/// Handles one post-handshake inbound message. Returns `false` when the
/// connection should close (dead session, or a heartbeat that requires the
/// worker to re-register from scratch).
async fn dispatch(inbound: Inbound, session_id: SessionId, state: &AppState, outbound_tx: &mpsc::UnboundedSender<Outbound>) -> bool {
    match inbound {
        Inbound::Register { .. } => {
            let _ = outbound_tx.send(Outbound::Error { message: "already registered on this connection".into() });
            true
        }
        Inbound::Heartbeat { current_jobs, .. } => match state.registry.heartbeat(session_id, current_jobs) {
            HeartbeatOutcome::Ok => true,
            HeartbeatOutcome::ReregisterRequired => {
                let _ = outbound_tx.send(Outbound::Error { message: "reregister_required".into() });
                false
            }
            HeartbeatOutcome::DeadSessionDropped => {
                let _ = outbound_tx.send(Outbound::Error { message: "dead_session".into() });
                false
            }
        },
        Inbound::JobProgress { job_id, .. } => {
            state.queue.on_progress(session_id, job_id);
            true
        }
        Inbound::JobResult { job_id, status, result, error, actual_cost_cents, outputs } => {
            let success = status == TerminalJobStatus::Completed;
            let outputs = outputs.or(result);
            let actual_cost_cents = actual_cost_cents.unwrap_or(0);
            if let Err(err) = state.queue.on_result(session_id, job_id, success, outputs, error, actual_cost_cents).await {
                tracing::warn!(%job_id, %err, "job_result for unknown job");
            }
            true
        }
    }
}
