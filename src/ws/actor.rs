use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::relay::SessionSender;
use crate::state::AppState;
use crate::ws::protocol;

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming frames, dispatches to protocol handlers
///
/// The relay holds a clone of the channel sender, which is how other
/// sessions' events reach this socket.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let session = Uuid::new_v4();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    state.relay.attach(session, tx.clone());

    tracing::info!(
        session_id = %session,
        peer = %peer,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let (dead_tx, mut dead_rx) = oneshot::channel::<()>();
    let ping_handle = tokio::spawn(ping_task(
        tx.clone(),
        pong_rx,
        dead_tx,
        state.ping_interval,
        state.pong_timeout,
    ));

    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            // The ping task finished: the peer stopped answering or the writer is gone.
            _ = &mut dead_rx => {
                tracing::warn!(session_id = %session, "Peer unresponsive, ending session");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), session, &state);
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        session_id = %session,
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        session_id = %session,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %session,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(session_id = %session, "WebSocket stream ended");
                break;
            }
        }
    }

    // Unregister before tearing down the writer so nothing new is queued for us.
    state.relay.disconnect(session);

    writer_handle.abort();
    ping_handle.abort();

    tracing::info!(
        session_id = %session,
        peer = %peer,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// Ping task: sends periodic pings and closes the socket when a pong is late.
///
/// Dropping or firing `dead_tx` on exit wakes the reader loop, so a silent
/// peer is unregistered without waiting for the TCP stream to fail.
async fn ping_task(
    tx: SessionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    dead_tx: oneshot::Sender<()>,
    every: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(every);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                let _ = dead_tx.send(());
                break;
            }
        }
    }
}
