//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bridge_core::protocol::{CLOSE_GOING_AWAY, OutboundMessage};
use bridge_core::{ConnectionId, ProtocolError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::connection::{ClientConnection, OutboundFrame};
use super::router::{MessageRouter, RouteOutcome};
use crate::metrics::{
    PROTOCOL_VIOLATIONS_TOTAL, ROUTER_PANICS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_OVER_LIMIT_TOTAL, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;

/// How long a server-initiated close waits for the writer to flush.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the push channel for one connected client.
///
/// Reads frames and hands them to a [`MessageRouter`]; a spawned writer
/// drains the connection's outbound queue and sends keepalive pings.
/// Returns once the client disconnects, a protocol violation closes the
/// socket, or the server shuts down.
#[instrument(skip_all, fields(conn_id = %connection_id))]
pub async fn run_ws_session(ws: WebSocket, connection_id: ConnectionId, state: AppState) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel(state.config.send_queue_size.max(1));
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));

    let live = state.registry.add(Arc::clone(&connection));
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    if live > state.config.max_connections {
        counter!(WS_CONNECTIONS_OVER_LIMIT_TOTAL).increment(1);
        warn!(
            live,
            max_connections = state.config.max_connections,
            "connection limit exceeded"
        );
    }
    info!(live, "client connected");

    let ping_interval = Duration::from_secs(state.config.ping_interval_secs.max(1));
    let mut writer = tokio::spawn(write_loop(ws_tx, send_rx, ping_interval));

    let mut router = MessageRouter::new(
        Arc::clone(&state.store),
        Arc::clone(&connection),
        state.config.advertised(),
    );
    let cancel = state.shutdown.token();
    let mut server_closed = false;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                let _ = connection.close(CLOSE_GOING_AWAY, "Server shutting down");
                server_closed = true;
                break;
            }
            frame = ws_rx.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    close_for_violation(&connection, &ProtocolError::Malformed);
                    server_closed = true;
                    break;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(frame))) => {
                debug!(code = frame.as_ref().map(|f| f.code), "client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };

        match route(&mut router, &connection, &text) {
            RouteOutcome::Continue => {}
            RouteOutcome::Close(violation) => {
                close_for_violation(&connection, &violation);
                server_closed = true;
                break;
            }
        }
    }

    connection.mark_closed();
    router.on_close();
    let _ = state.registry.remove(&connection.id);

    if server_closed
        && tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer)
            .await
            .is_err()
    {
        debug!("writer did not flush close frame in time");
    }
    writer.abort();

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        session_id = router.session_id().map(|id| id.as_str()),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

/// Route one frame, turning a panic inside the router into an `ERROR`
/// reply so a single bad message cannot take the connection down.
fn route(router: &mut MessageRouter, connection: &ClientConnection, text: &str) -> RouteOutcome {
    match std::panic::catch_unwind(AssertUnwindSafe(|| router.handle_text(text))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %detail, "message handler panicked");
            counter!(ROUTER_PANICS_TOTAL).increment(1);
            let _ = connection.send_message(&OutboundMessage::error(format!(
                "Internal error: {detail}"
            )));
            RouteOutcome::Continue
        }
    }
}

fn close_for_violation(connection: &ClientConnection, violation: &ProtocolError) {
    warn!(error = %violation, code = violation.close_code(), "closing connection on protocol violation");
    counter!(PROTOCOL_VIOLATIONS_TOTAL, "kind" => violation_label(violation)).increment(1);
    let _ = connection.close(violation.close_code(), violation.to_string());
}

fn violation_label(violation: &ProtocolError) -> &'static str {
    match violation {
        ProtocolError::Malformed => "malformed",
        ProtocolError::HandshakeRequired => "handshake_required",
        ProtocolError::InvalidHandshake(_) => "invalid_handshake",
    }
}

/// Forward queued frames to the socket and send periodic pings.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<OutboundFrame>,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(OutboundFrame::Text(text)) => {
                    if sink.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Close { code, reason }) => {
                    let frame = CloseFrame { code, reason: reason.into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}
