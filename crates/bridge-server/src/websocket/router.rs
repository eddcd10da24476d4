//! Per-connection message routing.
//!
//! A connection starts unattached; its first message must be `HANDSHAKE`.
//! Once attached, messages are dispatched to the session they joined.
//! Routing is synchronous: nothing here awaits, and every reply or
//! broadcast is queued without blocking.

use std::sync::Arc;

use bridge_core::protocol::{
    AdvertisedConfig, ClientRole, Handshake, InboundMessage, OutboundMessage,
};
use bridge_core::{BridgeError, ProtocolError, SessionId, now_millis};
use metrics::counter;
use tracing::{debug, info, warn};

use super::broadcast::fan_out;
use super::connection::ClientConnection;
use crate::metrics::MESSAGES_ROUTED_TOTAL;
use crate::relay;
use crate::store::{SessionHandle, SessionStore};

/// What the transport should do after a message was routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Keep reading.
    Continue,
    /// Close the connection for a protocol violation.
    Close(ProtocolError),
}

struct Attachment {
    session_id: SessionId,
    session: SessionHandle,
    role: ClientRole,
}

/// Routes inbound messages for one connection.
pub struct MessageRouter {
    store: Arc<SessionStore>,
    connection: Arc<ClientConnection>,
    advertised: AdvertisedConfig,
    attachment: Option<Attachment>,
}

impl MessageRouter {
    /// Create a router for a freshly opened connection.
    pub fn new(
        store: Arc<SessionStore>,
        connection: Arc<ClientConnection>,
        advertised: AdvertisedConfig,
    ) -> Self {
        Self {
            store,
            connection,
            advertised,
            attachment: None,
        }
    }

    /// Session this connection is attached to, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.attachment.as_ref().map(|a| &a.session_id)
    }

    /// Role this connection attached with, if any.
    pub fn role(&self) -> Option<ClientRole> {
        self.attachment.as_ref().map(|a| a.role)
    }

    /// Route one text frame.
    pub fn handle_text(&mut self, text: &str) -> RouteOutcome {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => return RouteOutcome::Close(e),
        };
        counter!(MESSAGES_ROUTED_TOTAL, "type" => metric_label(&message)).increment(1);

        if self.attachment.is_none() {
            return match message {
                InboundMessage::Handshake(handshake) => {
                    self.handshake(handshake);
                    RouteOutcome::Continue
                }
                other => {
                    debug!(conn_id = %self.connection.id, message_type = other.kind(), "message before handshake");
                    RouteOutcome::Close(ProtocolError::HandshakeRequired)
                }
            };
        }

        self.dispatch(message);
        RouteOutcome::Continue
    }

    /// Detach from the session after the transport closed.
    ///
    /// Broadcasts `CLIENT_DISCONNECTED` to the remaining connections and
    /// removes the session if nothing is left attached.
    pub fn on_close(&mut self) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        let conn_id = self.connection.id.clone();
        self.connection.mark_closed();

        let orphaned = {
            let mut session = attachment.session.lock();
            let detached = match attachment.role {
                ClientRole::Producer => session.detach_producer(&conn_id),
                ClientRole::Subscriber => session.detach_subscriber(&conn_id),
            };
            if detached {
                let message = OutboundMessage::ClientDisconnected {
                    role: attachment.role,
                    connection_id: conn_id.clone(),
                    timestamp: now_millis(),
                };
                let _ = fan_out(&session.recipients(), &message);
            }
            session.is_orphaned()
        };

        info!(
            conn_id = %conn_id,
            session_id = %attachment.session_id,
            role = attachment.role.as_str(),
            "client detached"
        );

        if orphaned
            && self
                .store
                .remove_if_orphaned(&attachment.session_id, &attachment.session)
        {
            debug!(session_id = %attachment.session_id, "removed session with no remaining connections");
        }
    }

    fn handshake(&mut self, handshake: Handshake) {
        let Handshake {
            session_id,
            client_name,
            role,
        } = handshake;
        let client_name = client_name.unwrap_or_else(|| "unknown".to_string());
        let connection = Arc::clone(&self.connection);
        let advertised = self.advertised.clone();
        let now = now_millis();

        let (session, session_id) = self.store.attach(session_id, |session| {
            session.touch(now);
            match role {
                ClientRole::Producer => {
                    if let Some(previous) = session.attach_producer(Arc::clone(&connection)) {
                        if previous.id != connection.id {
                            info!(
                                session_id = %session.id(),
                                displaced = %previous.id,
                                "producer displaced"
                            );
                        }
                    }
                }
                ClientRole::Subscriber => session.attach_subscriber(&connection),
            }
            let session_id = session.id().clone();

            let _ = connection.send_message(&OutboundMessage::HandshakeAck {
                session_id: session_id.clone(),
                connection_id: connection.id.clone(),
                role,
                config: advertised,
                timestamp: now,
            });
            let _ = fan_out(
                &session.recipients(),
                &OutboundMessage::ClientConnected {
                    role,
                    connection_id: connection.id.clone(),
                    client_name: client_name.clone(),
                    timestamp: now,
                },
            );
            session_id
        });

        info!(
            conn_id = %self.connection.id,
            session_id = %session_id,
            role = role.as_str(),
            client_name = %client_name,
            "client attached"
        );
        self.attachment = Some(Attachment {
            session_id,
            session,
            role,
        });
    }

    fn dispatch(&self, message: InboundMessage) {
        let Some(attachment) = &self.attachment else {
            return;
        };
        let live = self
            .store
            .is_current(&attachment.session_id, &attachment.session)
            .then(|| Arc::clone(&attachment.session));
        if let Some(session) = &live {
            session.lock().touch(now_millis());
        }
        debug!(
            conn_id = %self.connection.id,
            session_id = %attachment.session_id,
            message_type = message.kind(),
            "routing message"
        );

        let result = match message {
            InboundMessage::Ping => {
                self.reply(&OutboundMessage::pong());
                Ok(())
            }
            InboundMessage::Handshake(_) => {
                self.reply(&OutboundMessage::error("Already attached to a session"));
                Ok(())
            }
            InboundMessage::Unknown { kind, .. } => {
                warn!(conn_id = %self.connection.id, message_type = %kind, "ignoring unknown message type");
                Ok(())
            }
            InboundMessage::Event { event } => live
                .ok_or_else(|| not_found(attachment))
                .and_then(|s| relay::ingest_event(&self.store, &s, event, attachment.role))
                .map(drop),
            InboundMessage::MetricsUpdate { metrics } => live
                .ok_or_else(|| not_found(attachment))
                .and_then(|s| relay::update_metrics(&s, metrics))
                .map(drop),
            InboundMessage::ConfigUpdate { config } => live
                .ok_or_else(|| not_found(attachment))
                .and_then(|s| relay::update_config(&s, config))
                .map(drop),
            InboundMessage::SyncControl { action, params } => live
                .ok_or_else(|| not_found(attachment))
                .and_then(|s| relay::sync_control(&s, action, params))
                .map(drop),
            InboundMessage::GetState => live.ok_or_else(|| not_found(attachment)).map(|s| {
                let state = s.lock().state();
                self.reply(&OutboundMessage::StateSnapshot {
                    state,
                    timestamp: now_millis(),
                });
            }),
        };

        if let Err(e) = result {
            debug!(conn_id = %self.connection.id, error = %e, "message rejected");
            self.reply(&OutboundMessage::error(e.to_string()));
        }
    }

    fn reply(&self, message: &OutboundMessage) {
        if !self.connection.send_message(message) {
            debug!(conn_id = %self.connection.id, message_type = message.kind(), "reply not delivered");
        }
    }
}

fn not_found(attachment: &Attachment) -> BridgeError {
    BridgeError::SessionNotFound(attachment.session_id.clone())
}

fn metric_label(message: &InboundMessage) -> &'static str {
    match message {
        InboundMessage::Handshake(_) => "HANDSHAKE",
        InboundMessage::Event { .. } => "EVENT",
        InboundMessage::MetricsUpdate { .. } => "METRICS_UPDATE",
        InboundMessage::ConfigUpdate { .. } => "CONFIG_UPDATE",
        InboundMessage::SyncControl { .. } => "SYNC_CONTROL",
        InboundMessage::Ping => "PING",
        InboundMessage::GetState => "GET_STATE",
        InboundMessage::Unknown { .. } => "UNKNOWN",
    }
}
