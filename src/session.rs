// =============================================================================
// OVERLAY COORDINATOR — session.rs
// Одна сессия = одно соединение пира
// =============================================================================
//
//   AwaitingFrame → Decoding → Classifying ─┬→ Diverting ─────────┐
//        ↑                                   ├→ DispatchingUpdate ─┼→ Responding
//        │                                   └→ DispatchingQuery ──┘      │
//        └────────────────────────────────────────────────────────────────┘
//   Любое состояние → Closed (peer close / idle timeout / transport / shutdown)
//
// Плохой кадр не закрывает соединение: он просто отбрасывается без ответа.
// =============================================================================

use crate::classifier::ClassificationFeatures;
use crate::coordinator::Coordinator;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec};
use crate::honeypot::Diversion;
use crate::protocol::Message;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFrame,
    Decoding,
    Classifying,
    DispatchingUpdate,
    DispatchingQuery,
    Diverting,
    Responding,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    IdleTimeout,
    Shutdown,
    Transport(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::Shutdown => write!(f, "shutdown"),
            CloseReason::Transport(e) => write!(f, "transport: {}", e),
        }
    }
}

/// Result of processing one frame.
#[derive(Debug)]
pub enum Outcome {
    /// Normal reply (`ack` / `query_response`).
    Respond(Message),
    /// Honeypot notice; the message never reached the store.
    Divert(Message),
    /// Frame dropped, no reply.
    Reject(Error),
    /// Authenticated message of a type this coordinator does not serve.
    Ignore(&'static str),
}

impl Outcome {
    pub fn response(&self) -> Option<&Message> {
        match self {
            Outcome::Respond(m) | Outcome::Divert(m) => Some(m),
            Outcome::Reject(_) | Outcome::Ignore(_) => None,
        }
    }
}

/// Keeps `sessions_active` honest even if the session task is aborted.
struct ActiveGuard(Arc<Coordinator>);

impl ActiveGuard {
    fn enter(coordinator: &Arc<Coordinator>) -> Self {
        coordinator.stats().session_opened();
        ActiveGuard(Arc::clone(coordinator))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.stats().session_closed();
    }
}

pub struct Session<S> {
    id: String,
    peer: SocketAddr,
    framed: Framed<S, FrameCodec>,
    coordinator: Arc<Coordinator>,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, coordinator: Arc<Coordinator>) -> Self {
        let codec = FrameCodec::new(coordinator.config().max_frame_len);
        Session {
            id: Uuid::new_v4().to_string(),
            peer,
            framed: Framed::new(stream, codec),
            coordinator,
            state: SessionState::AwaitingFrame,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        log::trace!("[{}] {:?} → {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Serves the connection until the peer leaves, it idles out, the
    /// transport breaks or `cancel` fires. The stream is dropped on return.
    pub async fn run(mut self, cancel: CancellationToken) -> CloseReason {
        let _active = ActiveGuard::enter(&self.coordinator);
        let idle = self.coordinator.config().idle_timeout;
        log::info!("🔗 [{}] Session open for {}", self.id, self.peer);

        let reason = loop {
            self.transition(SessionState::AwaitingFrame);
            let next = tokio::select! {
                _ = cancel.cancelled() => break CloseReason::Shutdown,
                next = tokio::time::timeout(idle, self.framed.next()) => next,
            };
            let frame = match next {
                Err(_) => break CloseReason::IdleTimeout,
                Ok(None) => break CloseReason::PeerClosed,
                Ok(Some(Err(e))) => break CloseReason::Transport(e.to_string()),
                Ok(Some(Ok(frame))) => frame,
            };

            if matches!(&frame, Frame::Line(line) if line.trim().is_empty()) {
                continue;
            }
            self.coordinator.stats().frame_received();
            let outcome = match frame {
                Frame::Line(line) => self.handle_line(&line),
                Frame::Oversized => Outcome::Reject(Error::protocol("frame exceeds length limit")),
                Frame::Malformed => Outcome::Reject(Error::protocol("frame is not UTF-8")),
            };
            if let Some(reason) = self.finish(outcome).await {
                break reason;
            }
        };

        self.transition(SessionState::Closed);
        match &reason {
            CloseReason::Transport(_) => log::warn!("⚠️ [{}] Session closed for {}: {}", self.id, self.peer, reason),
            _ => log::info!("🔌 [{}] Session closed for {}: {}", self.id, self.peer, reason),
        }
        reason
    }

    /// Decode, classify, then divert or dispatch one line. Never touches the socket.
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        self.transition(SessionState::Decoding);
        let value = match Envelope::from_line(line).and_then(|env| self.coordinator.codec().open_value(&env)) {
            Ok(value) => value,
            Err(e) => return Outcome::Reject(e),
        };
        let features = ClassificationFeatures::extract(&value);
        let message = match Message::from_value(value.clone()) {
            Ok(message) => message,
            Err(e) => return Outcome::Reject(e),
        };

        self.transition(SessionState::Classifying);
        if self.coordinator.classifier().classify(&features).is_anomalous() {
            self.transition(SessionState::Diverting);
            self.coordinator.honeypot().divert(Diversion {
                peer: self.peer,
                session_id: self.id.clone(),
                message: value,
                at: Utc::now(),
            });
            self.coordinator.stats().diverted();
            return Outcome::Divert(Message::honeypot_notice());
        }

        match message {
            Message::AttributeUpdate { peer_id, attributes } => {
                self.transition(SessionState::DispatchingUpdate);
                if peer_id.is_empty() {
                    return Outcome::Reject(Error::protocol("attribute_update without peer_id"));
                }
                match self.coordinator.store().update(&peer_id, attributes) {
                    Ok(()) => {
                        self.coordinator.stats().updated();
                        log::debug!("[{}] 📥 Attributes stored for {}", self.id, peer_id);
                        Outcome::Respond(Message::Ack)
                    }
                    Err(e) => Outcome::Reject(e),
                }
            }
            Message::Query { constraints, num_peers } => {
                self.transition(SessionState::DispatchingQuery);
                match self.coordinator.store().query(&constraints, num_peers) {
                    Ok(peers) => {
                        self.coordinator.stats().queried();
                        log::debug!("[{}] 🔎 Query matched {} peer(s)", self.id, peers.len());
                        Outcome::Respond(Message::QueryResponse { peers })
                    }
                    Err(e) => Outcome::Reject(e),
                }
            }
            other => {
                self.coordinator.stats().unknown();
                Outcome::Ignore(other.type_name())
            }
        }
    }

    /// Sends the reply if there is one. `Some` means the session must close.
    async fn finish(&mut self, outcome: Outcome) -> Option<CloseReason> {
        match outcome {
            Outcome::Respond(reply) | Outcome::Divert(reply) => match self.send(&reply).await {
                Ok(()) => None,
                Err(e) if e.is_fatal_to_session() => Some(CloseReason::Transport(e.to_string())),
                Err(e) => {
                    log::error!("❌ [{}] Reply not sent: {}", self.id, e);
                    None
                }
            },
            Outcome::Reject(e) => {
                self.coordinator.stats().frame_rejected();
                match e {
                    Error::StoreContention(_) => log::warn!("⚠️ [{}] Frame dropped: {}", self.id, e),
                    _ => log::debug!("[{}] Frame dropped ({})", self.id, e.kind()),
                }
                None
            }
            Outcome::Ignore(kind) => {
                log::debug!("[{}] Ignoring message of type {}", self.id, kind);
                None
            }
        }
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        self.transition(SessionState::Responding);
        let line = self.coordinator.codec().seal(message)?.to_line()?;
        let idle = self.coordinator.config().idle_timeout;
        match tokio::time::timeout(idle, self.framed.send(line)).await {
            Ok(sent) => sent.map_err(Error::from),
            Err(_) => Err(Error::Transport(io::Error::new(io::ErrorKind::TimedOut, "reply write timed out"))),
        }
    }
}
