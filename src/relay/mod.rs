//! The pairing and message-relay core.
//!
//! [`Relay`] owns the [`Registry`] behind a single mutex. Every inbound event
//! (join, chat, accept, translate, exit, disconnect) takes the lock once,
//! applies its registry changes and queues its outbound frames before
//! releasing it. Outbound queues are unbounded `mpsc` channels, so sending
//! never blocks while the lock is held, and frames from one sender reach
//! each recipient in the order they were issued.

pub mod events;
pub mod pairing;
pub mod registry;
pub mod router;

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::language::{LanguageDetector, ScriptDetector, SimulatedTranslator, Translator};
use events::ServerEvent;
pub use registry::{Registry, RegistryStats, Role, SessionContext};
pub use router::{Delivery, UnroutedReason};

/// Opaque per-connection identifier assigned when the socket is accepted.
pub type SessionId = Uuid;

/// Sender half of a connection's outbound queue; the writer task owns the receiver.
pub type SessionSender = mpsc::UnboundedSender<Message>;

/// Close code sent to a session whose username was taken over by a newer session.
pub const CLOSE_SESSION_REPLACED: u16 = 4009;

pub struct Relay {
    registry: Mutex<Registry>,
    detector: Arc<dyn LanguageDetector>,
    translator: Arc<dyn Translator>,
    default_language: String,
}

impl Relay {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        translator: Arc<dyn Translator>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            detector,
            translator,
            default_language: default_language.into(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Track a newly accepted connection. It can receive fallback broadcasts
    /// right away but has no identity until it sends `newuser`.
    pub fn attach(&self, session: SessionId, tx: SessionSender) {
        self.lock().attach(session, tx);
        tracing::debug!(session_id = %session, "Session attached");
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock().stats()
    }

    /// Send an `error` event to one session.
    pub fn send_error(&self, session: SessionId, message: impl Into<String>) {
        let registry = self.lock();
        send_to(&registry, session, &ServerEvent::error(message));
    }

    /// Registry lock. A panic while holding it leaves the maps consistent
    /// (each update is applied in one step), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(
            Arc::new(ScriptDetector),
            Arc::new(SimulatedTranslator),
            "English",
        )
    }
}

/// Queue `event` for one session. A session that is gone is not an error:
/// the frame is dropped and `false` returned.
fn send_to(registry: &Registry, session: SessionId, event: &ServerEvent) -> bool {
    match event.to_message() {
        Ok(msg) => push(registry, session, msg),
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "Failed to encode event");
            false
        }
    }
}

/// Queue `event` for each session, encoding once. Returns how many queues accepted it.
fn send_to_many(registry: &Registry, sessions: &[SessionId], event: &ServerEvent) -> usize {
    let msg = match event.to_message() {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(event = event.name(), error = %e, "Failed to encode event");
            return 0;
        }
    };
    sessions
        .iter()
        .filter(|session| push(registry, **session, msg.clone()))
        .count()
}

fn push(registry: &Registry, session: SessionId, msg: Message) -> bool {
    registry
        .sender(session)
        .is_some_and(|tx| tx.send(msg).is_ok())
}

/// Ask a session's writer to close the socket.
fn close_session(registry: &Registry, session: SessionId, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    push(registry, session, Message::Close(Some(frame)));
}
