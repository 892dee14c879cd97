//! Message router: chat fan-out and translation replies.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::events::{ServerEvent, TranslationFailure, TranslationReply};
use super::registry::{Registry, Role};
use super::{send_to, send_to_many, Relay, SessionId};
use crate::error::RelayError;
use crate::language::UNKNOWN_LANGUAGE;

/// Why a chat message went out on the degraded full-broadcast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnroutedReason {
    /// The sender has no pairing yet.
    NoPairing,
    /// The message could not be processed; the original was forwarded as-is.
    ProcessingFault,
}

/// Where a chat message was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Normal routing along the sender's pairing.
    Paired { recipients: Vec<SessionId> },
    /// Degraded mode: every other connected session.
    Unrouted {
        reason: UnroutedReason,
        recipients: Vec<SessionId>,
    },
    /// The sender is a client back in the queue after its agent left.
    /// Nothing is sent until another agent accepts it.
    AwaitingAgent,
}

impl Delivery {
    pub fn recipients(&self) -> &[SessionId] {
        match self {
            Self::Paired { recipients } | Self::Unrouted { recipients, .. } => recipients,
            Self::AwaitingAgent => &[],
        }
    }

    pub fn is_unrouted(&self) -> bool {
        matches!(self, Self::Unrouted { .. })
    }
}

/// Who a chat message is from, once session context and payload are reconciled.
struct Sender {
    username: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
}

impl Relay {
    /// Relay a `chat` payload from `session`.
    ///
    /// The payload is forwarded with every field it arrived with plus
    /// `detectedLanguage`. A paired client reaches only its agent; an agent
    /// with clients reaches all of them (or just `targetClientUsername` when
    /// that client is one of its own). A client whose agent left is held
    /// until it is accepted again. Any other unpaired sender's message goes
    /// to every other session. A payload that cannot be processed also goes to
    /// every other session, forwarded exactly as received.
    pub fn route_chat(&self, session: SessionId, message: Value) -> Delivery {
        let registry = self.lock();

        let (enhanced, sender) = match self.enhance(&registry, session, &message) {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!(session_id = %session, error = %e, "Chat processing failed, forwarding original");
                let recipients = registry.sessions_except(session);
                send_to_many(&registry, &recipients, &ServerEvent::Chat(message));
                return Delivery::Unrouted {
                    reason: UnroutedReason::ProcessingFault,
                    recipients,
                };
            }
        };

        let delivery = match paired_recipients(&registry, &sender, &enhanced) {
            Some(recipients) => Delivery::Paired { recipients },
            None if sender.role == Role::Client && registry.is_requeued(&sender.username) => {
                Delivery::AwaitingAgent
            }
            None => Delivery::Unrouted {
                reason: UnroutedReason::NoPairing,
                recipients: registry.sessions_except(session),
            },
        };

        match &delivery {
            Delivery::Paired { recipients } => tracing::debug!(
                username = %sender.username,
                role = %sender.role,
                recipients = recipients.len(),
                "Routing chat to paired sessions"
            ),
            Delivery::Unrouted { recipients, .. } => tracing::debug!(
                username = %sender.username,
                role = %sender.role,
                recipients = recipients.len(),
                "Sender unpaired, broadcasting chat"
            ),
            Delivery::AwaitingAgent => tracing::debug!(
                username = %sender.username,
                "Client awaiting a new agent, chat held"
            ),
        }

        send_to_many(&registry, delivery.recipients(), &ServerEvent::Chat(enhanced));
        delivery
    }

    /// Answer a `translate` request. The reply goes to the requester only.
    pub fn route_translation_request(&self, session: SessionId, request: TranslateRequest) {
        let event = match self
            .translator
            .translate(&request.text, &request.target_language)
        {
            Ok(translation) => ServerEvent::Translation(TranslationReply {
                original_text: request.text,
                translation,
                target_language: request.target_language,
            }),
            Err(e) => {
                tracing::warn!(session_id = %session, error = %e, "Translation failed");
                translation_failed()
            }
        };

        let registry = self.lock();
        send_to(&registry, session, &event);
    }

    /// Reply with `translation_error` without attempting a translation.
    pub fn reject_translation(&self, session: SessionId) {
        let registry = self.lock();
        send_to(&registry, session, &translation_failed());
    }

    /// Work out the sender and build the outgoing payload with `detectedLanguage`.
    fn enhance(
        &self,
        registry: &Registry,
        session: SessionId,
        message: &Value,
    ) -> Result<(Value, Sender), RelayError> {
        let fields = message
            .as_object()
            .ok_or_else(|| RelayError::malformed("chat", "expected an object"))?;
        let text = fields
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::malformed("chat", "missing text"))?;

        let sender = match registry.context(session) {
            Some(context) => Sender {
                username: context.username.clone(),
                role: context.role,
            },
            None => Sender {
                username: fields
                    .get("username")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                role: Role::from_user_type(fields.get("userType").and_then(Value::as_str)),
            },
        };

        let detected = self
            .detector
            .detect(text)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let mut enhanced: Map<String, Value> = fields.clone();
        enhanced.insert("detectedLanguage".to_string(), Value::String(detected));
        Ok((Value::Object(enhanced), sender))
    }
}

/// Recipients along the sender's pairing, or `None` when the sender has none.
fn paired_recipients(
    registry: &Registry,
    sender: &Sender,
    message: &Value,
) -> Option<Vec<SessionId>> {
    match sender.role {
        Role::Client => {
            let agent = registry.agent_of(&sender.username)?;
            Some(registry.lookup_session(agent, Role::Agent).into_iter().collect())
        }
        Role::Agent => {
            let clients = registry.clients_of(&sender.username);
            if clients.is_empty() {
                return None;
            }
            let target = message
                .get("targetClientUsername")
                .and_then(Value::as_str)
                .filter(|target| clients.iter().any(|c| c == target));
            let recipients = match target {
                Some(target) => registry.lookup_session(target, Role::Client).into_iter().collect(),
                None => clients
                    .iter()
                    .filter_map(|client| registry.lookup_session(client, Role::Client))
                    .collect(),
            };
            Some(recipients)
        }
    }
}

fn translation_failed() -> ServerEvent {
    ServerEvent::TranslationError(TranslationFailure {
        error: "Translation failed".to_string(),
    })
}
