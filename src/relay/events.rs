//! Server -> client events.
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data": <payload>}`.

use axum::extract::ws::Message;
use serde::Serialize;

use super::registry::Role;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// System notice: joins, leaves, assignment confirmations.
    Update(UpdateNotice),
    /// Relayed chat message: the sender's fields plus `detectedLanguage`.
    Chat(serde_json::Value),
    ClientWaiting(ClientWaiting),
    AgentAssigned(AgentAssigned),
    Translation(TranslationReply),
    TranslationError(TranslationFailure),
    Error(ErrorNotice),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWaiting {
    pub username: String,
    pub preferred_language: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssigned {
    pub agent_username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationReply {
    pub original_text: String,
    pub translation: String,
    pub target_language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslationFailure {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub message: String,
}

impl ServerEvent {
    pub fn update(message: impl Into<String>) -> Self {
        Self::Update(UpdateNotice {
            message: message.into(),
            user_type: None,
        })
    }

    pub fn update_from(message: impl Into<String>, role: Role) -> Self {
        Self::Update(UpdateNotice {
            message: message.into(),
            user_type: Some(role),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorNotice {
            message: message.into(),
        })
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Chat(_) => "chat",
            Self::ClientWaiting(_) => "client_waiting",
            Self::AgentAssigned(_) => "agent_assigned",
            Self::Translation(_) => "translation",
            Self::TranslationError(_) => "translation_error",
            Self::Error(_) => "error",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        Ok(Message::Text(text.into()))
    }
}
