use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RelayError;
use crate::relay::pairing::JoinRequest;
use crate::relay::router::TranslateRequest;
use crate::relay::{Role, SessionId};
use crate::state::AppState;

/// Inbound frame: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// `newuser` payload. Old chatroom clients send just the username.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NewUserPayload {
    Legacy(String),
    Profile {
        username: String,
        #[serde(default, rename = "userType")]
        user_type: Option<String>,
        #[serde(default, rename = "preferredLanguage")]
        preferred_language: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptClientPayload {
    agent_username: String,
    client_username: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LanguagePayload {
    Bare(String),
    Object {
        #[serde(rename = "preferredLanguage")]
        preferred_language: String,
    },
}

/// Handle an incoming text frame.
/// Decodes the envelope, dispatches on the event name, and reports failures
/// back to the session as an `error` event. Never tears the connection down.
pub fn handle_text_message(text: &str, session: SessionId, state: &AppState) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                session_id = %session,
                error = %e,
                "Failed to decode event frame"
            );
            state.relay.send_error(session, "Invalid event frame");
            return;
        }
    };

    if let Err(e) = dispatch_event(&frame.event, frame.data, session, state) {
        tracing::warn!(
            session_id = %session,
            event = %frame.event,
            error = %e,
            "Event rejected"
        );
        state.relay.send_error(session, e.to_string());
    }
}

/// Dispatch a decoded event to the relay.
fn dispatch_event(
    event: &str,
    data: Value,
    session: SessionId,
    state: &AppState,
) -> Result<(), RelayError> {
    let relay = &state.relay;
    match event {
        "newuser" => {
            let request = join_request(parse(event, data)?, relay.default_language());
            relay.join(session, request)
        }
        "chat" => {
            relay.route_chat(session, data);
            Ok(())
        }
        "accept_client" => {
            let payload: AcceptClientPayload = parse(event, data)?;
            relay.accept_client(session, &payload.agent_username, &payload.client_username)
        }
        "translate" => {
            match parse::<TranslateRequest>(event, data) {
                Ok(request) => relay.route_translation_request(session, request),
                Err(e) => {
                    tracing::warn!(session_id = %session, error = %e, "Bad translate request");
                    relay.reject_translation(session);
                }
            }
            Ok(())
        }
        // The payload repeats the username; the session already knows who it is.
        "exituser" => {
            relay.exit(session);
            Ok(())
        }
        "update_language" => {
            let language = match parse::<LanguagePayload>(event, data)? {
                LanguagePayload::Bare(language) => language,
                LanguagePayload::Object { preferred_language } => preferred_language,
            };
            relay.update_language(session, &language);
            Ok(())
        }
        other => Err(RelayError::UnknownEvent(other.to_string())),
    }
}

fn parse<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, RelayError> {
    serde_json::from_value(data).map_err(|e| RelayError::malformed(event, e))
}

fn join_request(payload: NewUserPayload, default_language: &str) -> JoinRequest {
    match payload {
        NewUserPayload::Legacy(username) => JoinRequest {
            username,
            role: Role::Client,
            preferred_language: default_language.to_string(),
            legacy: true,
        },
        NewUserPayload::Profile {
            username,
            user_type,
            preferred_language,
        } => JoinRequest {
            username,
            role: Role::from_user_type(user_type.as_deref()),
            preferred_language: preferred_language
                .filter(|language| !language.is_empty())
                .unwrap_or_else(|| default_language.to_string()),
            legacy: false,
        },
    }
}
