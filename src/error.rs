use thiserror::Error;

/// Errors raised while handling a session's inbound events.
///
/// None of these are fatal: the protocol layer turns them into an `error`
/// event for the offending session and keeps serving everyone else.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("username must not be empty")]
    EmptyUsername,

    #[error("client {0} is not connected")]
    ClientNotConnected(String),

    #[error("agent {0} is not connected")]
    AgentNotConnected(String),

    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl RelayError {
    pub fn malformed(event: &str, reason: impl ToString) -> Self {
        Self::MalformedPayload {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}
