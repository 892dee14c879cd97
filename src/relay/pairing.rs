//! Pairing engine: join, accept, exit and disconnect transitions.
//!
//! Pairing is always agent initiated. Joining clients are queued and
//! advertised to agents; an agent picks one with `accept_client`.

use super::events::{AgentAssigned, ClientWaiting, ServerEvent};
use super::registry::{Departure, Registry, Role, SessionContext};
use super::{close_session, send_to, send_to_many, Relay, SessionId, CLOSE_SESSION_REPLACED};
use crate::error::RelayError;
use crate::language::UNKNOWN_LANGUAGE;

/// A `newuser` request after payload normalisation.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub username: String,
    pub role: Role,
    pub preferred_language: String,
    /// Joined with a bare username string (old chatroom client).
    pub legacy: bool,
}

impl Relay {
    /// Register `session` under the requested identity and announce it.
    pub fn join(&self, session: SessionId, request: JoinRequest) -> Result<(), RelayError> {
        let mut registry = self.lock();

        let context = SessionContext {
            username: request.username.trim().to_string(),
            role: request.role,
            preferred_language: request.preferred_language,
        };
        let registration = registry.register(session, context.clone())?;

        // A joining agent sees re-queued clients in its backlog replay below.
        for departure in &registration.departures {
            requeue_orphans(&registry, departure, Some(session));
        }
        if let Some(stale) = registration.replaced {
            tracing::warn!(
                username = %context.username,
                role = %context.role,
                stale_session = %stale,
                session_id = %session,
                "Username taken over by a new session"
            );
            close_session(&registry, stale, CLOSE_SESSION_REPLACED, "Session replaced");
        }

        tracing::info!(
            session_id = %session,
            username = %context.username,
            role = %context.role,
            preferred_language = %context.preferred_language,
            "User joined"
        );

        match context.role {
            Role::Client => on_client_join(
                &registry,
                &context.username,
                &context.preferred_language,
                None,
            ),
            Role::Agent => on_agent_join(&registry, session),
        }

        let notice = if request.legacy {
            format!("{} joined the conversation", context.username)
        } else {
            format!(
                "{} joined the conversation as a {}",
                context.username, context.role
            )
        };
        let others = registry.sessions_except(session);
        send_to_many(
            &registry,
            &others,
            &ServerEvent::update_from(notice, context.role),
        );

        Ok(())
    }

    /// Pair `client` with `agent` and notify both sides.
    ///
    /// `requester` is the session that sent `accept_client`; it receives the
    /// confirmation. On error nothing changes.
    pub fn accept_client(
        &self,
        requester: SessionId,
        agent: &str,
        client: &str,
    ) -> Result<(), RelayError> {
        let mut registry = self.lock();
        let acceptance = registry.accept(agent, client)?;

        if let Some(previous) = &acceptance.previous_agent {
            tracing::warn!(
                client = %client,
                previous_agent = %previous,
                agent = %agent,
                "Client re-accepted, previous pairing overwritten"
            );
        }
        tracing::info!(agent = %agent, client = %client, "Agent accepted client");

        send_to(
            &registry,
            acceptance.client_session,
            &ServerEvent::AgentAssigned(AgentAssigned {
                agent_username: agent.to_string(),
            }),
        );
        send_to(
            &registry,
            requester,
            &ServerEvent::update(format!("You are now connected with client {}.", client)),
        );

        Ok(())
    }

    /// Explicit `exituser`: drop the session's identity but keep the socket.
    pub fn exit(&self, session: SessionId) {
        let mut registry = self.lock();
        let Some(context) = registry.context(session).cloned() else {
            tracing::debug!(session_id = %session, "Exit from unregistered session ignored");
            return;
        };

        let departure = registry.unregister(&context.username, context.role);
        requeue_orphans(&registry, &departure, None);

        tracing::info!(
            session_id = %session,
            username = %context.username,
            role = %context.role,
            "User exited"
        );

        let others = registry.sessions_except(session);
        send_to_many(
            &registry,
            &others,
            &ServerEvent::update_from(
                format!("{} left the conversation", context.username),
                context.role,
            ),
        );
    }

    /// Transport disconnect: forget the session and everything it registered.
    pub fn disconnect(&self, session: SessionId) {
        let mut registry = self.lock();
        match registry.detach(session) {
            Some(departure) => {
                requeue_orphans(&registry, &departure, None);
                tracing::info!(
                    session_id = %session,
                    username = %departure.username,
                    role = %departure.role,
                    "User disconnected"
                );
            }
            None => tracing::debug!(session_id = %session, "Session detached"),
        }
    }

    /// Change the session's preferred language. Unregistered sessions are ignored.
    pub fn update_language(&self, session: SessionId, language: &str) {
        let mut registry = self.lock();
        if let Some(context) = registry.set_language(session, language) {
            tracing::debug!(
                username = %context.username,
                preferred_language = %language,
                "Preferred language updated"
            );
        }
    }
}

/// Tell every registered agent, bar `skip`, about a newly queued client.
fn on_client_join(
    registry: &Registry,
    username: &str,
    preferred_language: &str,
    skip: Option<SessionId>,
) {
    let agents: Vec<SessionId> = registry
        .agent_sessions()
        .into_iter()
        .filter(|agent| Some(*agent) != skip)
        .collect();
    let event = ServerEvent::ClientWaiting(ClientWaiting {
        username: username.to_string(),
        preferred_language: preferred_language.to_string(),
    });
    let delivered = send_to_many(registry, &agents, &event);
    tracing::debug!(client = %username, agents = delivered, "Advertised waiting client");
}

/// Replay the waiting queue, in arrival order, to a newly joined agent.
fn on_agent_join(registry: &Registry, agent_session: SessionId) {
    for username in registry.waiting() {
        let event = ServerEvent::ClientWaiting(ClientWaiting {
            username: username.to_string(),
            preferred_language: registry
                .language_of(username)
                .unwrap_or(UNKNOWN_LANGUAGE)
                .to_string(),
        });
        send_to(registry, agent_session, &event);
    }
}

/// Clients left without an agent are told so and advertised again to the
/// agents still online. The registry has already put them back in the queue.
fn requeue_orphans(registry: &Registry, departure: &Departure, skip: Option<SessionId>) {
    for client in &departure.orphaned_clients {
        if let Some(session) = registry.lookup_session(client, Role::Client) {
            send_to(
                registry,
                session,
                &ServerEvent::update(format!(
                    "Agent {} is no longer available.",
                    departure.username
                )),
            );
        }
        let language = registry.language_of(client).unwrap_or(UNKNOWN_LANGUAGE);
        tracing::info!(client = %client, agent = %departure.username, "Client re-queued");
        on_client_join(registry, client, language, skip);
    }
}
