//! Connection registry: who is online, in which role, and who is paired with whom.
//!
//! Plain data with no locking of its own. [`super::Relay`] owns the single
//! instance behind one mutex, so every compound update here (register with
//! takeover, accept, unregister) is applied atomically with respect to
//! concurrent disconnects.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{SessionId, SessionSender};
use crate::error::RelayError;

/// Which side of the conversation a session registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Agent,
}

impl Role {
    /// Anything other than "agent" (including a missing field) is a client.
    pub fn from_user_type(user_type: Option<&str>) -> Self {
        match user_type {
            Some("agent") => Self::Agent,
            _ => Self::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity attached to a session once it registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub username: String,
    pub role: Role,
    pub preferred_language: String,
}

/// One live transport connection.
#[derive(Debug)]
struct Session {
    tx: SessionSender,
    context: Option<SessionContext>,
}

/// What [`Registry::register`] had to undo before inserting the new identity.
#[derive(Debug, Default)]
pub struct Registration {
    /// Another live session that held the same username and role. It has been
    /// unregistered and should be told to go away.
    pub replaced: Option<SessionId>,
    /// Identities cleared on the way in: the session's own earlier identity
    /// and/or the replaced session's.
    pub departures: Vec<Departure>,
}

/// Traces removed by one [`Registry::unregister`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub username: String,
    pub role: Role,
    /// Session that held the (username, role) mapping, if any.
    pub session: Option<SessionId>,
    /// Clients that were paired with a departing agent. They are back at the
    /// end of the waiting queue.
    pub orphaned_clients: Vec<String>,
}

/// Result of a successful [`Registry::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub client_session: SessionId,
    pub agent_session: SessionId,
    /// Agent the client was paired with before, when it was someone else.
    pub previous_agent: Option<String>,
}

/// Counts exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub clients: usize,
    pub agents: usize,
    pub waiting: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    clients: HashMap<String, SessionId>,
    agents: HashMap<String, SessionId>,
    /// Arrival order; at most one entry per client.
    waiting: VecDeque<String>,
    client_to_agent: HashMap<String, String>,
    /// Insertion ordered, no duplicates.
    agent_to_clients: HashMap<String, Vec<String>>,
    /// Waiting clients whose agent left. Their chats are held, not broadcast.
    requeued: HashSet<String>,
    languages: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- sessions ---

    /// Track a freshly connected, not yet registered session.
    pub fn attach(&mut self, session: SessionId, tx: SessionSender) {
        self.sessions.insert(session, Session { tx, context: None });
    }

    /// Forget a session and clean up whatever identity it registered.
    ///
    /// Returns `None` when the session was unknown or never registered.
    pub fn detach(&mut self, session: SessionId) -> Option<Departure> {
        let context = self.sessions.remove(&session)?.context?;
        Some(self.unregister(&context.username, context.role))
    }

    pub fn sender(&self, session: SessionId) -> Option<&SessionSender> {
        self.sessions.get(&session).map(|s| &s.tx)
    }

    pub fn context(&self, session: SessionId) -> Option<&SessionContext> {
        self.sessions.get(&session).and_then(|s| s.context.as_ref())
    }

    /// Every connected session except `exclude`, registered or not.
    pub fn sessions_except(&self, exclude: SessionId) -> Vec<SessionId> {
        self.sessions
            .keys()
            .copied()
            .filter(|id| *id != exclude)
            .collect()
    }

    // --- identities ---

    /// Register `context` on `session`.
    ///
    /// A session re-registering first drops its previous identity. If another
    /// live session already holds the same username in the same role, that
    /// session is unregistered and reported in [`Registration::replaced`].
    pub fn register(
        &mut self,
        session: SessionId,
        context: SessionContext,
    ) -> Result<Registration, RelayError> {
        if context.username.trim().is_empty() {
            return Err(RelayError::EmptyUsername);
        }

        let mut outcome = Registration::default();

        if let Some(previous) = self.context(session).cloned() {
            outcome
                .departures
                .push(self.unregister(&previous.username, previous.role));
        }

        if let Some(stale) = self.lookup_session(&context.username, context.role) {
            outcome
                .departures
                .push(self.unregister(&context.username, context.role));
            outcome.replaced = Some(stale);
        }

        let username = context.username.clone();
        self.languages
            .insert(username.clone(), context.preferred_language.clone());
        match context.role {
            Role::Client => {
                self.clients.insert(username.clone(), session);
                self.waiting.push_back(username);
            }
            Role::Agent => {
                self.agents.insert(username.clone(), session);
                self.agent_to_clients.insert(username, Vec::new());
            }
        }
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.context = Some(context);
        }

        Ok(outcome)
    }

    /// Remove every trace of `username` in `role`. Calling it again, or for a
    /// user who never registered, changes nothing.
    pub fn unregister(&mut self, username: &str, role: Role) -> Departure {
        let mut orphaned_clients = Vec::new();

        let session = match role {
            Role::Client => {
                let session = self.clients.remove(username);
                self.waiting.retain(|queued| queued != username);
                self.requeued.remove(username);
                if let Some(agent) = self.client_to_agent.remove(username) {
                    if let Some(assigned) = self.agent_to_clients.get_mut(&agent) {
                        assigned.retain(|client| client != username);
                    }
                }
                session
            }
            Role::Agent => {
                let session = self.agents.remove(username);
                if let Some(assigned) = self.agent_to_clients.remove(username) {
                    for client in assigned {
                        if self.client_to_agent.get(&client).map(String::as_str) == Some(username)
                        {
                            self.client_to_agent.remove(&client);
                            if !self.waiting.contains(&client) {
                                self.waiting.push_back(client.clone());
                            }
                            self.requeued.insert(client.clone());
                            orphaned_clients.push(client);
                        }
                    }
                }
                session
            }
        };

        if !self.clients.contains_key(username) && !self.agents.contains_key(username) {
            self.languages.remove(username);
        }

        if let Some(id) = session {
            if let Some(entry) = self.sessions.get_mut(&id) {
                let matches = entry
                    .context
                    .as_ref()
                    .is_some_and(|c| c.username == username && c.role == role);
                if matches {
                    entry.context = None;
                }
            }
        }

        Departure {
            username: username.to_string(),
            role,
            session,
            orphaned_clients,
        }
    }

    pub fn lookup_session(&self, username: &str, role: Role) -> Option<SessionId> {
        match role {
            Role::Client => self.clients.get(username).copied(),
            Role::Agent => self.agents.get(username).copied(),
        }
    }

    /// Change the preferred language of whatever identity `session` holds.
    /// Returns the updated context, or `None` if the session is unregistered.
    pub fn set_language(&mut self, session: SessionId, language: &str) -> Option<SessionContext> {
        let context = self.sessions.get_mut(&session)?.context.as_mut()?;
        context.preferred_language = language.to_string();
        self.languages
            .insert(context.username.clone(), language.to_string());
        Some(context.clone())
    }

    pub fn language_of(&self, username: &str) -> Option<&str> {
        self.languages.get(username).map(String::as_str)
    }

    // --- pairing ---

    /// Pair `client` with `agent`, overwriting any earlier pairing of that client.
    pub fn accept(&mut self, agent: &str, client: &str) -> Result<Acceptance, RelayError> {
        let client_session = self
            .lookup_session(client, Role::Client)
            .ok_or_else(|| RelayError::ClientNotConnected(client.to_string()))?;
        let agent_session = self
            .lookup_session(agent, Role::Agent)
            .ok_or_else(|| RelayError::AgentNotConnected(agent.to_string()))?;

        let previous_agent = self
            .client_to_agent
            .insert(client.to_string(), agent.to_string())
            .filter(|previous| previous != agent);
        if let Some(previous) = &previous_agent {
            if let Some(assigned) = self.agent_to_clients.get_mut(previous) {
                assigned.retain(|c| c != client);
            }
        }

        let assigned = self.agent_to_clients.entry(agent.to_string()).or_default();
        if !assigned.iter().any(|c| c == client) {
            assigned.push(client.to_string());
        }

        if let Some(pos) = self.waiting.iter().position(|queued| queued == client) {
            self.waiting.remove(pos);
        }
        self.requeued.remove(client);

        Ok(Acceptance {
            client_session,
            agent_session,
            previous_agent,
        })
    }

    pub fn agent_of(&self, client: &str) -> Option<&str> {
        self.client_to_agent.get(client).map(String::as_str)
    }

    pub fn clients_of(&self, agent: &str) -> &[String] {
        self.agent_to_clients
            .get(agent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `client` is back in the queue after losing its agent.
    pub fn is_requeued(&self, client: &str) -> bool {
        self.requeued.contains(client)
    }

    /// Waiting clients in arrival order.
    pub fn waiting(&self) -> impl Iterator<Item = &str> {
        self.waiting.iter().map(String::as_str)
    }

    /// Sessions of every registered agent.
    pub fn agent_sessions(&self) -> Vec<SessionId> {
        self.agents.values().copied().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.sessions.len(),
            clients: self.clients.len(),
            agents: self.agents.len(),
            waiting: self.waiting.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn attached(registry: &mut Registry) -> SessionId {
        // The registry never sends, so the receiver can go.
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        registry.attach(id, tx);
        id
    }

    fn ctx(username: &str, role: Role) -> SessionContext {
        SessionContext {
            username: username.to_string(),
            role,
            preferred_language: "English".to_string(),
        }
    }

    #[test]
    fn test_register_client_enters_waiting_queue() {
        let mut registry = Registry::new();
        let s = attached(&mut registry);
        registry.register(s, ctx("Neha", Role::Client)).unwrap();

        assert_eq!(registry.lookup_session("Neha", Role::Client), Some(s));
        assert_eq!(registry.lookup_session("Neha", Role::Agent), None);
        assert_eq!(registry.waiting().collect::<Vec<_>>(), vec!["Neha"]);
        assert_eq!(registry.language_of("Neha"), Some("English"));
        assert_eq!(registry.context(s).unwrap().username, "Neha");
    }

    #[test]
    fn test_register_agent_starts_with_no_clients() {
        let mut registry = Registry::new();
        let s = attached(&mut registry);
        registry.register(s, ctx("Rahul", Role::Agent)).unwrap();

        assert_eq!(registry.lookup_session("Rahul", Role::Agent), Some(s));
        assert!(registry.clients_of("Rahul").is_empty());
        assert_eq!(registry.waiting().count(), 0);
    }

    #[test]
    fn test_empty_username_rejected() {
        let mut registry = Registry::new();
        let s = attached(&mut registry);
        let err = registry.register(s, ctx("  ", Role::Client)).unwrap_err();
        assert_eq!(err, RelayError::EmptyUsername);
        assert_eq!(registry.stats().clients, 0);
        assert!(registry.context(s).is_none());
    }

    #[test]
    fn test_accept_moves_client_out_of_queue() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();

        let acceptance = registry.accept("Rahul", "Neha").unwrap();
        assert_eq!(acceptance.client_session, c);
        assert_eq!(acceptance.agent_session, a);
        assert_eq!(acceptance.previous_agent, None);
        assert_eq!(registry.agent_of("Neha"), Some("Rahul"));
        assert_eq!(registry.clients_of("Rahul"), ["Neha".to_string()]);
        assert_eq!(registry.waiting().count(), 0);
    }

    #[test]
    fn test_accept_unknown_client_has_no_effect() {
        let mut registry = Registry::new();
        let a = attached(&mut registry);
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();

        let err = registry.accept("Rahul", "Ghost").unwrap_err();
        assert_eq!(err, RelayError::ClientNotConnected("Ghost".to_string()));
        assert!(registry.clients_of("Rahul").is_empty());
        assert_eq!(registry.agent_of("Ghost"), None);
    }

    #[test]
    fn test_accept_requires_registered_agent() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();

        let err = registry.accept("Nobody", "Neha").unwrap_err();
        assert_eq!(err, RelayError::AgentNotConnected("Nobody".to_string()));
        assert_eq!(registry.waiting().collect::<Vec<_>>(), vec!["Neha"]);
    }

    #[test]
    fn test_reaccept_by_other_agent_moves_pairing() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a1 = attached(&mut registry);
        let a2 = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a1, ctx("Rahul", Role::Agent)).unwrap();
        registry.register(a2, ctx("Priya", Role::Agent)).unwrap();

        registry.accept("Rahul", "Neha").unwrap();
        let second = registry.accept("Priya", "Neha").unwrap();

        assert_eq!(second.previous_agent.as_deref(), Some("Rahul"));
        assert_eq!(registry.agent_of("Neha"), Some("Priya"));
        assert!(registry.clients_of("Rahul").is_empty());
        assert_eq!(registry.clients_of("Priya"), ["Neha".to_string()]);
    }

    #[test]
    fn test_reaccept_by_same_agent_does_not_duplicate() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();

        registry.accept("Rahul", "Neha").unwrap();
        let again = registry.accept("Rahul", "Neha").unwrap();
        assert_eq!(again.previous_agent, None);
        assert_eq!(registry.clients_of("Rahul").len(), 1);
    }

    #[test]
    fn test_detach_removes_every_trace_of_client() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();
        registry.accept("Rahul", "Neha").unwrap();

        let departure = registry.detach(c).unwrap();
        assert_eq!(departure.session, Some(c));
        assert_eq!(registry.lookup_session("Neha", Role::Client), None);
        assert_eq!(registry.agent_of("Neha"), None);
        assert!(registry.clients_of("Rahul").is_empty());
        assert_eq!(registry.language_of("Neha"), None);
        assert!(registry.sender(c).is_none());

        assert!(matches!(
            registry.accept("Rahul", "Neha"),
            Err(RelayError::ClientNotConnected(_))
        ));
    }

    #[test]
    fn test_agent_departure_requeues_its_clients() {
        let mut registry = Registry::new();
        let c1 = attached(&mut registry);
        let c2 = attached(&mut registry);
        let c3 = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c1, ctx("Neha", Role::Client)).unwrap();
        registry.register(c2, ctx("Arjun", Role::Client)).unwrap();
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();
        registry.accept("Rahul", "Neha").unwrap();
        registry.accept("Rahul", "Arjun").unwrap();
        registry.register(c3, ctx("Kavya", Role::Client)).unwrap();

        let departure = registry.unregister("Rahul", Role::Agent);
        assert_eq!(departure.orphaned_clients, vec!["Neha", "Arjun"]);
        assert_eq!(registry.agent_of("Neha"), None);
        assert_eq!(registry.agent_of("Arjun"), None);
        assert!(registry.context(a).is_none());

        // Orphans go behind whoever was already waiting.
        assert_eq!(
            registry.waiting().collect::<Vec<_>>(),
            vec!["Kavya", "Neha", "Arjun"]
        );
        assert!(registry.is_requeued("Neha"));
        assert!(!registry.is_requeued("Kavya"));
    }

    #[test]
    fn test_reaccept_clears_requeued_flag() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a1 = attached(&mut registry);
        let a2 = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a1, ctx("Rahul", Role::Agent)).unwrap();
        registry.accept("Rahul", "Neha").unwrap();
        registry.unregister("Rahul", Role::Agent);

        registry.register(a2, ctx("Priya", Role::Agent)).unwrap();
        registry.accept("Priya", "Neha").unwrap();
        assert!(!registry.is_requeued("Neha"));
        assert_eq!(registry.waiting().count(), 0);
        assert_eq!(registry.agent_of("Neha"), Some("Priya"));
    }

    #[test]
    fn test_requeued_client_leaving_is_forgotten() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();
        registry.register(a, ctx("Rahul", Role::Agent)).unwrap();
        registry.accept("Rahul", "Neha").unwrap();
        registry.unregister("Rahul", Role::Agent);

        registry.unregister("Neha", Role::Client);
        assert!(!registry.is_requeued("Neha"));
        assert_eq!(registry.stats().waiting, 0);
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        registry.register(c, ctx("Neha", Role::Client)).unwrap();

        registry.unregister("Neha", Role::Client);
        let before = registry.stats();
        let second = registry.unregister("Neha", Role::Client);
        assert_eq!(registry.stats(), before);
        assert_eq!(second.session, None);
        assert!(second.orphaned_clients.is_empty());
    }

    #[test]
    fn test_unregister_unknown_user_is_noop() {
        let mut registry = Registry::new();
        let departure = registry.unregister("Ghost", Role::Agent);
        assert_eq!(departure.session, None);
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_duplicate_username_takes_over_stale_session() {
        let mut registry = Registry::new();
        let old = attached(&mut registry);
        let new = attached(&mut registry);
        registry.register(old, ctx("Neha", Role::Client)).unwrap();

        let outcome = registry.register(new, ctx("Neha", Role::Client)).unwrap();
        assert_eq!(outcome.replaced, Some(old));
        assert_eq!(registry.lookup_session("Neha", Role::Client), Some(new));
        assert!(registry.context(old).is_none());
        assert_eq!(registry.waiting().collect::<Vec<_>>(), vec!["Neha"]);

        // The stale session disconnecting later must not clobber the new one.
        assert!(registry.detach(old).is_none());
        assert_eq!(registry.lookup_session("Neha", Role::Client), Some(new));
    }

    #[test]
    fn test_reregistering_session_drops_previous_identity() {
        let mut registry = Registry::new();
        let s = attached(&mut registry);
        registry.register(s, ctx("Neha", Role::Client)).unwrap();
        let outcome = registry.register(s, ctx("Neha", Role::Agent)).unwrap();

        assert_eq!(outcome.replaced, None);
        assert_eq!(outcome.departures.len(), 1);
        assert_eq!(registry.lookup_session("Neha", Role::Client), None);
        assert_eq!(registry.lookup_session("Neha", Role::Agent), Some(s));
        assert_eq!(registry.waiting().count(), 0);
    }

    #[test]
    fn test_language_kept_while_other_role_registered() {
        let mut registry = Registry::new();
        let c = attached(&mut registry);
        let a = attached(&mut registry);
        registry.register(c, ctx("Sam", Role::Client)).unwrap();
        registry.register(a, ctx("Sam", Role::Agent)).unwrap();

        registry.unregister("Sam", Role::Client);
        assert!(registry.language_of("Sam").is_some());
        registry.unregister("Sam", Role::Agent);
        assert!(registry.language_of("Sam").is_none());
    }

    #[test]
    fn test_set_language_updates_context_and_map() {
        let mut registry = Registry::new();
        let s = attached(&mut registry);
        registry.register(s, ctx("Neha", Role::Client)).unwrap();

        let updated = registry.set_language(s, "Hindi").unwrap();
        assert_eq!(updated.preferred_language, "Hindi");
        assert_eq!(registry.language_of("Neha"), Some("Hindi"));

        let stranger = attached(&mut registry);
        assert!(registry.set_language(stranger, "Hindi").is_none());
    }
}
