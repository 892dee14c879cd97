use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::language::{ScriptDetector, SimulatedTranslator};
use crate::relay::Relay;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Pairing and routing core; owns the connection registry
    pub relay: Arc<Relay>,
    /// How often the server pings each WebSocket
    pub ping_interval: Duration,
    /// How long to wait for a pong before closing the socket
    pub pong_timeout: Duration,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let relay = Relay::new(
            Arc::new(ScriptDetector),
            Arc::new(SimulatedTranslator),
            config.default_language.clone(),
        );
        Self {
            relay: Arc::new(relay),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
            started_at: Utc::now(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
