use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Every setting is optional so that only values the
/// user actually supplied override the TOML file and environment.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "proptalk-relay", version, about = "PropTalk client/agent relay server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PROPTALK_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "PROPTALK_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, env = "PROPTALK_CONFIG", default_value = "./proptalk.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PROPTALK_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Seconds between server pings on each WebSocket
    #[arg(long, env = "PROPTALK_PING_INTERVAL_SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,

    /// Seconds to wait for a pong before closing the socket
    #[arg(long, env = "PROPTALK_PONG_TIMEOUT_SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,

    /// Preferred language assumed when a user does not state one
    #[arg(long, env = "PROPTALK_DEFAULT_LANGUAGE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
}

/// Effective server configuration after all layers are merged.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
    pub default_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            default_language: "English".to_string(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PROPTALK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Cli::parse())
    }

    /// Merge the layers under already-parsed flags.
    pub fn load_from(cli: Cli) -> Result<Self, figment::Error> {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PROPTALK_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# PropTalk Relay Configuration
# Place this file at ./proptalk.toml or specify with --config <path>
# All settings can be overridden via environment variables (PROPTALK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Connection liveness ----

# Seconds between server pings (default: 30)
# ping_interval_secs = 30

# Seconds to wait for a pong before closing the socket (default: 10)
# pong_timeout_secs = 10

# ---- Languages ----

# Preferred language for users who join without stating one (default: English)
# default_language = "English"
"#
    .to_string()
}
