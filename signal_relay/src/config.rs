use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Relay config (figment-deserialized from defaults / TOML file / env vars)
// =============================================================================
//
//   relay.toml:      [server]
//                    port = 9000
//
//   env var:         SIGNAL_RELAY_SERVER__PORT=9000   (double underscore = nesting)
//
// A bare `PORT` variable is also honored for the listen port, below the
// prefixed variables.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

/// Listener and per-connection knobs (lives under `[server]`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route that accepts WebSocket upgrades. Must not be `/health`.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Frames buffered per peer before deliveries to it are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/".to_string()
}
fn default_outbound_queue() -> usize {
    64
}

/// Build a figment that layers: defaults → TOML file → `PORT` → SIGNAL_RELAY_* env vars.
///
/// A missing file is not an error; figment treats it as an empty layer.
pub fn load_config(file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(RelayConfig::default()));
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    figment
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
        .merge(Env::prefixed("SIGNAL_RELAY_").split("__"))
}

/// Route reserved for the health check.
pub const HEALTH_PATH: &str = "/health";

impl RelayConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, figment::Error> {
        let config: Self = load_config(file).extract()?;
        config.server.validate()?;
        Ok(config)
    }
}

impl ServerConfig {
    /// Reject values the router cannot mount.
    pub fn validate(&self) -> Result<(), figment::Error> {
        if !self.ws_path.starts_with('/') {
            return Err(format!("server.ws_path must start with '/', got {:?}", self.ws_path).into());
        }
        if self.ws_path == HEALTH_PATH {
            return Err(format!("server.ws_path cannot be {HEALTH_PATH}").into());
        }
        Ok(())
    }
}
