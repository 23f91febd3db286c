//! Connection settings for the Joplin REST API

use serde::{Deserialize, Serialize};

/// Where and how to reach Joplin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Host running the Joplin desktop app
    #[serde(default = "default_host")]
    pub host: String,

    /// Web Clipper service port
    #[serde(default = "default_port")]
    pub port: u16,

    /// API token (Tools > Options > Web Clipper)
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    41184
}

fn default_timeout() -> u64 {
    30
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}
