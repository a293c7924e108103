use std::net::SocketAddr;

use anyhow::Context;

use crate::service::{ServiceOptions, DEFAULT_STREAM_BUFFER};

pub const LISTEN_ADDR_VAR: &str = "MESSENGER_LISTEN_ADDR";
pub const LOG_LEVEL_VAR: &str = "MESSENGER_LOG_LEVEL";
pub const DISPLAY_NAME_VAR: &str = "MESSENGER_DISPLAY_NAME";
pub const STREAM_BUFFER_VAR: &str = "MESSENGER_STREAM_BUFFER";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// Display name of the account the embedded node is created for.
    pub display_name: String,
    pub stream_buffer: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Unset variables take their default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup(LISTEN_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context(format!("Failed to parse {LISTEN_ADDR_VAR}"))?;

        let stream_buffer = match lookup(STREAM_BUFFER_VAR) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .context(format!("Failed to parse {STREAM_BUFFER_VAR}: {value}"))?,
            None => DEFAULT_STREAM_BUFFER,
        };
        if stream_buffer == 0 {
            anyhow::bail!("{STREAM_BUFFER_VAR} must be at least 1");
        }

        Ok(Self {
            listen_addr,
            log_level: lookup(LOG_LEVEL_VAR).unwrap_or_else(|| "info".to_string()),
            display_name: lookup(DISPLAY_NAME_VAR).unwrap_or_else(|| "messenger".to_string()),
            stream_buffer,
        })
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            stream_buffer: self.stream_buffer,
        }
    }
}
