//! Session configuration and config file loading.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::error::{ClientError, ConfigError};

/// Interface name used when no display name is configured
pub const DEFAULT_INTERFACE_NAME: &str = "tunlink";

/// Schemes accepted for the coordinator endpoint
const ALLOWED_SCHEMES: [&str; 2] = ["ws", "wss"];

/// Session configuration, fixed once the client starts
#[derive(Clone, Default)]
pub struct ClientConfig {
    name: String,
    password: Zeroizing<String>,
    endpoint: Option<Url>,
    local_address: Option<Ipv4Network>,
    dynamic_address: Option<String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name; the interface becomes `tunlink-<name>`
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Zeroizing::new(password.into());
    }

    /// Coordinator endpoint. Only `ws://` and `wss://` URLs are accepted.
    pub fn set_websocket_server(&mut self, uri: &str) -> Result<(), ClientError> {
        let url = Url::parse(uri).map_err(|source| ClientError::InvalidEndpoint {
            uri: uri.to_string(),
            source,
        })?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
        }
        self.endpoint = Some(url);
        Ok(())
    }

    /// Static address in CIDR form. Empty means "ask the coordinator".
    pub fn set_local_address(&mut self, cidr: &str) -> Result<(), ClientError> {
        if cidr.is_empty() {
            self.local_address = None;
            return Ok(());
        }
        let network = Ipv4Network::from_str(cidr)
            .map_err(|_| ClientError::InvalidAddress(cidr.to_string()))?;
        self.local_address = Some(network);
        Ok(())
    }

    /// Hint sent with a dynamic address request. Validated only when used.
    pub fn set_dynamic_address(&mut self, cidr: &str) {
        self.dynamic_address = (!cidr.is_empty()).then(|| cidr.to_string());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    pub fn local_address(&self) -> Option<Ipv4Network> {
        self.local_address
    }

    pub fn dynamic_address(&self) -> Option<&str> {
        self.dynamic_address.as_deref()
    }

    /// Name of the TUN device this session creates
    pub fn interface_name(&self) -> String {
        if self.name.is_empty() {
            DEFAULT_INTERFACE_NAME.to_string()
        } else {
            format!("{}-{}", DEFAULT_INTERFACE_NAME, self.name)
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("local_address", &self.local_address)
            .field("dynamic_address", &self.dynamic_address)
            .finish()
    }
}

/// Contents of a TOML config file. Every key is optional; command-line
/// flags take precedence over values found here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Coordinator WebSocket URL
    pub websocket: Option<String>,
    pub password: Option<String>,
    /// Static TUN address in CIDR form
    pub tun: Option<String>,
    /// Dynamic address hint in CIDR form
    pub dynamic: Option<String>,
    pub name: Option<String>,
    /// Seconds to wait before restarting a session that ended on its own
    pub restart: Option<u64>,
}

/// Load and parse a config file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
