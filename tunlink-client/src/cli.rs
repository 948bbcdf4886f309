use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{self, ClientConfig, FileConfig};
use crate::error::ClientError;

/// tunlink VPN Client
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tunlink")]
#[command(version)]
#[command(about = "Join a virtual network through a WebSocket coordinator", long_about = None)]
pub struct Args {
    /// Coordinator WebSocket URL (ws:// or wss://)
    #[arg(short, long)]
    pub websocket: Option<String>,

    /// Shared secret used to tag auth and address records
    #[arg(short, long)]
    pub password: Option<String>,

    /// Static TUN address in CIDR form, e.g. 10.0.0.5/24
    #[arg(short, long)]
    pub tun: Option<String>,

    /// Ask the coordinator for an address near this CIDR hint
    #[arg(short, long)]
    pub dynamic: Option<String>,

    /// Display name; the TUN device is called tunlink-<name>
    #[arg(short, long)]
    pub name: Option<String>,

    /// TOML config file; command-line flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds to wait before starting a new session after the
    /// coordinator ends one (0 exits instead)
    #[arg(long)]
    pub restart: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Everything the binary needs to run sessions
#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    /// `None` means exit when a session ends
    pub restart: Option<Duration>,
}

impl Args {
    /// Merge command-line flags over the config file, if any
    pub fn resolve(&self) -> Result<Settings, ClientError> {
        let file = match &self.config {
            Some(path) => config::load_file(path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    fn merge(&self, file: FileConfig) -> Result<Settings, ClientError> {
        let mut client = ClientConfig::new();

        let websocket = self
            .websocket
            .clone()
            .or(file.websocket)
            .ok_or(ClientError::MissingEndpoint)?;
        client.set_websocket_server(&websocket)?;

        if let Some(password) = self.password.clone().or(file.password) {
            client.set_password(password);
        }
        if let Some(name) = self.name.clone().or(file.name) {
            client.set_name(name);
        }
        if let Some(tun) = self.tun.clone().or(file.tun) {
            client.set_local_address(&tun)?;
        }
        if let Some(dynamic) = self.dynamic.clone().or(file.dynamic) {
            client.set_dynamic_address(&dynamic);
        }

        let restart = self
            .restart
            .or(file.restart)
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Ok(Settings { client, restart })
    }
}
