//! tunlink - VPN client
//!
//! Creates a TUN device, negotiates its address with the coordinator and
//! forwards IPv4 traffic through the WebSocket connection.
//!
//! Usage:
//!   sudo tunlink --websocket wss://vpn.example.com --password secret --tun 10.0.0.5/24
//!   sudo tunlink --config /etc/tunlink.toml

use clap::Parser;
use tracing::{error, info, warn};

use tunlink_client::cli::Args;
use tunlink_client::utils::{self, BoxError};
use tunlink_client::{Client, SessionEnd, TunInterface, WebSocketTransport};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    utils::init_logging(args.verbose)?;

    let settings = args.resolve().map_err(|e| {
        error!("❌ Invalid configuration: {}", e);
        e
    })?;
    utils::check_privileges()?;

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                    tunlink VPN client                        ║");
    info!("╚══════════════════════════════════════════════════════════════╝");
    if let Some(endpoint) = settings.client.endpoint() {
        info!("  Coordinator: {}", endpoint);
    }
    info!("  Interface:   {}", settings.client.interface_name());
    match settings.client.local_address() {
        Some(address) => info!("  Address:     {}", address),
        None => info!("  Address:     dynamic"),
    }

    loop {
        let mut client = Client::new(
            settings.client.clone(),
            WebSocketTransport::new(),
            TunInterface::new(),
        );

        let reason = match client.start().await {
            Ok(()) => match client.run_until(utils::shutdown_signal()).await? {
                SessionEnd::Exited(reason) => reason,
                SessionEnd::Stopped => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            },
            Err(e) => {
                error!("❌ Failed to start session: {}", e);
                if settings.restart.is_none() {
                    return Err(e.into());
                }
                None
            }
        };

        client.shutdown().await;

        let Some(delay) = settings.restart else {
            if let Some(reason) = reason {
                info!("Session ended: {}", reason);
            }
            return Ok(());
        };

        match reason {
            Some(reason) => warn!("Session ended ({}), restarting in {:?}", reason, delay),
            None => warn!("Restarting in {:?}", delay),
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            result = utils::shutdown_signal() => {
                result?;
                return Ok(());
            }
        }
    }
}
