//! Virtual network interface
//!
//! The session configures the interface once an address is known, then
//! reads raw IPv4 packets from it and writes forwarded packets into it.

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::InterfaceError;

/// MTU applied at bring-up
pub const DEFAULT_MTU: u16 = 1400;

/// Longest interface name Linux accepts (IFNAMSIZ - 1)
pub const MAX_NAME_LEN: usize = 15;

/// Local virtual interface
#[async_trait]
pub trait Interface: Send + Sync + 'static {
    fn set_name(&self, name: &str) -> Result<(), InterfaceError>;

    fn set_address(&self, address: Ipv4Network) -> Result<(), InterfaceError>;

    fn set_mtu(&self, mtu: u16) -> Result<(), InterfaceError>;

    fn set_timeout(&self, timeout: Duration) -> Result<(), InterfaceError>;

    /// Create and activate the interface with the settings above
    async fn up(&self) -> Result<(), InterfaceError>;

    /// Tear the interface down; safe to call when it was never up
    async fn down(&self);

    /// Read one packet into `buf`, or `None` when the timeout elapsed
    async fn read(&self, buf: &mut [u8]) -> Result<Option<usize>, InterfaceError>;

    async fn write(&self, packet: &[u8]) -> Result<(), InterfaceError>;

    /// Address currently assigned to the interface
    fn address(&self) -> Option<Ipv4Addr>;
}

#[derive(Debug, Clone)]
struct TunSettings {
    name: String,
    address: Option<Ipv4Network>,
    mtu: u16,
    timeout: Duration,
}

/// TUN device backed by tun-rs
pub struct TunInterface {
    settings: Mutex<TunSettings>,
    device: RwLock<Option<Arc<tun_rs::AsyncDevice>>>,
}

impl TunInterface {
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(TunSettings {
                name: crate::config::DEFAULT_INTERFACE_NAME.to_string(),
                address: None,
                mtu: DEFAULT_MTU,
                timeout: crate::transport::DEFAULT_TIMEOUT,
            }),
            device: RwLock::new(None),
        }
    }

    fn settings(&self) -> std::sync::MutexGuard<'_, TunSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn device(&self) -> Option<Arc<tun_rs::AsyncDevice>> {
        self.device
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for TunInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interface for TunInterface {
    fn set_name(&self, name: &str) -> Result<(), InterfaceError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(InterfaceError::InvalidName(name.to_string()));
        }
        self.settings().name = name.to_string();
        Ok(())
    }

    fn set_address(&self, address: Ipv4Network) -> Result<(), InterfaceError> {
        self.settings().address = Some(address);
        Ok(())
    }

    fn set_mtu(&self, mtu: u16) -> Result<(), InterfaceError> {
        self.settings().mtu = mtu;
        Ok(())
    }

    fn set_timeout(&self, timeout: Duration) -> Result<(), InterfaceError> {
        self.settings().timeout = timeout;
        Ok(())
    }

    async fn up(&self) -> Result<(), InterfaceError> {
        if self.device().is_some() {
            return Err(InterfaceError::AlreadyUp);
        }
        let settings = self.settings().clone();
        let address = settings.address.ok_or(InterfaceError::NoAddress)?;

        info!("Creating TUN device: {}", settings.name);
        let device = tun_rs::DeviceBuilder::new()
            .name(settings.name.as_str())
            .ipv4(address.ip(), address.prefix(), None)
            .mtu(settings.mtu)
            .build_async()?;

        *self.device.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(device));
        info!(
            "✅ TUN device {} is up ({}, mtu {})",
            settings.name, address, settings.mtu
        );
        Ok(())
    }

    async fn down(&self) {
        let device = self.device.write().unwrap_or_else(|e| e.into_inner()).take();
        if device.is_some() {
            // Dropping the last handle destroys the device
            drop(device);
            info!("TUN device {} is down", self.settings().name);
        } else {
            debug!("TUN device was not up");
        }
    }

    async fn read(&self, buf: &mut [u8]) -> Result<Option<usize>, InterfaceError> {
        let device = self.device().ok_or(InterfaceError::NotUp)?;
        let timeout = self.settings().timeout;

        match tokio::time::timeout(timeout, device.recv(buf)).await {
            Ok(result) => Ok(Some(result?)),
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, packet: &[u8]) -> Result<(), InterfaceError> {
        let device = self.device().ok_or(InterfaceError::NotUp)?;
        device.send(packet).await?;
        Ok(())
    }

    fn address(&self) -> Option<Ipv4Addr> {
        if self.device().is_none() {
            return None;
        }
        self.settings().address.map(|network| network.ip())
    }
}
