//! Inbound loop - coordinator to TUN
//!
//! Reads envelopes from the transport and drives the session bootstrap:
//!
//! ```text
//! AwaitOpen ──(static address)──────────────────────────▶ Forwarding
//!     │                                                      ▲
//!     └──(no address)──▶ AwaitDynamicAddress ──(assigned)────┘
//! ```
//!
//! Bring-up configures the TUN device, sends AUTH and only then spawns the
//! outbound loop. Once forwarding, FORWARD payloads are written to the TUN
//! device as they arrive.

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tunlink_proto::{AuthHeader, DynamicAddressHeader, Message, ProtoError};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::outbound::OutboundLoop;
use crate::session::{ExitReason, SessionState, Terminator};
use crate::transport::{Envelope, Transport, DEFAULT_TIMEOUT};
use crate::tun::{Interface, DEFAULT_MTU};

/// Hint sent when no usable dynamic address hint is configured
pub const ANY_ADDRESS_HINT: &str = "0.0.0.0/0";

/// Bootstrap phase of the inbound loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitOpen,
    AwaitDynamicAddress,
    Forwarding,
    Terminated,
}

pub struct InboundLoop<T: Transport, I: Interface> {
    config: Arc<ClientConfig>,
    state: Arc<SessionState>,
    transport: Arc<T>,
    interface: Arc<I>,
    terminator: Terminator,
    phase: Phase,
}

impl<T: Transport, I: Interface> InboundLoop<T, I> {
    pub fn new(
        config: Arc<ClientConfig>,
        state: Arc<SessionState>,
        transport: Arc<T>,
        interface: Arc<I>,
        terminator: Terminator,
    ) -> Self {
        Self {
            config,
            state,
            transport,
            interface,
            terminator,
            phase: Phase::AwaitOpen,
        }
    }

    pub async fn run(mut self) {
        while self.state.is_running() && self.phase != Phase::Terminated {
            let envelope = match self.transport.read().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(e) => {
                    error!("Coordinator read failed: {}", e);
                    self.terminate(ExitReason::TransportReadFailed);
                    continue;
                }
            };

            match envelope {
                Envelope::Open => {
                    if let Err(e) = self.handle_open().await {
                        error!("Bootstrap failed: {}", e);
                        self.terminate(ExitReason::BootstrapFailed);
                    }
                }
                Envelope::Data(payload) => {
                    if let Err(e) = self.handle_data(payload).await {
                        error!("Bootstrap failed: {}", e);
                        self.terminate(ExitReason::BootstrapFailed);
                    }
                }
                Envelope::Close => {
                    info!("Coordinator connection closed");
                    self.terminate(ExitReason::TransportClosed);
                }
                Envelope::Error => {
                    error!("Coordinator connection error");
                    self.terminate(ExitReason::TransportError);
                }
            }
        }
        debug!("Inbound loop exiting");
    }

    fn terminate(&mut self, reason: ExitReason) {
        self.phase = Phase::Terminated;
        self.terminator.request(reason);
    }

    async fn handle_open(&mut self) -> Result<(), ClientError> {
        if self.phase != Phase::AwaitOpen {
            warn!("Ignoring open event in phase {:?}", self.phase);
            return Ok(());
        }

        if self.state.local_address().is_some() {
            return self.bring_up().await;
        }

        let hint = match self.config.dynamic_address() {
            Some(hint) if Ipv4Network::from_str(hint).is_ok() => hint,
            _ => {
                warn!(
                    "Invalid dynamic address, set dynamic address to {}",
                    ANY_ADDRESS_HINT
                );
                ANY_ADDRESS_HINT
            }
        };

        let request = DynamicAddressHeader::new(hint, self.config.password())?;
        self.transport.write(request.encode()?).await?;
        info!("Requested dynamic address (hint {})", hint);

        self.phase = Phase::AwaitDynamicAddress;
        Ok(())
    }

    async fn handle_data(&mut self, payload: Bytes) -> Result<(), ClientError> {
        match Message::decode_bytes(payload.clone()) {
            Ok(Message::Forward(packet)) => {
                if let Err(e) = self.interface.write(&packet).await {
                    debug!("TUN write failed ({} bytes): {}", packet.len(), e);
                }
                Ok(())
            }
            Ok(Message::DynamicAddress(header)) => self.handle_dynamic_address(header).await,
            Ok(Message::Auth(_)) => {
                warn!("Unexpected auth message from coordinator");
                Ok(())
            }
            Err(e @ ProtoError::InvalidLength { .. }) => {
                warn!("Invalid package: {}", e);
                debug!("Package buffer: {}", hex::encode(&payload));
                Ok(())
            }
            Err(ProtoError::InvalidUtf8) => {
                warn!("Invalid dynamic address ip: cidr is not UTF-8");
                debug!("Package buffer: {}", hex::encode(&payload));
                Ok(())
            }
            Err(e) => {
                warn!("Unknown message: {}", e);
                Ok(())
            }
        }
    }

    async fn handle_dynamic_address(
        &mut self,
        header: DynamicAddressHeader,
    ) -> Result<(), ClientError> {
        let address = match Ipv4Network::from_str(&header.cidr) {
            Ok(address) => address,
            Err(_) => {
                warn!("Invalid dynamic address ip: cidr={}", header.cidr);
                return Ok(());
            }
        };

        if !self.state.assign_local_address(address) {
            warn!(
                "Ignoring dynamic address {}: address already set to {:?}",
                address,
                self.state.local_address()
            );
            return Ok(());
        }
        info!("✅ Coordinator assigned address {}", address);

        self.bring_up().await
    }

    /// Configure the TUN device, authenticate, then start the outbound loop
    async fn bring_up(&mut self) -> Result<(), ClientError> {
        let address = self
            .state
            .local_address()
            .ok_or(ClientError::NoLocalAddress)?;

        self.interface.set_name(&self.config.interface_name())?;
        self.interface.set_address(address)?;
        self.interface.set_mtu(DEFAULT_MTU)?;
        self.interface.set_timeout(DEFAULT_TIMEOUT)?;
        self.interface.up().await?;

        let auth = AuthHeader::new(address.ip(), self.config.password());
        self.transport.write(auth.encode()).await?;
        info!("Sent auth for {}", address.ip());

        if !self.state.has_outbound() {
            let outbound = OutboundLoop::new(
                address.ip(),
                self.state.clone(),
                self.transport.clone(),
                self.interface.clone(),
                self.terminator.clone(),
            );
            self.state.set_outbound(tokio::spawn(outbound.run()));
        }

        self.phase = Phase::Forwarding;
        info!("🚀 Forwarding packets for {}", address);
        Ok(())
    }
}
