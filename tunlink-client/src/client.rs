//! Client - lifecycle of one VPN session
//!
//! Architecture:
//! ```text
//! ┌───────────┐   read    ┌──────────────┐   write   ┌────────────┐
//! │Coordinator│──────────▶│ Inbound loop │──────────▶│ TUN device │
//! │ (WebSocket│           └──────┬───────┘           │            │
//! │ transport)│                  │ spawns after      │            │
//! │           │   write   ┌──────▼───────┐   read    │            │
//! │           │◀──────────│ Outbound loop│◀──────────│            │
//! └───────────┘           └──────────────┘           └────────────┘
//! ```
//!
//! `start()` connects and spawns the inbound loop only; the inbound loop
//! spawns the outbound loop once the local address is known. Loops that
//! hit a fatal condition signal through a [`Terminator`]; the owner then
//! calls `shutdown()`, which joins both loops and releases the resources.

use ipnetwork::Ipv4Network;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::inbound::InboundLoop;
use crate::session::{ExitReason, SessionState, Terminator};
use crate::transport::{Transport, DEFAULT_TIMEOUT};
use crate::tun::Interface;

/// How a session driven by [`Client::run_until`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A loop requested termination
    Exited(Option<ExitReason>),
    /// The stop signal fired first
    Stopped,
}

pub struct Client<T: Transport, I: Interface> {
    config: Arc<ClientConfig>,
    state: Arc<SessionState>,
    transport: Arc<T>,
    interface: Arc<I>,
    terminator: Terminator,
    exit_rx: mpsc::UnboundedReceiver<ExitReason>,
    inbound: Option<JoinHandle<()>>,
}

impl<T: Transport, I: Interface> Client<T, I> {
    pub fn new(config: ClientConfig, transport: T, interface: I) -> Self {
        let (terminator, exit_rx) = Terminator::channel();
        Self {
            config: Arc::new(config),
            state: Arc::new(SessionState::new()),
            transport: Arc::new(transport),
            interface: Arc::new(interface),
            terminator,
            exit_rx,
            inbound: None,
        }
    }

    /// Connect to the coordinator and start the inbound loop.
    ///
    /// Every call begins from fresh runtime state, so a client can be
    /// started again after `shutdown()`.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if self.state.is_running() {
            return Err(ClientError::AlreadyRunning);
        }
        self.reset();
        self.state.set_running(true);

        if let Err(e) = self.connect().await {
            self.state.set_running(false);
            return Err(e);
        }

        let inbound = InboundLoop::new(
            self.config.clone(),
            self.state.clone(),
            self.transport.clone(),
            self.interface.clone(),
            self.terminator.clone(),
        );
        self.inbound = Some(tokio::spawn(inbound.run()));
        Ok(())
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let endpoint = self.config.endpoint().ok_or(ClientError::MissingEndpoint)?;

        if let Some(address) = self.config.local_address() {
            self.state.assign_local_address(address);
        }

        self.transport.connect(endpoint).await?;
        if let Err(e) = self.transport.set_timeout(DEFAULT_TIMEOUT) {
            self.transport.disconnect().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop both loops, bring the interface down and disconnect.
    ///
    /// Does nothing when the client is not running.
    pub async fn shutdown(&mut self) {
        if !self.state.set_running(false) {
            return;
        }
        info!("Shutting down session...");

        if let Some(inbound) = self.inbound.take() {
            if let Err(e) = inbound.await {
                warn!("Inbound loop ended abnormally: {}", e);
            }
        }
        // Joined after the inbound loop, which is the only one that spawns it
        if let Some(outbound) = self.state.take_outbound() {
            if let Err(e) = outbound.await {
                warn!("Outbound loop ended abnormally: {}", e);
            }
        }

        self.interface.down().await;
        self.transport.disconnect().await;
        self.reset();
        info!("✅ Session stopped");
    }

    /// Discard the runtime state and any unread termination requests
    fn reset(&mut self) {
        let (terminator, exit_rx) = Terminator::channel();
        self.state = Arc::new(SessionState::new());
        self.terminator = terminator;
        self.exit_rx = exit_rx;
    }

    /// Wait until a loop requests termination.
    ///
    /// Returns `None` only if every sender is gone, which cannot happen while
    /// the client is alive.
    pub async fn wait(&mut self) -> Option<ExitReason> {
        let reason = self.exit_rx.recv().await;
        debug!("Session termination: {:?}", reason);
        reason
    }

    /// Wait for the session to end or for `stop` to complete, then shut
    /// down. The client is stopped on every return path, including a
    /// failed `stop` future, whose error is passed through.
    pub async fn run_until<F, E>(&mut self, stop: F) -> Result<SessionEnd, E>
    where
        F: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let (end, result) = tokio::select! {
            reason = self.wait() => (SessionEnd::Exited(reason), Ok(())),
            result = stop => (SessionEnd::Stopped, result),
        };
        if let Err(e) = &result {
            error!("❌ Stop signal failed: {}", e);
        }
        self.shutdown().await;
        result.map(|()| end)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Effective local address; `None` until assigned and after shutdown
    pub fn local_address(&self) -> Option<Ipv4Network> {
        self.state.local_address()
    }

    /// Effective local address as CIDR text, empty until assigned
    pub fn address(&self) -> String {
        self.local_address()
            .map(|address| address.to_string())
            .unwrap_or_default()
    }
}

impl<T: Transport, I: Interface> Drop for Client<T, I> {
    fn drop(&mut self) {
        if self.state.set_running(false) {
            // Loops see the flag within one read timeout and exit on their own
            warn!("Client dropped while running; call shutdown() to release resources");
        }
    }
}
