//! Session state shared by the inbound and outbound loops

use ipnetwork::Ipv4Network;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Why a loop asked its owner to end the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Coordinator closed the connection
    TransportClosed,
    /// Coordinator connection reported a protocol error
    TransportError,
    /// Reading from the coordinator failed
    TransportReadFailed,
    /// Reading from the TUN device failed
    InterfaceReadFailed,
    /// Interface bring-up or authentication failed
    BootstrapFailed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportClosed => write!(f, "coordinator closed the connection"),
            Self::TransportError => write!(f, "coordinator connection error"),
            Self::TransportReadFailed => write!(f, "coordinator read failed"),
            Self::InterfaceReadFailed => write!(f, "TUN read failed"),
            Self::BootstrapFailed => write!(f, "bootstrap failed"),
        }
    }
}

/// Handle a loop uses to request termination from the owning context.
///
/// Loops never tear the session down themselves; they only signal.
#[derive(Debug, Clone)]
pub struct Terminator {
    tx: mpsc::UnboundedSender<ExitReason>,
}

impl Terminator {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExitReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn request(&self, reason: ExitReason) {
        debug!("Termination requested: {}", reason);
        // The owner may already be gone during shutdown
        let _ = self.tx.send(reason);
    }
}

/// Runtime state of one session
#[derive(Debug, Default)]
pub struct SessionState {
    running: AtomicBool,
    /// Effective local address; written once, then read-only
    local_address: OnceLock<Ipv4Network>,
    /// Outbound loop, spawned by the inbound loop after bring-up
    outbound: Mutex<Option<JoinHandle<()>>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    pub fn local_address(&self) -> Option<Ipv4Network> {
        self.local_address.get().copied()
    }

    /// Freeze the effective address. Returns false if one was already set.
    pub(crate) fn assign_local_address(&self, address: Ipv4Network) -> bool {
        self.local_address.set(address).is_ok()
    }

    /// Store the outbound handle. Returns false if one already exists.
    pub(crate) fn set_outbound(&self, handle: JoinHandle<()>) -> bool {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if outbound.is_some() {
            handle.abort();
            return false;
        }
        *outbound = Some(handle);
        true
    }

    pub(crate) fn has_outbound(&self) -> bool {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub(crate) fn take_outbound(&self) -> Option<JoinHandle<()>> {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
