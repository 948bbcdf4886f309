//! Outbound loop - TUN to coordinator

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use tunlink_proto::{Message, PacketFilter};

use crate::session::{ExitReason, SessionState, Terminator};
use crate::transport::Transport;
use crate::tun::Interface;

/// Large enough for any IPv4 packet
const READ_BUFFER_SIZE: usize = u16::MAX as usize;

pub struct OutboundLoop<T: Transport, I: Interface> {
    filter: PacketFilter,
    state: Arc<SessionState>,
    transport: Arc<T>,
    interface: Arc<I>,
    terminator: Terminator,
}

impl<T: Transport, I: Interface> OutboundLoop<T, I> {
    /// `local` is the frozen effective address of the session
    pub fn new(
        local: Ipv4Addr,
        state: Arc<SessionState>,
        transport: Arc<T>,
        interface: Arc<I>,
        terminator: Terminator,
    ) -> Self {
        Self {
            filter: PacketFilter::new(local),
            state,
            transport,
            interface,
            terminator,
        }
    }

    pub async fn run(self) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        while self.state.is_running() {
            let n = match self.interface.read(&mut buf).await {
                Ok(Some(n)) => n,
                Ok(None) => continue,
                Err(e) => {
                    error!("TUN read failed: {}", e);
                    self.terminator.request(ExitReason::InterfaceReadFailed);
                    break;
                }
            };

            let packet = &buf[..n];
            if let Err(reason) = self.filter.check(packet) {
                trace!("Dropping TUN packet: {}", reason);
                continue;
            }

            // All traffic currently transits the coordinator
            if let Err(e) = self.transport.write(Message::forward(packet)).await {
                warn!("Coordinator write failed ({} bytes): {}", n, e);
            }
        }
        debug!("Outbound loop exiting");
    }
}
