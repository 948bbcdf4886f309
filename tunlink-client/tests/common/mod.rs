#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tunlink_client::{Envelope, Interface, InterfaceError, Transport, TransportError};
use url::Url;

/// How long mock reads block before reporting "no data"
pub const POLL: Duration = Duration::from_millis(20);

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TransportCounters {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

/// In-memory transport: the test injects envelopes and observes writes
pub struct MockTransport {
    incoming: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    outgoing: mpsc::UnboundedSender<Bytes>,
    counters: Arc<TransportCounters>,
    fail_connect: bool,
}

pub struct TransportHandle {
    pub incoming: mpsc::UnboundedSender<Envelope>,
    pub outgoing: mpsc::UnboundedReceiver<Bytes>,
    pub counters: Arc<TransportCounters>,
}

impl MockTransport {
    pub fn new() -> (Self, TransportHandle) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(TransportCounters::default());
        let transport = Self {
            incoming: Mutex::new(in_rx),
            outgoing: out_tx,
            counters: counters.clone(),
            fail_connect: false,
        };
        let handle = TransportHandle {
            incoming: in_tx,
            outgoing: out_rx,
            counters,
        };
        (transport, handle)
    }

    pub fn failing_connect() -> (Self, TransportHandle) {
        let (mut transport, handle) = Self::new();
        transport.fail_connect = true;
        (transport, handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _endpoint: &Url) -> Result<(), TransportError> {
        if self.fail_connect {
            return Err(TransportError::NotConnected);
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_timeout(&self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read(&self) -> Result<Option<Envelope>, TransportError> {
        let mut incoming = self.incoming.lock().await;
        match tokio::time::timeout(POLL, incoming.recv()).await {
            Ok(Some(envelope)) => Ok(Some(envelope)),
            Ok(None) => Ok(Some(Envelope::Close)),
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, payload: Bytes) -> Result<(), TransportError> {
        self.outgoing
            .send(payload)
            .map_err(|_| TransportError::NotConnected)
    }

    async fn disconnect(&self) {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

impl TransportHandle {
    pub fn send(&self, envelope: Envelope) {
        self.incoming.send(envelope).unwrap();
    }

    /// Next record the client wrote to the coordinator
    pub async fn next_write(&mut self) -> Bytes {
        tokio::time::timeout(WAIT, self.outgoing.recv())
            .await
            .expect("timed out waiting for a transport write")
            .expect("transport closed")
    }

    /// Assert nothing else is written within a short grace period
    pub async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(150)).await;
        if let Ok(payload) = self.outgoing.try_recv() {
            panic!("unexpected transport write: {:02x?}", &payload[..]);
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InterfaceShared {
    pub name: StdMutex<String>,
    pub address: StdMutex<Option<Ipv4Network>>,
    pub mtu: StdMutex<u16>,
    pub up: AtomicBool,
    pub ups: AtomicUsize,
    pub downs: AtomicUsize,
    pub reads: AtomicUsize,
}

/// In-memory TUN device: the test injects packets and observes writes
pub struct MockInterface {
    packets: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    written: mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<InterfaceShared>,
    fail_up: bool,
}

pub struct InterfaceHandle {
    pub packets: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pub written: mpsc::UnboundedReceiver<Vec<u8>>,
    pub shared: Arc<InterfaceShared>,
}

impl MockInterface {
    pub fn new() -> (Self, InterfaceHandle) {
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(InterfaceShared::default());
        let interface = Self {
            packets: Mutex::new(packet_rx),
            written: written_tx,
            shared: shared.clone(),
            fail_up: false,
        };
        let handle = InterfaceHandle {
            packets: Some(packet_tx),
            written: written_rx,
            shared,
        };
        (interface, handle)
    }

    pub fn failing_up() -> (Self, InterfaceHandle) {
        let (mut interface, handle) = Self::new();
        interface.fail_up = true;
        (interface, handle)
    }
}

#[async_trait]
impl Interface for MockInterface {
    fn set_name(&self, name: &str) -> Result<(), InterfaceError> {
        *self.shared.name.lock().unwrap() = name.to_string();
        Ok(())
    }

    fn set_address(&self, address: Ipv4Network) -> Result<(), InterfaceError> {
        *self.shared.address.lock().unwrap() = Some(address);
        Ok(())
    }

    fn set_mtu(&self, mtu: u16) -> Result<(), InterfaceError> {
        *self.shared.mtu.lock().unwrap() = mtu;
        Ok(())
    }

    fn set_timeout(&self, _timeout: Duration) -> Result<(), InterfaceError> {
        Ok(())
    }

    async fn up(&self) -> Result<(), InterfaceError> {
        if self.fail_up {
            return Err(InterfaceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        self.shared.ups.fetch_add(1, Ordering::SeqCst);
        self.shared.up.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn down(&self) {
        self.shared.downs.fetch_add(1, Ordering::SeqCst);
        self.shared.up.store(false, Ordering::SeqCst);
    }

    async fn read(&self, buf: &mut [u8]) -> Result<Option<usize>, InterfaceError> {
        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        let mut packets = self.packets.lock().await;
        match tokio::time::timeout(POLL, packets.recv()).await {
            Ok(Some(packet)) => {
                buf[..packet.len()].copy_from_slice(&packet);
                Ok(Some(packet.len()))
            }
            Ok(None) => Err(InterfaceError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device removed",
            ))),
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, packet: &[u8]) -> Result<(), InterfaceError> {
        if !self.shared.up.load(Ordering::SeqCst) {
            return Err(InterfaceError::NotUp);
        }
        let _ = self.written.send(packet.to_vec());
        Ok(())
    }

    fn address(&self) -> Option<Ipv4Addr> {
        if !self.shared.up.load(Ordering::SeqCst) {
            return None;
        }
        self.shared.address.lock().unwrap().map(|network| network.ip())
    }
}

impl InterfaceHandle {
    pub fn inject(&self, packet: Vec<u8>) {
        self.packets
            .as_ref()
            .expect("packet sender dropped")
            .send(packet)
            .unwrap();
    }

    /// Next packet the client wrote into the TUN device
    pub async fn next_written(&mut self) -> Vec<u8> {
        tokio::time::timeout(WAIT, self.written.recv())
            .await
            .expect("timed out waiting for a TUN write")
            .expect("interface closed")
    }

    pub fn is_up(&self) -> bool {
        self.shared.up.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }

    pub async fn wait_for_reads(&self) {
        tokio::time::timeout(WAIT, async {
            while self.reads() == 0 {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("outbound loop never read from the interface");
    }
}

/// Minimal IPv4/UDP packet from `src` to `dst`
pub fn ipv4_packet(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let total = 28 + payload.len();
    let mut packet = vec![0u8; 28];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    packet[8] = 64;
    packet[9] = 17;
    packet[12..16].copy_from_slice(&src);
    packet[16..20].copy_from_slice(&dst);
    packet.extend_from_slice(payload);
    packet
}
