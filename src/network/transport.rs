//! UDP broadcast implementation of the datagram link
//!
//! A receive worker thread owns the bound socket and hands validated
//! datagrams to the controller through a bounded channel. Datagram
//! buffers are allocated once and recycled through a second channel, so
//! the steady state allocates nothing.

use bytes::BytesMut;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::udp::{create_receive_socket, create_send_socket};
use super::{BroadcastTransport, PeerAddress, PeerTable};
use crate::config::LinkConfig;
use crate::constants::LINK_RECV_TIMEOUT_MS;
use crate::error::TransportError;
use crate::protocol::{decode_datagram, encode_datagram, DatagramPayload, WireError, HEADER_LEN};

/// One received datagram in a recycled buffer
struct Inbound {
    source: PeerAddress,
    buf: Box<[u8]>,
    len: usize,
}

/// Link counters, shared with the receive worker
#[derive(Debug, Default)]
pub struct LinkStats {
    pub datagrams_sent: AtomicU64,
    pub sends_busy: AtomicU64,
    pub send_errors: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub own_echoes: AtomicU64,
    pub invalid_datagrams: AtomicU64,
    pub queue_overruns: AtomicU64,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        write!(
            f,
            "sent {} ({} busy, {} errors), received {} ({} overruns, {} invalid, {} echoes)",
            load(&self.datagrams_sent),
            load(&self.sends_busy),
            load(&self.send_errors),
            load(&self.datagrams_received),
            load(&self.queue_overruns),
            load(&self.invalid_datagrams),
            load(&self.own_echoes)
        )
    }
}

/// Active link state, present between `activate` and drop
struct ActiveLink {
    socket: UdpSocket,
    inbound: Receiver<Inbound>,
    recycle: Sender<Box<[u8]>>,
    worker: Option<JoinHandle<()>>,
}

/// Broadcast link over UDP
pub struct UdpBroadcastTransport {
    config: LinkConfig,
    node: PeerAddress,
    peers: PeerTable,
    destination: SocketAddr,
    send_buf: BytesMut,
    running: Arc<AtomicBool>,
    stats: Arc<LinkStats>,
    link: Option<ActiveLink>,
}

impl UdpBroadcastTransport {
    pub fn new(config: LinkConfig) -> Result<Self, TransportError> {
        let ip: Ipv4Addr = config.broadcast_addr.parse().map_err(|_| {
            TransportError::RadioInit(format!(
                "invalid broadcast address '{}'",
                config.broadcast_addr
            ))
        })?;
        let destination = SocketAddr::V4(SocketAddrV4::new(ip, config.port));
        let node = config.node_id.unwrap_or_else(PeerAddress::random);

        Ok(Self {
            peers: PeerTable::new(config.max_peers),
            send_buf: BytesMut::with_capacity(HEADER_LEN + config.max_payload),
            node,
            destination,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(LinkStats::default()),
            link: None,
        })
    }

    /// This node's address on the link
    pub fn node(&self) -> PeerAddress {
        self.node
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn is_active(&self) -> bool {
        self.link.is_some()
    }

    /// Stop the receive worker and release both sockets
    pub fn deactivate(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut link) = self.link.take() {
            if let Some(handle) = link.worker.take() {
                let _ = handle.join();
            }
            tracing::debug!("Link {} down", self.node);
        }
    }
}

impl BroadcastTransport for UdpBroadcastTransport {
    fn activate(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Ok(());
        }

        // No connect(): broadcast traffic needs no association with a peer.
        let recv_socket = create_receive_socket(
            self.config.port,
            Duration::from_millis(LINK_RECV_TIMEOUT_MS),
        )
        .map_err(|e| TransportError::RadioInit(format!("bind port {}: {}", self.config.port, e)))?;
        let socket = create_send_socket()
            .map_err(|e| TransportError::RadioInit(format!("send socket: {}", e)))?;

        let depth = self.config.rx_queue_depth;
        let (inbound_tx, inbound_rx) = bounded::<Inbound>(depth);
        let (recycle_tx, recycle_rx) = bounded::<Box<[u8]>>(depth);
        for _ in 0..depth {
            let _ = recycle_tx.try_send(vec![0u8; self.config.max_payload].into_boxed_slice());
        }

        self.running.store(true, Ordering::SeqCst);
        let worker = ReceiveWorker {
            socket: recv_socket,
            node: self.node,
            max_payload: self.config.max_payload,
            inbound: inbound_tx,
            free: recycle_rx,
            running: self.running.clone(),
            stats: self.stats.clone(),
        };
        let handle = thread::Builder::new()
            .name("link-rx".to_string())
            .spawn(move || worker.run())
            .map_err(|e| TransportError::RadioInit(e.to_string()))?;

        self.link = Some(ActiveLink {
            socket,
            inbound: inbound_rx,
            recycle: recycle_tx,
            worker: Some(handle),
        });

        tracing::info!(
            "Link up: node {} broadcasting to {} (payload ceiling {} bytes)",
            self.node,
            self.destination,
            self.config.max_payload
        );
        Ok(())
    }

    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), TransportError> {
        self.peers.register(peer)?;
        tracing::debug!("Registered peer {}", peer);
        Ok(())
    }

    fn max_payload(&self) -> usize {
        self.config.max_payload
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> bool {
        let Some(link) = &self.link else {
            return false;
        };
        // Only the broadcast address has a mapping on this link.
        if !peer.is_broadcast()
            || !self.peers.contains(peer)
            || payload.len() > self.config.max_payload
        {
            return false;
        }

        encode_datagram(&mut self.send_buf, self.node, payload);
        match link.socket.send_to(&self.send_buf, self.destination) {
            Ok(_) => {
                self.stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.stats.sends_busy.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Send failed: {}", e);
                false
            }
        }
    }

    fn has_pending(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.inbound.is_empty())
    }

    fn poll_received(&mut self, into: &mut DatagramPayload) -> Option<PeerAddress> {
        let link = self.link.as_ref()?;
        let inbound = link.inbound.try_recv().ok()?;
        into.copy_from(&inbound.buf[..inbound.len]);
        let _ = link.recycle.try_send(inbound.buf);
        Some(inbound.source)
    }

    fn log_stats(&self) {
        tracing::info!("Link stats [{}]: {}", self.node, self.stats);
    }
}

impl Drop for UdpBroadcastTransport {
    fn drop(&mut self) {
        self.deactivate();
    }
}

struct ReceiveWorker {
    socket: UdpSocket,
    node: PeerAddress,
    max_payload: usize,
    inbound: Sender<Inbound>,
    free: Receiver<Box<[u8]>>,
    running: Arc<AtomicBool>,
    stats: Arc<LinkStats>,
}

impl ReceiveWorker {
    fn run(self) {
        // One spare byte so an oversize payload is detected, not truncated.
        let mut datagram = vec![0u8; HEADER_LEN + self.max_payload + 1];

        while self.running.load(Ordering::Relaxed) {
            let n = match self.socket.recv_from(&mut datagram) {
                Ok((n, _)) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => {
                    tracing::warn!("Link receive error: {}", e);
                    thread::sleep(Duration::from_millis(LINK_RECV_TIMEOUT_MS));
                    continue;
                }
            };
            self.accept(&datagram[..n]);
        }
    }

    fn accept(&self, datagram: &[u8]) {
        let (source, payload) = match decode_datagram(datagram, self.max_payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.invalid_datagrams.fetch_add(1, Ordering::Relaxed);
                if !matches!(e, WireError::BadMagic) {
                    tracing::debug!("Dropped datagram: {:?}", e);
                }
                return;
            }
        };

        if source == self.node {
            self.stats.own_echoes.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut buf = match self.free.try_recv() {
            Ok(buf) => buf,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.stats.queue_overruns.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        buf[..payload.len()].copy_from_slice(payload);
        let len = payload.len();

        if self.inbound.try_send(Inbound { source, buf, len }).is_ok() {
            self.stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.queue_overruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn free_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    fn loopback_config(port: u16) -> LinkConfig {
        LinkConfig {
            port,
            broadcast_addr: "127.0.0.1".to_string(),
            node_id: Some(PeerAddress::new([2, 0, 0, 0, 0, 1])),
            ..LinkConfig::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_send_requires_activation_and_registration() {
        let mut link = UdpBroadcastTransport::new(loopback_config(free_port())).unwrap();
        assert!(!link.send(PeerAddress::BROADCAST, &[1, 2]));

        link.activate().unwrap();
        assert!(!link.send(PeerAddress::BROADCAST, &[1, 2]));

        link.register_peer(PeerAddress::BROADCAST).unwrap();
        assert!(link.send(PeerAddress::BROADCAST, &[1, 2]));
    }

    #[test]
    fn test_send_rejects_unicast_and_oversize() {
        let mut link = UdpBroadcastTransport::new(loopback_config(free_port())).unwrap();
        link.activate().unwrap();
        link.register_peer(PeerAddress::BROADCAST).unwrap();
        let other = PeerAddress::new([2, 0, 0, 0, 0, 9]);
        link.register_peer(other).unwrap();

        assert!(!link.send(other, &[0; 10]));
        assert!(!link.send(PeerAddress::BROADCAST, &[0; 251]));
        assert!(link.send(PeerAddress::BROADCAST, &[0; 250]));
    }

    #[test]
    fn test_receives_foreign_datagrams_in_order() {
        let port = free_port();
        let mut link = UdpBroadcastTransport::new(loopback_config(port)).unwrap();
        link.activate().unwrap();

        let peer = PeerAddress::new([2, 0, 0, 0, 0, 2]);
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut wire = BytesMut::new();
        for (len, fill) in [(100usize, 0x11u8), (200, 0x22)] {
            encode_datagram(&mut wire, peer, &vec![fill; len]);
            sender.send_to(&wire, ("127.0.0.1", port)).unwrap();
        }

        let mut payload = DatagramPayload::with_ceiling(link.max_payload());
        let mut received = Vec::new();
        assert!(wait_for(|| {
            while let Some(from) = link.poll_received(&mut payload) {
                received.push((from, payload.len(), payload.as_slice()[0]));
            }
            received.len() == 2
        }));
        assert_eq!(received, vec![(peer, 100, 0x11), (peer, 200, 0x22)]);
        assert!(!link.has_pending());
    }

    #[test]
    fn test_exhausted_slots_drop_and_count_then_recycle() {
        let port = free_port();
        let mut link = UdpBroadcastTransport::new(LinkConfig {
            rx_queue_depth: 1,
            ..loopback_config(port)
        })
        .unwrap();
        link.activate().unwrap();

        let peer = PeerAddress::new([2, 0, 0, 0, 0, 3]);
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut wire = BytesMut::new();
        for fill in [0x31u8, 0x32, 0x33] {
            encode_datagram(&mut wire, peer, &[fill; 16]);
            sender.send_to(&wire, ("127.0.0.1", port)).unwrap();
        }

        let stats = link.stats.clone();
        assert!(wait_for(|| {
            stats.datagrams_received.load(Ordering::Relaxed) == 1
                && stats.queue_overruns.load(Ordering::Relaxed) == 2
        }));

        let mut payload = DatagramPayload::with_ceiling(link.max_payload());
        assert_eq!(link.poll_received(&mut payload), Some(peer));
        assert_eq!(payload.as_slice(), &[0x31; 16]);
        assert!(link.poll_received(&mut payload).is_none());

        encode_datagram(&mut wire, peer, &[0x34; 16]);
        sender.send_to(&wire, ("127.0.0.1", port)).unwrap();
        assert!(wait_for(|| link.has_pending()));
        assert_eq!(link.poll_received(&mut payload), Some(peer));
        assert_eq!(payload.as_slice(), &[0x34; 16]);
        assert_eq!(stats.datagrams_received.load(Ordering::Relaxed), 2);
        assert_eq!(stats.queue_overruns.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_link_stats_summary() {
        let stats = LinkStats::default();
        stats.datagrams_sent.store(5, Ordering::Relaxed);
        stats.queue_overruns.store(2, Ordering::Relaxed);
        assert_eq!(
            stats.to_string(),
            "sent 5 (0 busy, 0 errors), received 0 (2 overruns, 0 invalid, 0 echoes)"
        );
    }

    #[test]
    fn test_filters_own_echo_and_garbage() {
        let port = free_port();
        let mut link = UdpBroadcastTransport::new(loopback_config(port)).unwrap();
        link.activate().unwrap();
        link.register_peer(PeerAddress::BROADCAST).unwrap();

        assert!(link.send(PeerAddress::BROADCAST, &[7; 32]));
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not a frame", ("127.0.0.1", port)).unwrap();

        assert!(wait_for(|| {
            link.stats().own_echoes.load(Ordering::Relaxed) == 1
                && link.stats().invalid_datagrams.load(Ordering::Relaxed) == 1
        }));
        assert!(!link.has_pending());
    }

    #[test]
    fn test_activate_is_idempotent_and_deactivate_stops_worker() {
        let mut link = UdpBroadcastTransport::new(loopback_config(free_port())).unwrap();
        link.activate().unwrap();
        link.activate().unwrap();
        assert!(link.is_active());

        link.deactivate();
        assert!(!link.is_active());
        assert!(!link.has_pending());
    }
}
