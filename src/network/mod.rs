//! Network subsystem: the broadcast datagram link
//!
//! [`BroadcastTransport`] is the seam the controller talks to. Sends are
//! best-effort and unacknowledged; receives are non-blocking pops of
//! whatever the link has already buffered, in arrival order.

pub mod peer;
pub mod transport;
pub mod udp;

pub use peer::{PeerAddress, PeerTable};
pub use transport::{LinkStats, UdpBroadcastTransport};
pub use udp::{create_receive_socket, create_send_socket};

use crate::error::TransportError;
use crate::protocol::DatagramPayload;

/// Connectionless, best-effort datagram link
pub trait BroadcastTransport {
    /// Bring the link up. Idempotent.
    fn activate(&mut self) -> Result<(), TransportError>;

    /// Add `peer` to the peer table. Must precede any send to it.
    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), TransportError>;

    /// Payload ceiling per datagram; constant for the transport's lifetime.
    fn max_payload(&self) -> usize;

    /// One unacknowledged transmission attempt.
    ///
    /// Returns false when the datagram was not handed to the link, e.g.
    /// the send queue is busy. Callers drop the frame; nothing is queued.
    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> bool;

    /// Whether a received datagram is waiting.
    fn has_pending(&self) -> bool;

    /// Pop the oldest received datagram into `into`, returning its source.
    fn poll_received(&mut self, into: &mut DatagramPayload) -> Option<PeerAddress>;

    /// Log the link's own drop counters, if it keeps any.
    fn log_stats(&self) {}
}

impl<T: BroadcastTransport + ?Sized> BroadcastTransport for Box<T> {
    fn activate(&mut self) -> Result<(), TransportError> {
        (**self).activate()
    }

    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), TransportError> {
        (**self).register_peer(peer)
    }

    fn max_payload(&self) -> usize {
        (**self).max_payload()
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> bool {
        (**self).send(peer, payload)
    }

    fn has_pending(&self) -> bool {
        (**self).has_pending()
    }

    fn poll_received(&mut self, into: &mut DatagramPayload) -> Option<PeerAddress> {
        (**self).poll_received(into)
    }

    fn log_stats(&self) {
        (**self).log_stats()
    }
}
