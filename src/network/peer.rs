//! Node addressing on the broadcast link

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PeerRegistrationReason, TransportError};

/// Six-byte node identifier on the link
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    /// Address meaning "every listening node"
    pub const BROADCAST: PeerAddress = PeerAddress([0xff; 6]);

    pub const LEN: usize = 6;

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Random locally administered unicast address
    pub fn random() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&uuid.as_bytes()[..6]);
        bytes[0] = (bytes[0] | 0x02) & !0x01;
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({})", self)
    }
}

impl FromStr for PeerAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("expected six octets in '{}'", s))?;
            if part.len() != 2 {
                return Err(format!("invalid octet '{}' in '{}'", part, s));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| format!("invalid octet '{}' in '{}'", part, s))?;
        }
        if parts.next().is_some() {
            return Err(format!("expected six octets in '{}'", s));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_string()
    }
}

/// Fixed-capacity table of registered peers
#[derive(Debug)]
pub struct PeerTable {
    peers: Vec<PeerAddress>,
    capacity: usize,
}

impl PeerTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn register(&mut self, peer: PeerAddress) -> Result<(), TransportError> {
        if self.contains(peer) {
            return Err(TransportError::PeerRegistration {
                peer,
                reason: PeerRegistrationReason::Duplicate,
            });
        }
        if self.peers.len() >= self.capacity {
            return Err(TransportError::PeerRegistration {
                peer,
                reason: PeerRegistrationReason::TableFull,
            });
        }
        self.peers.push(peer);
        Ok(())
    }

    pub fn contains(&self, peer: PeerAddress) -> bool {
        self.peers.contains(&peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
