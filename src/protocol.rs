//! Datagram layout on the broadcast link
//!
//! ```text
//! ┌──────┬─────────┬──────────────────┬──────────────────────────────┐
//! │ "PT" │ version │ source node (6B) │ raw PCM (≤ link ceiling)     │
//! └──────┴─────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! The header plays the role of the radio's link-layer source address;
//! the payload is the capture frame exactly as read, no codec.

use bytes::{BufMut, BytesMut};

use crate::network::PeerAddress;

pub const MAGIC: [u8; 2] = *b"PT";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = MAGIC.len() + 1 + PeerAddress::LEN;

/// Reasons an inbound datagram is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    Truncated,
    BadMagic,
    UnsupportedVersion(u8),
    Oversize(usize),
}

/// Write header and payload into `out`, replacing its contents.
///
/// `out` should be created with [`HEADER_LEN`] + ceiling capacity so this
/// never reallocates.
pub fn encode_datagram(out: &mut BytesMut, source: PeerAddress, payload: &[u8]) {
    out.clear();
    out.put_slice(&MAGIC);
    out.put_u8(VERSION);
    out.put_slice(source.as_bytes());
    out.put_slice(payload);
}

/// Split a received datagram into its source and payload.
pub fn decode_datagram(
    datagram: &[u8],
    max_payload: usize,
) -> Result<(PeerAddress, &[u8]), WireError> {
    if datagram.len() < HEADER_LEN {
        return Err(WireError::Truncated);
    }
    if datagram[..2] != MAGIC {
        return Err(WireError::BadMagic);
    }
    if datagram[2] != VERSION {
        return Err(WireError::UnsupportedVersion(datagram[2]));
    }
    let source = PeerAddress::from_slice(&datagram[3..HEADER_LEN]).ok_or(WireError::Truncated)?;
    let payload = &datagram[HEADER_LEN..];
    if payload.len() > max_payload {
        return Err(WireError::Oversize(payload.len()));
    }
    Ok((source, payload))
}

/// Reusable buffer for one link payload.
///
/// Its length never exceeds the ceiling it was created with.
pub struct DatagramPayload {
    data: Box<[u8]>,
    len: usize,
}

impl DatagramPayload {
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            data: vec![0u8; ceiling].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Replace the contents with the prefix of `src` that fits.
    ///
    /// Returns the number of bytes kept; the rest of `src` is dropped.
    pub fn copy_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let src = PeerAddress::new([2, 1, 2, 3, 4, 5]);
        let mut out = BytesMut::with_capacity(HEADER_LEN + 4);
        encode_datagram(&mut out, src, &[9, 8, 7]);

        assert_eq!(&out[..], &[b'P', b'T', 1, 2, 1, 2, 3, 4, 5, 9, 8, 7]);
    }

    #[test]
    fn test_decode_recovers_source_and_payload() {
        let src = PeerAddress::new([2, 1, 2, 3, 4, 5]);
        let mut out = BytesMut::with_capacity(HEADER_LEN + 250);
        encode_datagram(&mut out, src, &[0x55; 100]);

        let (from, payload) = decode_datagram(&out, 250).unwrap();
        assert_eq!(from, src);
        assert_eq!(payload.len(), 100);
    }

    #[test]
    fn test_decode_rejects_bad_datagrams() {
        assert_eq!(decode_datagram(b"PT", 250), Err(WireError::Truncated));
        assert_eq!(
            decode_datagram(b"XX\x01\x02\x00\x00\x00\x00\x01", 250),
            Err(WireError::BadMagic)
        );
        assert_eq!(
            decode_datagram(b"PT\x07\x02\x00\x00\x00\x00\x01", 250),
            Err(WireError::UnsupportedVersion(7))
        );

        let mut out = BytesMut::new();
        encode_datagram(&mut out, PeerAddress::new([2, 0, 0, 0, 0, 1]), &[0; 251]);
        assert_eq!(decode_datagram(&out, 250), Err(WireError::Oversize(251)));
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let mut out = BytesMut::new();
        encode_datagram(&mut out, PeerAddress::new([2, 0, 0, 0, 0, 1]), &[]);
        let (_, payload) = decode_datagram(&out, 250).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_payload_copy_truncates_to_ceiling() {
        let mut payload = DatagramPayload::with_ceiling(4);
        assert_eq!(payload.copy_from(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(payload.as_slice(), &[1, 2, 3, 4]);

        assert_eq!(payload.copy_from(&[7]), 1);
        assert_eq!(payload.as_slice(), &[7]);
    }
}
