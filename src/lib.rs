//! # PTT Relay
//!
//! Half-duplex push-to-talk voice relay between nodes sharing a broadcast
//! datagram link.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                                NODE                                  │
//! │                                                                      │
//! │   ┌────────────┐        ┌───────────────────────────┐                │
//! │   │   Button   │──────▶ │  PushToTalkController     │                │
//! │   │ (ModeInput)│ sample │  (ptt::controller)        │                │
//! │   └────────────┘        │                           │                │
//! │                         │  Transmitting │ Receiving │                │
//! │   ┌────────────┐  PCM   │  ─────────────┼────────── │   PCM  ┌─────┐ │
//! │   │ Microphone │──────▶ │  CaptureSink  │ Playback  │ ─────▶ │ Spk │ │
//! │   │ (cpal in)  │ queue  │  read_into    │ Sink      │ queue  │     │ │
//! │   └────────────┘        │       │       │ write ▲   │        └─────┘ │
//! │                         └───────┼───────┴───────┼───┘                │
//! │                                 ▼               │                    │
//! │   ┌──────────────────────────────────────────────────────────────┐   │
//! │   │        UdpBroadcastTransport (network::transport)            │   │
//! │   │   [ "PT" | ver | src node id | PCM ≤ MAX_DATAGRAM_SIZE ]     │   │
//! │   └──────────────────────────────────────────────────────────────┘   │
//! └───────────────────────────────────┼──────────────────────────────────┘
//!                                     │ broadcast
//!                                     ▼
//!                               other nodes
//! ```
//!
//! Only one audio direction is open at any time: entering a mode closes
//! the other direction's device before opening its own.

pub mod audio;
pub mod config;
pub mod error;
pub mod input;
pub mod network;
pub mod protocol;
pub mod ptt;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Bit depth of every PCM sample moved by the relay
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Default internal buffering depth per audio direction, in bytes
    pub const DEFAULT_BUFFER_BYTES: usize = 48_000;

    /// Default payload ceiling of the broadcast link (ESP-NOW data limit)
    pub const MAX_DATAGRAM_SIZE: usize = 250;

    /// Largest UDP payload that fits an Ethernet MTU without fragmentation
    pub const MAX_PACKET_SIZE: usize = 1472;

    /// Default UDP port for the broadcast link
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Default peer table capacity
    pub const DEFAULT_MAX_PEERS: usize = 20;

    /// Default number of inbound datagrams buffered by the link
    pub const DEFAULT_RX_QUEUE_DEPTH: usize = 16;

    /// Default minimum time a mode is held before the button is re-sampled
    pub const DEFAULT_MIN_DWELL_MS: u64 = 1000;

    /// Receive timeout of the link worker, in milliseconds
    pub const LINK_RECV_TIMEOUT_MS: u64 = 50;
}
