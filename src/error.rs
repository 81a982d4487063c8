//! Error types for the push-to-talk relay
//!
//! Only conditions that stop the relay are errors. Busy sends, short
//! writes, oversize frames and empty reads are ordinary return values and
//! are folded into [`crate::ptt::RelayStats`].

use thiserror::Error;

use crate::network::PeerAddress;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Stream failed: {0}")]
    StreamFailed(String),
}

/// Why a peer could not be added to the link's peer table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRegistrationReason {
    Duplicate,
    TableFull,
}

impl std::fmt::Display for PeerRegistrationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => f.write_str("already registered"),
            Self::TableFull => f.write_str("peer table full"),
        }
    }
}

/// Broadcast link errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Radio init failed: {0}")]
    RadioInit(String),

    #[error("Peer registration failed for {peer}: {reason}")]
    PeerRegistration {
        peer: PeerAddress,
        reason: PeerRegistrationReason,
    },
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
