//! Application configuration
//!
//! Read once at startup from a TOML file; every field has a default so an
//! absent file or section is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::network::PeerAddress;
use crate::protocol::HEADER_LEN;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub link: LinkConfig,
    pub ptt: PttConfig,
    pub input: InputConfig,
}

/// Audio device parameters shared by both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    /// Internal buffering depth per direction, in bytes
    pub buffer_bytes: usize,
    /// Capacity of the capture frame, in bytes
    pub frame_bytes: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Fixed device period in frames; device default if absent
    pub device_period_frames: Option<u32>,
    /// cpal device names; default devices if absent
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            channels: DEFAULT_CHANNELS,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            frame_bytes: MAX_DATAGRAM_SIZE,
            read_timeout_ms: 20,
            write_timeout_ms: 20,
            device_period_frames: None,
            input_device: None,
            output_device: None,
        }
    }
}

impl AudioConfig {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Queue capacity in samples for the configured buffering depth
    pub fn queue_samples(&self) -> usize {
        (self.buffer_bytes / self.bytes_per_sample()).max(1)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Broadcast link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub port: u16,
    pub broadcast_addr: String,
    /// Payload ceiling per datagram (MAX_DATAGRAM_SIZE)
    pub max_payload: usize,
    pub max_peers: usize,
    /// Inbound datagrams buffered before new ones are dropped
    pub rx_queue_depth: usize,
    /// This node's identifier; random if absent
    pub node_id: Option<PeerAddress>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_UDP_PORT,
            broadcast_addr: "255.255.255.255".to_string(),
            max_payload: MAX_DATAGRAM_SIZE,
            max_peers: DEFAULT_MAX_PEERS,
            rx_queue_depth: DEFAULT_RX_QUEUE_DEPTH,
            node_id: None,
        }
    }
}

/// Controller timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PttConfig {
    pub min_dwell_ms: u64,
    /// Sleep while receiving with nothing pending
    pub idle_poll_ms: u64,
    /// Statistics report period; 0 disables reporting
    pub stats_interval_secs: u64,
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            min_dwell_ms: DEFAULT_MIN_DWELL_MS,
            idle_poll_ms: 1,
            stats_interval_secs: 10,
        }
    }
}

impl PttConfig {
    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// Source of the push-to-talk line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputConfig {
    /// Each line on stdin toggles transmit
    #[default]
    Stdin,
    /// A file holding '0' or '1', such as a sysfs GPIO value
    File {
        path: PathBuf,
        #[serde(default)]
        active_low: bool,
    },
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the per-user config file
    /// is used when present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ptt-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let audio = &self.audio;
        let link = &self.link;

        if audio.bits_per_sample != BITS_PER_SAMPLE {
            return invalid(format!(
                "bits_per_sample must be {}, got {}",
                BITS_PER_SAMPLE, audio.bits_per_sample
            ));
        }
        if audio.sample_rate == 0 {
            return invalid("sample_rate must be non-zero".into());
        }
        if audio.channels == 0 {
            return invalid("channels must be non-zero".into());
        }
        if audio.frame_bytes == 0 || audio.frame_bytes % audio.bytes_per_sample() != 0 {
            return invalid(format!(
                "frame_bytes must be a non-zero multiple of {}, got {}",
                audio.bytes_per_sample(),
                audio.frame_bytes
            ));
        }
        if audio.buffer_bytes < audio.frame_bytes {
            return invalid(format!(
                "buffer_bytes ({}) must hold at least one frame ({})",
                audio.buffer_bytes, audio.frame_bytes
            ));
        }

        let max_link_payload = MAX_PACKET_SIZE - HEADER_LEN;
        if link.max_payload == 0 || link.max_payload > max_link_payload {
            return invalid(format!(
                "max_payload must be between 1 and {}, got {}",
                max_link_payload, link.max_payload
            ));
        }
        if link.max_peers == 0 {
            return invalid("max_peers must be non-zero".into());
        }
        if link.rx_queue_depth == 0 {
            return invalid("rx_queue_depth must be non-zero".into());
        }
        if link.broadcast_addr.parse::<std::net::Ipv4Addr>().is_err() {
            return invalid(format!(
                "broadcast_addr '{}' is not an IPv4 address",
                link.broadcast_addr
            ));
        }
        if link.node_id.is_some_and(|id| id.is_broadcast()) {
            return invalid("node_id must not be the broadcast address".into());
        }

        Ok(())
    }
}
