//! Audio subsystem module
//!
//! The controller sees audio only through [`AudioBackend`], which opens one
//! direction at a time, and the two sink traits. The cpal implementations
//! live in [`capture`] and [`playback`].

pub mod buffer;
pub mod capture;
pub mod convert;
pub mod device;
pub mod playback;

pub use buffer::{PcmFrame, SampleQueue};
pub use capture::CpalCapture;
pub use convert::{CaptureConverter, PlaybackConverter};
pub use device::{list_devices, AudioDeviceInfo};
pub use playback::CpalPlayback;

use std::time::Duration;

use crate::config::AudioConfig;
use crate::error::AudioError;

/// How long a blocked read or write sleeps before re-checking its queue
pub(crate) const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Microphone side of the pipeline
pub trait CaptureSink {
    /// Fill `buf` with little-endian PCM.
    ///
    /// Waits at most a short timeout and returns the number of bytes read,
    /// 0 when nothing arrived. Never fails.
    fn read_into(&mut self, buf: &mut [u8]) -> usize;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Speaker side of the pipeline
pub trait PlaybackSink {
    /// Queue up to `data.len()` bytes for playback.
    ///
    /// Blocks briefly while the device buffer is full and returns the
    /// number of bytes accepted, which may be less than requested.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Opens audio devices, one direction at a time
pub trait AudioBackend {
    type Capture: CaptureSink;
    type Playback: PlaybackSink;

    fn open_capture(&mut self, config: &AudioConfig) -> Result<Self::Capture, AudioError>;
    fn open_playback(&mut self, config: &AudioConfig) -> Result<Self::Playback, AudioError>;
}

/// Backend over the default cpal host
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    type Capture = CpalCapture;
    type Playback = CpalPlayback;

    fn open_capture(&mut self, config: &AudioConfig) -> Result<CpalCapture, AudioError> {
        CpalCapture::open(config)
    }

    fn open_playback(&mut self, config: &AudioConfig) -> Result<CpalPlayback, AudioError> {
        CpalPlayback::open(config)
    }
}

/// cpal stream parameters for a negotiated device format
pub(crate) fn stream_config(
    format: &cpal::SupportedStreamConfig,
    config: &AudioConfig,
) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels(),
        sample_rate: format.sample_rate(),
        buffer_size: match config.device_period_frames {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    }
}
