//! Format negotiation and conversion between device and wire PCM
//!
//! Shared-mode hosts such as WASAPI only open a device in its mix format,
//! so the stream runs at whatever the device offers and the callbacks
//! convert to and from 16-bit PCM at the configured rate and channel count.

use cpal::{FromSample, Sample, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Sample formats the callbacks can convert
const CONVERTIBLE_FORMATS: [SampleFormat; 4] = [
    SampleFormat::I16,
    SampleFormat::I32,
    SampleFormat::U16,
    SampleFormat::F32,
];

/// Choose the stream format for a device.
///
/// A range accepting the wire format as-is wins; otherwise the device's
/// default config is used with conversion. Fails only when neither exists.
pub(crate) fn negotiate_format(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    default: Option<SupportedStreamConfig>,
    config: &AudioConfig,
) -> Result<SupportedStreamConfig, AudioError> {
    let rate = cpal::SampleRate(config.sample_rate);
    let mut fallback = default.filter(|d| CONVERTIBLE_FORMATS.contains(&d.sample_format()));

    for range in ranges {
        if !CONVERTIBLE_FORMATS.contains(&range.sample_format()) {
            continue;
        }
        let native = range.sample_format() == SampleFormat::I16
            && range.channels() == config.channels
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate();
        if native {
            return Ok(range.with_sample_rate(rate));
        }
        if fallback.is_none() {
            let max = range.max_sample_rate();
            fallback = Some(range.with_sample_rate(max));
        }
    }

    fallback.ok_or_else(|| AudioError::DeviceUnavailable("no supported stream format".to_string()))
}

/// Rational rate stepper: tracks when the other side's next frame is due
#[derive(Debug, Clone)]
struct RateStep {
    phase: u64,
    from: u64,
    to: u64,
}

impl RateStep {
    fn new(from: u32, to: u32, phase: u64) -> Self {
        Self {
            phase,
            from: from as u64,
            to: to as u64,
        }
    }

    /// Advance by one `from` frame and return how many `to` frames are due
    fn advance(&mut self) -> u64 {
        self.phase += self.to;
        let due = self.phase / self.from;
        self.phase %= self.from;
        due
    }
}

/// Device input frames to wire samples.
///
/// Downmixes to mono by averaging and resamples by averaging the device
/// frames that fall into each wire frame, repeating frames when the device
/// runs slower than the wire.
#[derive(Debug, Clone)]
pub struct CaptureConverter {
    device_channels: usize,
    step: RateStep,
    sums: Vec<i64>,
    count: i64,
    last: Vec<i16>,
}

impl CaptureConverter {
    pub fn new(device_rate: u32, device_channels: u16, wire_rate: u32, wire_channels: u16) -> Self {
        Self {
            device_channels: device_channels.max(1) as usize,
            step: RateStep::new(device_rate, wire_rate, 0),
            sums: vec![0; wire_channels.max(1) as usize],
            count: 0,
            last: vec![0; wire_channels.max(1) as usize],
        }
    }

    /// Convert interleaved device samples, handing each wire sample to `emit`
    pub fn process<T>(&mut self, data: &[T], mut emit: impl FnMut(i16))
    where
        T: Sample,
        i16: FromSample<T>,
    {
        let wire_channels = self.sums.len();
        for frame in data.chunks_exact(self.device_channels) {
            for (c, sum) in self.sums.iter_mut().enumerate() {
                *sum += if wire_channels == 1 {
                    let total: i64 = frame.iter().map(|&s| i16::from_sample(s) as i64).sum();
                    total / frame.len() as i64
                } else {
                    i16::from_sample(frame[c.min(frame.len() - 1)]) as i64
                };
            }
            self.count += 1;

            for _ in 0..self.step.advance() {
                if self.count > 0 {
                    for (last, sum) in self.last.iter_mut().zip(self.sums.iter_mut()) {
                        *last = (*sum / self.count) as i16;
                        *sum = 0;
                    }
                    self.count = 0;
                }
                for &sample in &self.last {
                    emit(sample);
                }
            }
        }
    }
}

/// Wire samples to device output frames.
///
/// Mono is copied to every device channel; the rate is matched by holding
/// or skipping wire frames.
#[derive(Debug, Clone)]
pub struct PlaybackConverter {
    device_channels: usize,
    step: RateStep,
    current: Vec<i16>,
}

impl PlaybackConverter {
    pub fn new(device_rate: u32, device_channels: u16, wire_rate: u32, wire_channels: u16) -> Self {
        // Start one step short of due so the first device frame pulls audio.
        let phase = device_rate.saturating_sub(wire_rate) as u64;
        Self {
            device_channels: device_channels.max(1) as usize,
            step: RateStep::new(device_rate, wire_rate, phase),
            current: vec![0; wire_channels.max(1) as usize],
        }
    }

    /// Fill `out` with device samples pulled from `next`.
    ///
    /// A wire sample `next` cannot supply plays as silence. Returns whether
    /// that happened.
    pub fn process<T>(&mut self, out: &mut [T], mut next: impl FnMut() -> Option<i16>) -> bool
    where
        T: Sample + FromSample<i16>,
    {
        let mut underrun = false;
        for frame in out.chunks_exact_mut(self.device_channels) {
            for _ in 0..self.step.advance() {
                for sample in self.current.iter_mut() {
                    *sample = next().unwrap_or_else(|| {
                        underrun = true;
                        0
                    });
                }
            }
            let last = self.current.len() - 1;
            for (c, slot) in frame.iter_mut().enumerate() {
                *slot = T::from_sample(self.current[c.min(last)]);
            }
        }
        underrun
    }
}
