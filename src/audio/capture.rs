//! Audio capture from the microphone
//!
//! The cpal input callback converts the device format to wire PCM and
//! pushes it into a [`SampleQueue`](super::SampleQueue); the controller
//! drains it with bounded-wait reads.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::buffer::{create_shared_queue, SharedSampleQueue};
use super::convert::{negotiate_format, CaptureConverter};
use super::device::find_input_device;
use super::{stream_config, CaptureSink, QUEUE_POLL_INTERVAL};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Open input stream feeding a sample queue
pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    queue: SharedSampleQueue,
    read_timeout: Duration,
    error_rx: Receiver<AudioError>,
    reported_overflow: usize,
}

impl CpalCapture {
    /// Acquire the input device and start streaming into the queue
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let device = find_input_device(config.input_device.as_deref())?;
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map(|c| c.collect())
            .unwrap_or_default();
        let format = negotiate_format(ranges, device.default_input_config().ok(), config)?;
        let stream_config = stream_config(&format, config);
        let converter = CaptureConverter::new(
            stream_config.sample_rate.0,
            stream_config.channels,
            config.sample_rate,
            config.channels,
        );
        let queue = create_shared_queue(config.queue_samples());
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let stream = match format.sample_format() {
            SampleFormat::I16 => {
                build_input::<i16>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::I32 => {
                build_input::<i32>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::U16 => {
                build_input::<u16>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::F32 => {
                build_input::<f32>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            other => {
                return Err(AudioError::DeviceUnavailable(format!(
                    "input sample format {:?}",
                    other
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(format!("start input: {}", e)))?;

        tracing::debug!(
            "Capture open: device {} Hz {} ch {:?}, wire {} Hz {} ch, queue {} samples",
            stream_config.sample_rate.0,
            stream_config.channels,
            format.sample_format(),
            config.sample_rate,
            config.channels,
            queue.capacity()
        );

        Ok(Self {
            stream: Some(stream),
            queue,
            read_timeout: config.read_timeout(),
            error_rx,
            reported_overflow: 0,
        })
    }

    fn check_errors(&mut self) {
        while let Ok(err) = self.error_rx.try_recv() {
            tracing::warn!("Capture stream: {}", err);
        }
        let overflow = self.queue.overflow_count();
        if overflow > self.reported_overflow {
            tracing::debug!("Capture overflow: {} samples lost", overflow - self.reported_overflow);
            self.reported_overflow = overflow;
        }
    }
}

impl CaptureSink for CpalCapture {
    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        if self.stream.is_none() {
            return 0;
        }
        self.check_errors();

        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;
        loop {
            filled += self.queue.pop_le_bytes(&mut buf[filled..]);
            // Full frame, or whatever arrived before the timeout.
            if buf.len() - filled < 2 || Instant::now() >= deadline {
                return filled;
            }
            thread::sleep(QUEUE_POLL_INTERVAL);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            self.queue.clear();
            let lost = self.queue.overflow_count();
            if lost > 0 {
                tracing::info!("Capture closed, {} samples lost to overflow", lost);
            } else {
                tracing::debug!("Capture closed");
            }
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_input<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    mut converter: CaptureConverter,
    queue: SharedSampleQueue,
    errors: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converter.process(data, |sample| {
                    queue.push(sample);
                });
            },
            move |err| {
                let _ = errors.try_send(AudioError::StreamFailed(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(format!("input stream: {}", e)))
}
