//! Audio playback to the speaker
//!
//! The controller pushes wire PCM into a [`SampleQueue`](super::SampleQueue);
//! the cpal output callback converts it to the device format and plays
//! silence on underrun.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::buffer::{create_shared_queue, SharedSampleQueue};
use super::convert::{negotiate_format, PlaybackConverter};
use super::device::find_output_device;
use super::{stream_config, PlaybackSink, QUEUE_POLL_INTERVAL};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Open output stream fed from a sample queue
pub struct CpalPlayback {
    stream: Option<cpal::Stream>,
    queue: SharedSampleQueue,
    write_timeout: Duration,
    error_rx: Receiver<AudioError>,
}

impl CpalPlayback {
    /// Acquire the output device and start playing from the queue
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let device = find_output_device(config.output_device.as_deref())?;
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map(|c| c.collect())
            .unwrap_or_default();
        let format = negotiate_format(ranges, device.default_output_config().ok(), config)?;
        let stream_config = stream_config(&format, config);
        let converter = PlaybackConverter::new(
            stream_config.sample_rate.0,
            stream_config.channels,
            config.sample_rate,
            config.channels,
        );
        let queue = create_shared_queue(config.queue_samples());
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let stream = match format.sample_format() {
            SampleFormat::I16 => {
                build_output::<i16>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::I32 => {
                build_output::<i32>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::U16 => {
                build_output::<u16>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            SampleFormat::F32 => {
                build_output::<f32>(&device, &stream_config, converter, queue.clone(), error_tx)
            }
            other => {
                return Err(AudioError::DeviceUnavailable(format!(
                    "output sample format {:?}",
                    other
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(format!("start output: {}", e)))?;

        tracing::debug!(
            "Playback open: device {} Hz {} ch {:?}, wire {} Hz {} ch, queue {} samples",
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
            write_timeout: config.write_timeout(),
            error_rx,
        })
    }
}

impl PlaybackSink for CpalPlayback {
    fn write(&mut self, data: &[u8]) -> usize {
        if self.stream.is_none() {
            return 0;
        }
        while let Ok(err) = self.error_rx.try_recv() {
            tracing::warn!("Playback stream: {}", err);
        }

        let deadline = Instant::now() + self.write_timeout;
        let mut written = 0;
        loop {
            written += self.queue.push_le_bytes(&data[written..]);
            if data.len() - written < 2 || Instant::now() >= deadline {
                return written;
            }
            // Queue full: wait for the device to drain it.
            thread::sleep(QUEUE_POLL_INTERVAL);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            self.queue.clear();
            let underruns = self.queue.underrun_count();
            if underruns > 0 {
                tracing::info!("Playback closed, {} device periods ran short", underruns);
            } else {
                tracing::debug!("Playback closed");
            }
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_output<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    mut converter: PlaybackConverter,
    queue: SharedSampleQueue,
    errors: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if converter.process(data, || queue.pop()) {
                    queue.record_underrun();
                }
            },
            move |err| {
                let _ = errors.try_send(AudioError::StreamFailed(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(format!("output stream: {}", e)))
}
