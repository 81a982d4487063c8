//! Push-to-talk state machine
//!
//! ```text
//!                 held                    released
//!        ┌──────── Idle ─────────┐
//!        ▼                       ▼
//!   Transmitting ───────────▶ Receiving
//!        ▲   dwell && released    │
//!        └────────────────────────┘
//!             dwell && held
//! ```
//!
//! Each [`PushToTalkController::step`] does one unit of work for the
//! current mode and, once the minimum dwell has passed, samples the button
//! once. Entering a mode closes the other direction's device before the
//! new one is opened, so at most one audio direction is ever open.
//!
//! Drops are the policy for everything that cannot keep pace: capture
//! bytes beyond the link ceiling, sends the link refuses, and playback
//! bytes the speaker does not accept are discarded, never queued or
//! retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{Clock, DwellTimer, Mode, RelayStats};
use crate::audio::{AudioBackend, CaptureSink, PcmFrame, PlaybackSink};
use crate::config::{AudioConfig, PttConfig};
use crate::error::Result;
use crate::input::ModeInput;
use crate::network::{BroadcastTransport, PeerAddress};
use crate::protocol::DatagramPayload;

/// Audio device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Capture,
    Playback,
}

/// The single open audio device, if any
enum OpenDevice<C, P> {
    Closed,
    Capture(C),
    Playback(P),
}

/// Half-duplex relay between the audio devices and the broadcast link
pub struct PushToTalkController<B: AudioBackend, T, I, C> {
    backend: B,
    transport: T,
    input: I,
    clock: C,
    audio: AudioConfig,
    mode: Mode,
    device: OpenDevice<B::Capture, B::Playback>,
    dwell: DwellTimer,
    link_ready: bool,
    idle_poll: Duration,
    stats_interval: Option<Duration>,
    last_report: Duration,
    frame: PcmFrame,
    payload: DatagramPayload,
    stats: RelayStats,
    reported_oversize: bool,
}

impl<B, T, I, C> PushToTalkController<B, T, I, C>
where
    B: AudioBackend,
    T: BroadcastTransport,
    I: ModeInput,
    C: Clock,
{
    /// Create an idle controller. Buffers are allocated here, once.
    pub fn new(
        backend: B,
        transport: T,
        input: I,
        clock: C,
        audio: AudioConfig,
        ptt: &PttConfig,
    ) -> Self {
        let frame = PcmFrame::new(audio.frame_bytes);
        let payload = DatagramPayload::with_ceiling(transport.max_payload());

        Self {
            backend,
            transport,
            input,
            clock,
            audio,
            mode: Mode::Idle,
            device: OpenDevice::Closed,
            dwell: DwellTimer::new(ptt.min_dwell()),
            link_ready: false,
            idle_poll: ptt.idle_poll(),
            stats_interval: ptt.stats_interval(),
            last_report: Duration::ZERO,
            frame,
            payload,
            stats: RelayStats::default(),
            reported_oversize: false,
        }
    }

    /// Bring the link up and leave Idle according to the button.
    ///
    /// Does nothing once started.
    pub fn start(&mut self) -> Result<Mode> {
        if self.mode != Mode::Idle {
            return Ok(self.mode);
        }

        if !self.link_ready {
            self.transport.activate()?;
            self.transport.register_peer(PeerAddress::BROADCAST)?;
            self.link_ready = true;
        }

        let direction = if self.input.is_asserted() {
            Direction::Capture
        } else {
            Direction::Playback
        };
        self.enter(direction)?;
        self.last_report = self.clock.now();
        Ok(self.mode)
    }

    /// One loop iteration. Returns the mode after the iteration.
    ///
    /// Errors are fatal: a device that cannot be opened leaves no audio
    /// path.
    pub fn step(&mut self) -> Result<Mode> {
        match self.mode {
            Mode::Idle => return self.start(),
            Mode::Transmitting => {
                self.transmit_once();
                if self.dwell_satisfied() && !self.input.is_asserted() {
                    self.enter(Direction::Playback)?;
                }
            }
            Mode::Receiving => {
                self.receive_once();
                if self.dwell_satisfied() && self.input.is_asserted() {
                    self.enter(Direction::Capture)?;
                }
            }
        }
        Ok(self.mode)
    }

    /// Step until `shutdown` is set or a fatal error occurs.
    ///
    /// Both devices are closed on return.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let result = self.run_loop(shutdown);
        self.shutdown();
        result
    }

    fn run_loop(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.start()?;
        while !shutdown.load(Ordering::Relaxed) {
            self.step()?;
            self.maybe_report_stats();
        }
        Ok(())
    }

    /// Close whichever device is open
    pub fn shutdown(&mut self) {
        self.release_device();
        tracing::info!(
            "Relay stopped: {} frames sent, {} datagrams played, {} mode switches",
            self.stats.frames_sent,
            self.stats.datagrams_played,
            self.stats.mode_switches
        );
    }

    fn dwell_satisfied(&self) -> bool {
        self.dwell.is_satisfied(self.clock.now())
    }

    fn enter(&mut self, direction: Direction) -> Result<()> {
        // The device cannot run both directions: tear down before opening.
        self.release_device();

        self.device = match direction {
            Direction::Capture => OpenDevice::Capture(self.backend.open_capture(&self.audio)?),
            Direction::Playback => OpenDevice::Playback(self.backend.open_playback(&self.audio)?),
        };

        let target = match direction {
            Direction::Capture => Mode::Transmitting,
            Direction::Playback => Mode::Receiving,
        };
        if self.mode != Mode::Idle {
            self.stats.mode_switches += 1;
        }
        self.mode = target;
        self.dwell.reset(self.clock.now());

        match target {
            Mode::Transmitting => tracing::info!("Started sending"),
            _ => tracing::info!("Started receiving"),
        }
        Ok(())
    }

    fn release_device(&mut self) {
        match std::mem::replace(&mut self.device, OpenDevice::Closed) {
            OpenDevice::Capture(mut capture) => capture.close(),
            OpenDevice::Playback(mut playback) => playback.close(),
            OpenDevice::Closed => {}
        }
    }

    fn transmit_once(&mut self) {
        let OpenDevice::Capture(capture) = &mut self.device else {
            return;
        };
        let read = capture.read_into(self.frame.buffer_mut());
        self.frame.set_filled(read);
        if self.frame.is_empty() {
            self.stats.empty_reads += 1;
            return;
        }

        let read = self.frame.len();
        let ceiling = self.payload.ceiling();
        let len = read.min(ceiling);
        if read > ceiling {
            self.stats.oversize_frames += 1;
            self.stats.bytes_discarded += (read - ceiling) as u64;
            if !self.reported_oversize {
                tracing::warn!(
                    "Capture frame of {} bytes exceeds link ceiling of {}; excess is dropped",
                    read,
                    ceiling
                );
                self.reported_oversize = true;
            } else {
                tracing::debug!("Dropped {} capture bytes", read - ceiling);
            }
        }

        if self.transport.send(PeerAddress::BROADCAST, &self.frame.as_slice()[..len]) {
            self.stats.frames_sent += 1;
            self.stats.bytes_sent += len as u64;
        } else {
            self.stats.send_dropped += 1;
            tracing::trace!("Send dropped ({} bytes)", len);
        }
    }

    fn receive_once(&mut self) {
        if !self.transport.has_pending() {
            self.clock.sleep(self.idle_poll);
            return;
        }
        let Some(source) = self.transport.poll_received(&mut self.payload) else {
            return;
        };
        let OpenDevice::Playback(playback) = &mut self.device else {
            return;
        };

        let len = self.payload.len();
        let written = playback.write(self.payload.as_slice());
        self.stats.datagrams_played += 1;
        self.stats.bytes_played += written as u64;
        if written < len {
            self.stats.write_truncated += 1;
            tracing::trace!("Playback took {} of {} bytes from {}", written, len, source);
        }
    }

    fn maybe_report_stats(&mut self) {
        let Some(interval) = self.stats_interval else {
            return;
        };
        let now = self.clock.now();
        if now.saturating_sub(self.last_report) < interval {
            return;
        }
        self.last_report = now;

        let s = &self.stats;
        tracing::info!(
            "Stats [{}]: sent {} ({} bytes, {} dropped, {:.1}% drop), oversize {} ({} bytes cut), \
             played {} ({} bytes, {} truncated), switches {}",
            self.mode,
            s.frames_sent,
            s.bytes_sent,
            s.send_dropped,
            s.send_drop_rate() * 100.0,
            s.oversize_frames,
            s.bytes_discarded,
            s.datagrams_played,
            s.bytes_played,
            s.write_truncated,
            s.mode_switches
        );
        self.transport.log_stats();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Direction of the open audio device, if any
    pub fn open_direction(&self) -> Option<Direction> {
        match self.device {
            OpenDevice::Closed => None,
            OpenDevice::Capture(_) => Some(Direction::Capture),
            OpenDevice::Playback(_) => Some(Direction::Playback),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }
}
