//! Test doubles for driving the controller on a [`ManualClock`]

use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{Clock, ManualClock};
use crate::audio::{AudioBackend, CaptureSink, PlaybackSink};
use crate::config::AudioConfig;
use crate::error::{AudioError, TransportError};
use crate::input::ModeInput;
use crate::network::{BroadcastTransport, PeerAddress, PeerTable};
use crate::protocol::DatagramPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    OpenCapture,
    CloseCapture,
    OpenPlayback,
    ClosePlayback,
}

#[derive(Debug, Default)]
struct DeviceLog {
    events: Vec<DeviceEvent>,
    open: usize,
    violations: usize,
    played: Vec<Vec<u8>>,
}

impl DeviceLog {
    fn opened(&mut self, event: DeviceEvent) {
        if self.open > 0 {
            self.violations += 1;
        }
        self.open += 1;
        self.events.push(event);
    }

    fn closed(&mut self, event: DeviceEvent) {
        self.open -= 1;
        self.events.push(event);
    }
}

/// Backend whose devices advance the shared clock instead of blocking
pub struct MockBackend {
    clock: ManualClock,
    log: Arc<Mutex<DeviceLog>>,
    capture_script: VecDeque<usize>,
    capture_len: usize,
    capture_delay: Duration,
    playback_limit: Option<usize>,
    fail_capture: bool,
    fail_playback: bool,
}

impl MockBackend {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            clock: clock.clone(),
            log: Arc::new(Mutex::new(DeviceLog::default())),
            capture_script: VecDeque::new(),
            capture_len: 0,
            capture_delay: Duration::from_millis(10),
            playback_limit: None,
            fail_capture: false,
            fail_playback: false,
        }
    }

    /// Every read returns `len` bytes after `delay`
    pub fn with_capture(mut self, len: usize, delay: Duration) -> Self {
        self.capture_len = len;
        self.capture_delay = delay;
        self
    }

    /// Reads return `lens` in order, then nothing
    pub fn with_capture_script(mut self, lens: Vec<usize>, delay: Duration) -> Self {
        self.capture_script = lens.into();
        self.capture_len = 0;
        self.capture_delay = delay;
        self
    }

    /// Playback accepts at most `limit` bytes per write
    pub fn with_playback_limit(mut self, limit: usize) -> Self {
        self.playback_limit = Some(limit);
        self
    }

    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    pub fn failing_playback(mut self) -> Self {
        self.fail_playback = true;
        self
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.log.lock().events.clone()
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.log.lock().played.clone()
    }

    /// Devices currently open
    pub fn open_count(&self) -> usize {
        self.log.lock().open
    }

    /// Opens that happened while another device was still open
    pub fn exclusion_violations(&self) -> usize {
        self.log.lock().violations
    }
}

impl AudioBackend for MockBackend {
    type Capture = MockCapture;
    type Playback = MockPlayback;

    fn open_capture(&mut self, _config: &AudioConfig) -> Result<MockCapture, AudioError> {
        if self.fail_capture {
            return Err(AudioError::DeviceUnavailable("mock capture".into()));
        }
        self.log.lock().opened(DeviceEvent::OpenCapture);
        Ok(MockCapture {
            clock: self.clock.clone(),
            log: self.log.clone(),
            script: std::mem::take(&mut self.capture_script),
            len: self.capture_len,
            delay: self.capture_delay,
            next_byte: 0,
            closed: false,
        })
    }

    fn open_playback(&mut self, _config: &AudioConfig) -> Result<MockPlayback, AudioError> {
        if self.fail_playback {
            return Err(AudioError::DeviceUnavailable("mock playback".into()));
        }
        self.log.lock().opened(DeviceEvent::OpenPlayback);
        Ok(MockPlayback {
            log: self.log.clone(),
            limit: self.playback_limit,
            closed: false,
        })
    }
}

pub struct MockCapture {
    clock: ManualClock,
    log: Arc<Mutex<DeviceLog>>,
    script: VecDeque<usize>,
    len: usize,
    delay: Duration,
    next_byte: u8,
    closed: bool,
}

impl CaptureSink for MockCapture {
    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        self.clock.advance(self.delay);
        let want = self.script.pop_front().unwrap_or(self.len);
        let n = want.min(buf.len());
        for byte in &mut buf[..n] {
            *byte = self.next_byte;
            self.next_byte = self.next_byte.wrapping_add(1);
        }
        n
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().closed(DeviceEvent::CloseCapture);
        }
    }
}

pub struct MockPlayback {
    log: Arc<Mutex<DeviceLog>>,
    limit: Option<usize>,
    closed: bool,
}

impl PlaybackSink for MockPlayback {
    fn write(&mut self, data: &[u8]) -> usize {
        let n = self.limit.map_or(data.len(), |limit| limit.min(data.len()));
        self.log.lock().played.push(data[..n].to_vec());
        n
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().closed(DeviceEvent::ClosePlayback);
        }
    }
}

/// In-memory link recording every send
pub struct MockTransport {
    pub ceiling: usize,
    pub activated: bool,
    pub fail_activate: bool,
    pub peers: Vec<PeerAddress>,
    table: PeerTable,
    /// When set, every send reports a busy queue
    pub busy: bool,
    pub send_attempts: usize,
    pub sent: Vec<Vec<u8>>,
    /// Times the controller asked for link counters
    pub stats_reports: Cell<usize>,
    inbound: VecDeque<(PeerAddress, Vec<u8>)>,
}

impl MockTransport {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            activated: false,
            fail_activate: false,
            peers: Vec::new(),
            table: PeerTable::new(4),
            busy: false,
            send_attempts: 0,
            sent: Vec::new(),
            stats_reports: Cell::new(0),
            inbound: VecDeque::new(),
        }
    }

    pub fn push_inbound(&mut self, from: PeerAddress, payload: Vec<u8>) {
        self.inbound.push_back((from, payload));
    }
}

impl BroadcastTransport for MockTransport {
    fn activate(&mut self) -> Result<(), TransportError> {
        if self.fail_activate {
            return Err(TransportError::RadioInit("mock radio".into()));
        }
        self.activated = true;
        Ok(())
    }

    fn register_peer(&mut self, peer: PeerAddress) -> Result<(), TransportError> {
        self.table.register(peer)?;
        self.peers.push(peer);
        Ok(())
    }

    fn max_payload(&self) -> usize {
        self.ceiling
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> bool {
        self.send_attempts += 1;
        assert!(self.activated && self.table.contains(peer), "send before link setup");
        assert!(payload.len() <= self.ceiling, "payload above ceiling");
        if self.busy {
            return false;
        }
        self.sent.push(payload.to_vec());
        true
    }

    fn has_pending(&self) -> bool {
        !self.inbound.is_empty()
    }

    fn poll_received(&mut self, into: &mut DatagramPayload) -> Option<PeerAddress> {
        let (from, payload) = self.inbound.pop_front()?;
        into.copy_from(&payload);
        Some(from)
    }

    fn log_stats(&self) {
        self.stats_reports.set(self.stats_reports.get() + 1);
    }
}

/// Button level as a function of time on the shared clock
pub struct TimedInput {
    clock: ManualClock,
    initial: bool,
    edges: Vec<(Duration, bool)>,
    sampled_at: Vec<Duration>,
}

impl TimedInput {
    pub fn new(clock: &ManualClock, initial: bool) -> Self {
        Self {
            clock: clock.clone(),
            initial,
            edges: Vec::new(),
            sampled_at: Vec::new(),
        }
    }

    pub fn held(clock: &ManualClock) -> Self {
        Self::new(clock, true)
    }

    pub fn released(clock: &ManualClock) -> Self {
        Self::new(clock, false)
    }

    /// From `at` onwards the level is `level` (edges in time order)
    pub fn with_edge(mut self, at: Duration, level: bool) -> Self {
        self.edges.push((at, level));
        self
    }

    /// Clock readings at which the controller sampled the button
    pub fn sample_times(&self) -> &[Duration] {
        &self.sampled_at
    }
}

impl ModeInput for TimedInput {
    fn is_asserted(&mut self) -> bool {
        let now = self.clock.now();
        self.sampled_at.push(now);
        self.edges
            .iter()
            .take_while(|(at, _)| *at <= now)
            .last()
            .map_or(self.initial, |(_, level)| *level)
    }
}
