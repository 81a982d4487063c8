//! Relay counters
//!
//! Every non-fatal drop the controller makes is counted here.

/// Controller statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Datagrams handed to the link
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Sends the link refused (busy); the frame was discarded
    pub send_dropped: u64,
    /// Capture reads longer than the link ceiling
    pub oversize_frames: u64,
    /// Bytes cut from oversize reads
    pub bytes_discarded: u64,
    /// Capture reads that returned nothing
    pub empty_reads: u64,
    pub datagrams_played: u64,
    pub bytes_played: u64,
    /// Datagrams the speaker did not fully accept
    pub write_truncated: u64,
    pub mode_switches: u64,
}

impl RelayStats {
    /// Fraction of attempted sends that were dropped
    pub fn send_drop_rate(&self) -> f32 {
        let attempts = self.frames_sent + self.send_dropped;
        if attempts == 0 {
            0.0
        } else {
            self.send_dropped as f32 / attempts as f32
        }
    }
}
