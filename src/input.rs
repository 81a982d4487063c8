//! Push-to-talk line
//!
//! The controller only ever samples the line; it never drives it.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::InputConfig;

/// A boolean-level input sampled by the controller
pub trait ModeInput {
    /// True while the transmit button is held
    fn is_asserted(&mut self) -> bool;
}

impl<I: ModeInput + ?Sized> ModeInput for Box<I> {
    fn is_asserted(&mut self) -> bool {
        (**self).is_asserted()
    }
}

/// Level shared between threads; clones observe the same line
#[derive(Debug, Clone, Default)]
pub struct SharedLevel(Arc<AtomicBool>);

impl SharedLevel {
    pub fn new(asserted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(asserted)))
    }

    pub fn set(&self, asserted: bool) {
        self.0.store(asserted, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Invert the level, returning the new value
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

impl ModeInput for SharedLevel {
    fn is_asserted(&mut self) -> bool {
        self.get()
    }
}

/// Latch the line from stdin: every line read toggles transmit.
pub fn spawn_stdin_toggle() -> std::io::Result<SharedLevel> {
    let level = SharedLevel::new(false);
    let writer = level.clone();

    thread::Builder::new()
        .name("ptt-stdin".to_string())
        .spawn(move || {
            toggle_on_lines(std::io::stdin().lock(), &writer);
            let state = if writer.get() { "on" } else { "off" };
            tracing::debug!("stdin closed, push-to-talk stays {}", state);
        })?;

    Ok(level)
}

/// Toggle `level` once per line until end of input or a read error.
///
/// Returns the number of toggles.
fn toggle_on_lines(reader: impl BufRead, level: &SharedLevel) -> usize {
    let mut toggles = 0;
    for line in reader.lines() {
        if let Err(e) = line {
            tracing::warn!("Cannot read push-to-talk input: {}", e);
            break;
        }
        let on = level.toggle();
        toggles += 1;
        tracing::info!("Push-to-talk {}", if on { "latched" } else { "released" });
    }
    toggles
}

/// Line read from a file holding '0' or '1', e.g. a sysfs GPIO value
#[derive(Debug)]
pub struct LevelFile {
    path: PathBuf,
    active_low: bool,
    failed: bool,
}

impl LevelFile {
    pub fn new(path: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            path: path.into(),
            active_low,
            failed: false,
        }
    }

    fn read_level(&self) -> std::io::Result<bool> {
        let text = std::fs::read_to_string(&self.path)?;
        match text.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unexpected level '{}'", other),
            )),
        }
    }
}

impl ModeInput for LevelFile {
    fn is_asserted(&mut self) -> bool {
        match self.read_level() {
            Ok(level) => {
                self.failed = false;
                level != self.active_low
            }
            Err(e) => {
                if !self.failed {
                    tracing::warn!("Cannot read input {}: {}", self.path.display(), e);
                    self.failed = true;
                }
                false
            }
        }
    }
}

/// Build the configured input
pub fn from_config(config: &InputConfig) -> std::io::Result<Box<dyn ModeInput + Send>> {
    Ok(match config {
        InputConfig::Stdin => {
            tracing::info!("Press Enter to toggle transmit");
            Box::new(spawn_stdin_toggle()?)
        }
        InputConfig::File { path, active_low } => {
            tracing::info!("Sampling push-to-talk from {}", path.display());
            Box::new(LevelFile::new(path.clone(), *active_low))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ptt-relay-{}-{}", std::process::id(), name))
    }

    struct BrokenPipe;

    impl std::io::Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_lines_toggle_until_read_error() {
        use std::io::Read;

        let level = SharedLevel::new(false);
        let reader = std::io::BufReader::new((&b"\n"[..]).chain(BrokenPipe));
        assert_eq!(toggle_on_lines(reader, &level), 1);
        assert!(level.get());

        assert_eq!(toggle_on_lines(&b"x\ny\nz\n"[..], &level), 3);
        assert!(!level.get());
    }

    #[test]
    fn test_shared_level_toggle() {
        let level = SharedLevel::new(false);
        let mut reader = level.clone();
        assert!(!reader.is_asserted());

        assert!(level.toggle());
        assert!(reader.is_asserted());
        assert!(!level.toggle());
        assert!(!reader.is_asserted());
    }

    #[test]
    fn test_level_file_polarity() {
        let path = temp_path("polarity");
        std::fs::write(&path, "1\n").unwrap();

        let mut high = LevelFile::new(&path, false);
        let mut low = LevelFile::new(&path, true);
        assert!(high.is_asserted());
        assert!(!low.is_asserted());

        std::fs::write(&path, "0\n").unwrap();
        assert!(!high.is_asserted());
        assert!(low.is_asserted());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unreadable_file_is_not_asserted() {
        let mut missing = LevelFile::new(temp_path("missing"), true);
        assert!(!missing.is_asserted());
        assert!(!missing.is_asserted());

        let path = temp_path("garbage");
        std::fs::write(&path, "x").unwrap();
        assert!(!LevelFile::new(&path, false).is_asserted());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_boxed_input() {
        let level = SharedLevel::new(true);
        let mut boxed: Box<dyn ModeInput + Send> = Box::new(level.clone());
        assert!(boxed.is_asserted());
        level.set(false);
        assert!(!boxed.is_asserted());
    }
}
