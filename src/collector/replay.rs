//! Replay of recorded samples from JSON Lines.
//!
//! Each line is one [`SensorSample`] as JSON. Lines that fail to parse are
//! logged and skipped so a single corrupt record does not end a night's
//! recording.

use crate::collector::types::SensorSample;
use crate::collector::{CollectorError, SampleSource, CHANNEL_CAPACITY};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Where replayed samples are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayInput {
    Stdin,
    File(PathBuf),
}

impl ReplayInput {
    /// Parse a CLI argument, treating `-` as stdin.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            ReplayInput::Stdin
        } else {
            ReplayInput::File(PathBuf::from(arg))
        }
    }
}

/// Collector that replays JSON Lines samples on a background thread.
pub struct ReplayCollector {
    input: ReplayInput,
    /// Pause between delivered samples, `None` to deliver as fast as possible
    interval: Option<Duration>,
    sender: Option<Sender<SensorSample>>,
    receiver: Receiver<SensorSample>,
    running: Arc<AtomicBool>,
    _worker: Option<JoinHandle<()>>,
}

impl ReplayCollector {
    /// Create a new replay collector.
    pub fn new(input: ReplayInput, interval: Option<Duration>) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            input,
            interval,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            _worker: None,
        }
    }

    fn open(&self) -> Result<Box<dyn Read + Send>, CollectorError> {
        match &self.input {
            ReplayInput::Stdin => Ok(Box::new(std::io::stdin())),
            ReplayInput::File(path) => Ok(Box::new(File::open(path)?)),
        }
    }
}

impl SampleSource for ReplayCollector {
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        let reader = BufReader::new(self.open()?);
        let sender = self.sender.take().ok_or(CollectorError::Exhausted)?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let interval = self.interval;

        self._worker = Some(thread::spawn(move || {
            replay_lines(reader, &sender, &running, interval);
            running.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<SensorSample> {
        &self.receiver
    }
}

fn replay_lines<R: BufRead>(
    reader: R,
    sender: &Sender<SensorSample>,
    running: &AtomicBool,
    interval: Option<Duration>,
) {
    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = index + 1, "Stopping replay on read error: {e}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<SensorSample>(trimmed) {
            Ok(sample) => {
                if sender.send(sample).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(line = index + 1, "Skipping malformed sample: {e}"),
        }
        if let Some(pause) = interval {
            thread::sleep(pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_arg() {
        assert_eq!(ReplayInput::from_arg("-"), ReplayInput::Stdin);
        assert_eq!(
            ReplayInput::from_arg("night.jsonl"),
            ReplayInput::File(PathBuf::from("night.jsonl"))
        );
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let input = "{\"heart_rate\":55,\"accel_x\":0.0,\"accel_y\":0.0,\"accel_z\":0.0}\n\
                     not json\n\
                     \n\
                     {\"heart_rate\":56,\"accel_x\":0.0,\"accel_y\":0.0,\"accel_z\":0.01}\n";
        let (sender, receiver) = bounded(16);
        let running = AtomicBool::new(true);

        replay_lines(Cursor::new(input), &sender, &running, None);
        drop(sender);

        let rates: Vec<u32> = receiver.iter().map(|s| s.heart_rate).collect();
        assert_eq!(rates, vec![55, 56]);
    }

    #[test]
    fn test_replay_file_disconnects_when_done() {
        let path = std::env::temp_dir().join(format!("sleep-lock-replay-{}.jsonl", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "{\"heart_rate\":70,\"accel_x\":0.1,\"accel_y\":0.0,\"accel_z\":0.0}\n",
        )
        .unwrap();

        let mut collector = ReplayCollector::new(ReplayInput::File(path.clone()), None);
        collector.start().unwrap();
        let received: Vec<SensorSample> = collector.receiver().iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].heart_rate, 70);

        assert!(matches!(collector.start(), Err(CollectorError::Exhausted)));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut collector = ReplayCollector::new(
            ReplayInput::File(PathBuf::from("/nonexistent/sleep-lock/samples.jsonl")),
            None,
        );
        assert!(matches!(collector.start(), Err(CollectorError::Io(_))));
        assert!(!collector.is_running());
    }
}
