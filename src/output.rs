//! Output backends for forwarded events.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use streamwatch_types::MetricEvent;
use tokio::sync::mpsc;

/// Destination for forwarded events.
#[derive(Debug)]
pub enum Output {
    /// Write each event to stdout as one JSON line.
    Stdout,

    /// Append each event to a file as one JSON line.
    File { path: PathBuf, file: Mutex<fs::File> },

    /// Send events through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    /// Events are dropped while the channel is full; once the receiver is
    /// gone the output no longer counts as a listener.
    Channel(mpsc::Sender<MetricEvent>),
}

impl Output {
    pub fn stdout() -> Self {
        Output::Stdout
    }

    /// Open `path` for appending, creating it if needed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use streamwatch::Output;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let output = Output::file(dir.path().join("events.ndjson")).unwrap();
    /// assert!(output.is_open());
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Output::File {
            path,
            file: Mutex::new(file),
        })
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use streamwatch::Output;
    ///
    /// let (output, rx) = Output::channel(16);
    /// assert!(output.is_open());
    /// drop(rx);
    /// assert!(!output.is_open());
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<MetricEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Whether anything is still reading from this output.
    pub fn is_open(&self) -> bool {
        match self {
            Output::Stdout | Output::File { .. } => true,
            Output::Channel(tx) => !tx.is_closed(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Output::File { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Emit one event; `json` is its serialized form.
    pub(crate) fn emit(&self, event: &MetricEvent, json: &str) -> io::Result<()> {
        match self {
            Output::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(json.as_bytes())?;
                out.write_all(b"\n")?;
            }
            Output::File { file, .. } => {
                let mut file = file.lock();
                file.write_all(json.as_bytes())?;
                file.write_all(b"\n")?;
            }
            Output::Channel(tx) => {
                // Best effort send (don't block the monitor if the channel is full)
                let _ = tx.try_send(event.clone());
            }
        }
        Ok(())
    }
}
