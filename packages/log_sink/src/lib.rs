//! File-backed [`LogSink`] writing the `philosophers.log` line format.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use dining_arbiter::{
    WorkerId,
    sink::{LogSink, SinkError, format_event_line},
};

/// Default location of the event log, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "philosophers.log";

/// Appends event lines to a file, flushing after every line so a crashed or
/// interrupted run still leaves a complete log behind.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Creates (or truncates) the file at `path`.
    ///
    /// # Errors
    ///
    /// * If the file cannot be created
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        log::debug!("create: writing event log to {}", path.display());
        Ok(Self::from_file(path, file))
    }

    /// Opens the file at `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// * If the file cannot be opened
    pub fn append(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::debug!("append: appending event log to {}", path.display());
        Ok(Self::from_file(path, file))
    }

    fn from_file(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, line: &str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn emit(&self, worker: WorkerId, elapsed: Duration, message: &str) -> Result<(), SinkError> {
        self.write(&format_event_line(worker, elapsed, message))
    }

    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        self.write(line)
    }
}
