//! Run log module - Append-only cleanup log
//!
//! Every cleanup run appends plain text lines to a fixed-name file in
//! the working directory. No rotation, no structured format.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Log file name, relative to the working directory.
pub const LOG_FILE_NAME: &str = "cleanup_log.txt";

/// Append-only writer for the cleanup log
pub struct RunLog {
    file: File,
}

impl RunLog {
    /// Open the default log file in the working directory.
    pub fn open_default() -> io::Result<Self> {
        Self::open(Path::new(LOG_FILE_NAME))
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Append one line. Best effort: a failed write is warned about and
    /// never interrupts the run.
    pub fn line(&mut self, message: &str) {
        if let Err(e) = writeln!(self.file, "{message}") {
            log::warn!("Failed to write log line: {e}");
        }
    }
}
