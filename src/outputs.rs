//! Single-line `key=value` transport for downstream pipeline steps.
//!
//! Values must already be folded onto one line; see
//! [`crate::normalize::escape_line_breaks`].

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while writing transport entries.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OutputError {
    /// The output file could not be opened or written.
    #[error("failed to write outputs to {path}: {message}")]
    Io {
        /// Target file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// A key or value would break the one-entry-per-line format.
    #[error("output entry '{key}' must be a single line with a plain key")]
    InvalidEntry {
        /// Offending key.
        key: String,
    },
}

/// Appends `key=value` lines to a file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputSink {
    path: Utf8PathBuf,
}

impl OutputSink {
    /// Creates a sink that appends to `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the target file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Appends every entry in order, creating the file if needed.
    ///
    /// Entries are validated up front; nothing is written if any is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidEntry`] for keys that are empty or
    /// contain `=`, or for values containing a line break. Returns
    /// [`OutputError::Io`] when the file cannot be written.
    pub fn write(&self, entries: &[(&str, &str)]) -> Result<(), OutputError> {
        let mut buffer = String::new();
        for (key, value) in entries {
            let plain_key = !key.is_empty() && !key.contains(['=', '\n', '\r']);
            if !plain_key || value.contains(['\n', '\r']) {
                return Err(OutputError::InvalidEntry {
                    key: (*key).to_owned(),
                });
            }
            buffer.push_str(key);
            buffer.push('=');
            buffer.push_str(value);
            buffer.push('\n');
        }

        let to_error = |err: std::io::Error| OutputError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        };
        let file_name = self.path.file_name().ok_or_else(|| OutputError::Io {
            path: self.path.clone(),
            message: String::from("path has no file name"),
        })?;
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(to_error)?;
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        let mut file = dir.open_with(file_name, &options).map_err(to_error)?;
        file.write_all(buffer.as_bytes()).map_err(to_error)
    }
}
