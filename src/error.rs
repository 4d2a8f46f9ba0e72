//! Error types shared by the hosts management core.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostsError>;

/// Failures surfaced by parser, store, commit and history operations.
#[derive(Debug, Error)]
pub enum HostsError {
    /// Filesystem failure (permission, missing path, disk full)
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line or section
    #[error("line {line}: {message}: {text:?}")]
    Parse {
        line: usize,
        text: String,
        message: String,
    },

    /// Remove, rollback or delete target absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed domain name or out-of-range value
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The final rename of an atomic write failed
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    AtomicRename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Commit attempted without write access to the destination
    #[error("insufficient privileges to write {}", path.display())]
    Privilege { path: PathBuf },

    /// Serializer failure for config or history manifest
    #[error("failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },

    /// The filesystem watcher could not be started
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl HostsError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn parse(line: usize, text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            text: text.into(),
            message: message.into(),
        }
    }

    /// True for `NotFound`, including I/O errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert a byte offset into a 1-based line number and the text of that line.
pub(crate) fn line_at(text: &str, offset: usize) -> (usize, String) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let line = text[..offset].matches('\n').count() + 1;
    let content = text.lines().nth(line - 1).unwrap_or_default().to_string();
    (line, content)
}
