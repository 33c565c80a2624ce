//! Typed error kinds for the dump engine's library boundary.
//!
//! The CLI/demo binary deals in `anyhow::Error` at `cmd::run`; the
//! controller itself needs to distinguish kinds (a
//! permission error should suggest disabling `consistent`, a compatibility
//! error may or may not be fatal), so it matches on `DumpError` internally.

use thiserror::Error;

/// Severity used for user-visible messages (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("compatibility issue: {0}")]
    Compatibility(String),

    #[error("permission error: {0} (hint: try running with consistent=false)")]
    Permission(String),

    #[error("database error: {0}")]
    Transient(String),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),
}

impl DumpError {
    pub fn severity(&self) -> Severity {
        match self {
            DumpError::Compatibility(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, DumpError>;
