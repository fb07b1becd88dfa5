//! Error types for the HLS relay library.

use std::path::PathBuf;

/// Errors that can occur in the HLS relay library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Launch**: [`TranscoderNotFound`](Self::TranscoderNotFound),
///   [`Spawn`](Self::Spawn). The external transcoder could not be started.
/// - **Supervisor**: [`AlreadyRunning`](Self::AlreadyRunning).
/// - **Server**: [`Io`](Self::Io) for listener bind or filesystem
///   failures, [`AlreadyStarted`](Self::AlreadyStarted).
/// - **Config**: [`Config`](Self::Config), an unreadable or malformed TOML file.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transcoder binary could not be resolved on `PATH`.
    #[error("transcoder binary not found: {0} (is ffmpeg installed and on PATH?)")]
    TranscoderNotFound(String),

    /// The binary was found but the OS refused to spawn it.
    #[error("failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// [`Supervisor::start`](crate::Supervisor::start) was called while a
    /// transcoder is still running.
    #[error("transcoder already running (pid {0})")]
    AlreadyRunning(u32),

    /// [`Server::start`](crate::Server::start) was called twice.
    #[error("server already started")]
    AlreadyStarted,

    /// Failed to read or parse a configuration file.
    #[error("invalid config file {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
