//! Result and error types for Covprobe.

use thiserror::Error;

/// Result type for Covprobe operations
pub type CovResult<T> = Result<T, CovError>;

/// Errors that can occur while estimating coverage
///
/// None of these are fatal to a running [`CoverageService`](crate::CoverageService):
/// `get_coverage()` degrades to the previous or sentinel value instead.
#[derive(Debug, Error)]
pub enum CovError {
    /// The live log stream ended or failed
    #[error("Log stream terminated after {restarts} restart(s)")]
    StreamTerminated {
        /// Restarts performed so far
        restarts: u64,
    },

    /// Snapshot retrieval or analysis failed
    #[error("Snapshot unavailable: {message}")]
    SnapshotUnavailable {
        /// Error message
        message: String,
    },

    /// Service constructed without a usable mode
    #[error("Misconfigured coverage service: {message}")]
    Misconfigured {
        /// Error message
        message: String,
    },

    /// A command against the target device failed
    #[error("Device command `{command}` failed: {message}")]
    Device {
        /// Command line that was run
        command: String,
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml_ng::Error),
}

impl CovError {
    /// Create a snapshot-unavailable error
    #[must_use]
    pub fn snapshot_unavailable(message: impl Into<String>) -> Self {
        Self::SnapshotUnavailable {
            message: message.into(),
        }
    }

    /// Create a misconfiguration error
    #[must_use]
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured {
            message: message.into(),
        }
    }

    /// Create a device command error
    #[must_use]
    pub fn device(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            command: command.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_unavailable_error() {
        let err = CovError::snapshot_unavailable("pull failed");
        assert!(err.to_string().contains("Snapshot unavailable"));
        assert!(err.to_string().contains("pull failed"));
    }

    #[test]
    fn test_misconfigured_error() {
        let err = CovError::misconfigured("total must be positive");
        assert!(err.to_string().contains("Misconfigured"));
    }

    #[test]
    fn test_device_error_names_command() {
        let err = CovError::device("adb logcat -c", "exit status 1");
        let msg = err.to_string();
        assert!(msg.contains("adb logcat -c"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_stream_terminated_error() {
        let err = CovError::StreamTerminated { restarts: 3 };
        assert!(err.to_string().contains("3 restart"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CovError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
