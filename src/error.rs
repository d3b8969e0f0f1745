//! Error types and result utilities for audio output operations.

use thiserror::Error;

/// Convenience type alias for results that may contain AudioOutputError
pub type AudioOutputResult<T> = Result<T, AudioOutputError>;

/// Errors surfaced by the audio output client and its backends.
#[derive(Error, Debug)]
pub enum AudioOutputError {
    /// No default output device exists or the device could not be reached.
    #[error("no default output device available: {0}")]
    DeviceUnavailable(String),

    /// The device rejected the requested stream format.
    #[error("stream format rejected by device: {0}")]
    FormatUnsupported(String),

    /// Any other platform-level failure while creating the client handles.
    #[error("audio client activation failed: {0}")]
    ActivationFailed(String),

    /// The hardware ring cannot satisfy a lease request.
    #[error("buffer unavailable: requested {requested} frames, {available} available")]
    BufferUnavailable {
        /// Frames asked for in the lease.
        requested: u32,
        /// Frames the ring could have satisfied at the time of the call.
        available: u32,
    },

    /// A stream format that violates its own invariants.
    #[error("invalid stream format: {0}")]
    InvalidFormat(String),

    /// An operation issued in a state where it is not valid (e.g. after close).
    #[error("operation `{operation}` not valid in state {state}")]
    InvalidState {
        /// State the client was in.
        state: &'static str,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Platform backend failure outside of the categories above.
    #[error("backend error: {backend} - {details}")]
    Backend {
        /// Which backend produced the error.
        backend: &'static str,
        /// Platform-reported detail.
        details: String,
    },

    /// No device backend is compiled in for this platform.
    #[error("no audio backend available for this platform")]
    NotSupported,
}

impl AudioOutputError {
    /// Create a device-unavailable error.
    pub fn device_unavailable(details: impl Into<String>) -> Self {
        Self::DeviceUnavailable(details.into())
    }

    /// Create a format-unsupported error.
    pub fn format_unsupported(details: impl Into<String>) -> Self {
        Self::FormatUnsupported(details.into())
    }

    /// Create an activation-failed error.
    pub fn activation_failed(details: impl Into<String>) -> Self {
        Self::ActivationFailed(details.into())
    }

    /// Create a buffer-unavailable error.
    pub fn buffer_unavailable(requested: u32, available: u32) -> Self {
        Self::BufferUnavailable {
            requested,
            available,
        }
    }

    /// Create an invalid-format error.
    pub fn invalid_format(details: impl Into<String>) -> Self {
        Self::InvalidFormat(details.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state(state: &'static str, operation: &'static str) -> Self {
        Self::InvalidState { state, operation }
    }

    /// Create a backend error.
    pub fn backend(backend: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            details: details.into(),
        }
    }

    /// Whether the caller can reasonably retry after this error.
    ///
    /// Lease failures are transient (the ring drains as playback consumes
    /// frames); construction and state errors are terminal for the client.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BufferUnavailable { .. } | Self::Backend { .. })
    }

    /// Whether this error indicates the device itself is the problem.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }

    /// Whether this error is about the requested stream format.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::FormatUnsupported(_) | Self::InvalidFormat(_))
    }
}

#[cfg(all(target_os = "windows", feature = "device-native"))]
impl From<windows::core::Error> for AudioOutputError {
    fn from(err: windows::core::Error) -> Self {
        Self::backend("wasapi", format!("HRESULT {:#010x}: {err}", err.code().0))
    }
}

#[cfg(all(target_os = "linux", feature = "device-native"))]
impl From<alsa::Error> for AudioOutputError {
    fn from(err: alsa::Error) -> Self {
        Self::backend("alsa", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_predicates() {
        assert!(AudioOutputError::buffer_unavailable(512, 0).is_recoverable());
        assert!(!AudioOutputError::device_unavailable("gone").is_recoverable());
        assert!(AudioOutputError::device_unavailable("gone").is_device_error());
        assert!(AudioOutputError::format_unsupported("3-bit").is_format_error());
        assert!(AudioOutputError::invalid_format("bad frame size").is_format_error());
        assert!(!AudioOutputError::NotSupported.is_device_error());
    }

    #[test]
    fn display_includes_lease_counts() {
        let msg = AudioOutputError::buffer_unavailable(240, 16).to_string();
        assert!(msg.contains("240"));
        assert!(msg.contains("16"));
    }
}
