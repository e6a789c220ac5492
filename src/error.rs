//! # Error Types
//!
//! The core never panics and never throws an exception across the dispatch
//! boundary. Every fallible public operation returns [`Result`], whose error
//! variants mirror the six Kinds of the error handling design: a failed
//! transport call, a rejected configuration section, an unmapped client
//! event, a frame whose declared size exceeds the buffer it arrived in, a
//! host-reported size mismatch delivered as an exception frame, and
//! exhaustion of the host's per-session id capacity.
//!
//! Ad-hoc internal failures (file I/O in the repository loader, catalog
//! parse failures) are composed with [`anyhow::Error`] and converted at the
//! module boundary rather than growing the public enum with variants no
//! caller can usefully match on.

use thiserror::Error;

/// Result alias used throughout the core's public, typed API.
pub type Result<T> = std::result::Result<T, SimConnectError>;

/// Host result code returned by a transport primitive. Opaque beyond its
/// success/failure meaning; the host defines the concrete numeric space.
pub type HResult = i32;

/// The exception kind carried by a host exception frame (§7, Kind 5 and 6).
///
/// This is a small, closed enumeration of the conditions the host reports
/// out-of-band rather than through the originating request's own callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// The host rejected a marshalled record because its declared size did
    /// not match what the data definition produced.
    SizeMismatch,
    /// The host's per-session identifier capacity has been exhausted.
    OutOfIds,
    /// Any other host-reported exception code not otherwise distinguished.
    Other(i32),
}

/// The public error type of the SimConnect client core.
///
/// Each variant corresponds to one Kind of the error handling design.
/// Transport failures are *stored* on the [`crate::connection::Connection`]
/// as well as returned here, so callers can inspect `last_result()` without
/// threading the error value through unrelated call sites.
#[derive(Debug, Error)]
pub enum SimConnectError {
    /// A host primitive returned a non-success result code.
    #[error("transport call failed: {0}")]
    TransportFailure(HResult),

    /// The host refused a named configuration section at open time.
    #[error("invalid configuration section {index}")]
    BadConfig {
        /// The configuration section index the host rejected.
        index: u32,
    },

    /// A client event id was looked up that was never registered by name.
    #[error("unknown client event: {0}")]
    UnknownEvent(String),

    /// The declared frame size exceeds the bytes actually available.
    #[error("frame too small: declared {declared} bytes, buffer has {actual}")]
    MalformedFrame {
        /// The size the frame header claimed.
        declared: u32,
        /// The number of bytes actually present in the buffer.
        actual: u32,
    },

    /// The host reported a size mismatch exception for a prior send.
    #[error("SimConnect exception {exception:?} for send id {send_id}, field {field_index:?}")]
    SizeMismatch {
        /// The exception kind the host reported.
        exception: ExceptionKind,
        /// The send id that caused the exception, from `fetch_send_id()`.
        send_id: i32,
        /// The field index within the data definition, if the host supplied one.
        field_index: Option<u32>,
    },

    /// The process-wide id allocator for some id kind has been exhausted.
    #[error("id namespace exhausted")]
    OutOfIds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_displays_code() {
        let err = SimConnectError::TransportFailure(-5);
        assert_eq!(err.to_string(), "transport call failed: -5");
    }

    #[test]
    fn malformed_frame_displays_both_sizes() {
        let err = SimConnectError::MalformedFrame {
            declared: 128,
            actual: 64,
        };
        assert_eq!(
            err.to_string(),
            "frame too small: declared 128 bytes, buffer has 64"
        );
    }

    #[test]
    fn unknown_event_includes_name() {
        let err = SimConnectError::UnknownEvent("Brakes".to_string());
        assert_eq!(err.to_string(), "unknown client event: Brakes");
    }
}
