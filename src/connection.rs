//! # Connection
//!
//! Owns a transport handle and the last host result (§4.2). A `Connection`
//! cannot be copied and is not meant to be moved once opened — callers hold
//! it behind a reference and share it with subsystems by borrow, matching
//! `connection.hpp`'s own non-copyable, non-movable contract.
//!
//! The three open-path specializations the original SDK exposes as
//! distinct classes (no signal, an OS event, a window message) are modeled
//! here as one [`OpenMode`] argument to [`Connection::open`] rather than
//! three separate connection types — the difference is confined to what
//! the transport's `open` call is told, not to any other method on this
//! type.

use tracing::{debug, info, warn};

use crate::error::{HResult, Result, SimConnectError};
use crate::ids::{EventCatalog, IdAllocators};
use crate::transport::{OpenMode, Transport};

/// Owns the transport handle and mirrors the host's last-result state.
///
/// `T` is the concrete [`Transport`] implementation; production code wires
/// this to a binding against the vendor SDK, tests use
/// [`crate::transport::MockTransport`]. The id allocators and event catalog
/// are process-wide (see [`crate::ids::allocators`]) rather than owned
/// here, so every `Connection` in the process draws from the same
/// namespaces.
pub struct Connection<T: Transport> {
    transport: T,
    last_result: HResult,
    auto_closing: bool,
}

impl<T: Transport> Connection<T> {
    /// Wraps a not-yet-opened transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            last_result: 0,
            auto_closing: false,
        }
    }

    /// Opens the session. Idempotent when already open.
    ///
    /// On failure the host's rejected configuration index surfaces as
    /// [`SimConnectError::BadConfig`]; any other transport failure as
    /// [`SimConnectError::TransportFailure`]. Either way the error is also
    /// returned to the caller, not just stored.
    pub fn open(&mut self, name: &str, mode: OpenMode, config_index: u32) -> Result<()> {
        if self.transport.is_open() {
            return Ok(());
        }
        match self.transport.open(name, mode, config_index) {
            Ok(()) => {
                info!(name, "connection opened");
                self.last_result = 0;
                Ok(())
            }
            Err(err) => {
                self.last_result = match &err {
                    SimConnectError::TransportFailure(code) => *code,
                    _ => -1,
                };
                warn!(error = %err, "connection open failed");
                Err(err)
            }
        }
    }

    /// Closes the session. Idempotent when already closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            return Ok(());
        }
        match self.transport.close() {
            Ok(()) => {
                info!("connection closed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "connection close failed");
                Err(err)
            }
        }
    }

    /// True once `open` has succeeded and `close` has not yet run.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// True if the last operation's result was success.
    pub fn succeeded(&self) -> bool {
        self.last_result == 0
    }

    /// True if the last operation's result was failure.
    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    /// Mirrors the host's last recorded result code.
    pub fn last_result(&self) -> HResult {
        self.last_result
    }

    /// The last sent packet id, for correlating an exception frame back to
    /// the send that caused it.
    pub fn fetch_send_id(&self) -> HResult {
        self.transport.fetch_send_id()
    }

    /// Whether a QUIT frame should close this connection once user
    /// handlers have run (§5 Auto-close).
    pub fn is_auto_closing(&self) -> bool {
        self.auto_closing
    }

    /// Sets the auto-closing behaviour.
    pub fn set_auto_closing(&mut self, auto_closing: bool) {
        self.auto_closing = auto_closing;
    }

    /// Borrows the underlying transport for a send operation.
    ///
    /// Every higher-layer service that issues a send does so through this
    /// accessor and records the result via [`Connection::record_result`],
    /// so the connection's `last_result`/`succeeded`/`failed` state always
    /// reflects the most recent outbound operation regardless of which
    /// subsystem issued it.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Stores the outcome of a send operation issued through
    /// [`Connection::transport_mut`].
    pub fn record_result<R>(&mut self, result: Result<R>) -> Result<R> {
        match &result {
            Ok(_) => self.last_result = 0,
            Err(SimConnectError::TransportFailure(code)) => self.last_result = *code,
            Err(_) => self.last_result = -1,
        }
        if let Err(err) = &result {
            debug!(error = %err, "send operation failed");
        }
        result
    }

    /// The process-wide id allocators (§4.3).
    pub fn ids(&self) -> &IdAllocators {
        crate::ids::allocators()
    }

    /// Runs `f` against the process-wide event catalog. Takes a closure
    /// rather than a borrowed reference since the catalog is shared by every
    /// connection behind a lock, not owned by this one.
    pub fn with_events<R>(&self, f: impl FnOnce(&mut EventCatalog) -> R) -> R {
        crate::ids::with_catalog(f)
    }

    /// Looks up or allocates the [`crate::ids::EventId`] for `name`.
    pub fn catalog_event(&mut self, name: &str) -> Result<crate::ids::EventId> {
        crate::ids::with_catalog(|catalog| catalog.get(self.ids(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn open_is_idempotent() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        assert!(conn.is_open());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        assert_eq!(conn.transport_mut().sent.iter().filter(|s| s.starts_with("open")).count(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();
    }

    #[test]
    fn bad_config_surfaces_and_is_stored() {
        let mut conn = Connection::new(MockTransport::new());
        let err = conn.open("test", OpenMode::Simple, 3).unwrap_err();
        assert!(matches!(err, SimConnectError::BadConfig { index: 3 }));
        assert!(conn.failed());
        assert!(!conn.is_open());
    }

    #[test]
    fn fetch_send_id_reflects_transport() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let result = conn.transport_mut().request_system_state(crate::ids::RequestId(1), "Sim");
        conn.record_result(result).unwrap();
        assert!(conn.fetch_send_id() >= 1);
    }
}
