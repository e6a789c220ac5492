//! # SimConnect Client
//!
//! A high-level client library for the flight simulator's external
//! integration protocol — the wire format and request/response model a
//! third-party application uses to exchange data with a running
//! simulation, modeled on the original SDK's `SimConnect_*` C API and its
//! `connection.hpp`/`handler.hpp` C++ wrapper layer.
//!
//! This crate does not talk to a simulator process itself. It owns the
//! protocol's framing, id allocation, handler dispatch, and the typed
//! services built on top of them; a concrete [`transport::Transport`]
//! implementation supplies the actual byte transport (a named pipe, a
//! socket, or — for tests — [`transport::MockTransport`]).
//!
//! ## Layering
//!
//! - [`transport`] — the abstract send/receive boundary a binding
//!   implements against the real protocol.
//! - [`message`], [`codec`] — frame headers and the little/native-endian
//!   reader and builder used to marshall payloads.
//! - [`ids`], [`error`] — id allocation, the event name catalog, and the
//!   closed error enum every fallible operation returns.
//! - [`handler`], [`dispatch`] — the pluggable-lock handler registry and
//!   the message-type dispatcher built on it, plus the three driver loops
//!   in [`dispatch::drivers`].
//! - [`connection`], [`request`] — the open/close session handle and the
//!   cancellable handle returned by every request-issuing call.
//! - [`datadef`] — data definitions: typed field lists that marshall Rust
//!   structs to and from the wire.
//! - [`services`] — the four request/response services built on the
//!   layers above: system state, SimObject data, events and notification
//!   groups, and facility data.
//! - [`repository`] — a SimObject repository that persists definitions
//!   and their last-known values to disk between sessions.
//! - [`config`] — the runtime-visible configuration toggles an
//!   application wires up; not read from a file or environment by the
//!   core itself.
//! - [`logging`] — an optional colorized `tracing` formatter.

pub mod codec;
pub mod config;
pub mod connection;
pub mod datadef;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod message;
pub mod repository;
pub mod request;
pub mod services;
pub mod transport;
pub mod types;

pub use codec::{Builder, Reader};
pub use config::{ClientConfig, Generation};
pub use connection::Connection;
pub use datadef::DataDefinition;
pub use dispatch::{Dispatcher, Frame};
pub use error::{ExceptionKind, HResult, Result, SimConnectError};
pub use ids::{DefinitionId, EventId, NotificationGroupId, RequestId};
pub use request::Request;
pub use transport::{OpenMode, Transport};
pub use types::{FacilityListScope, FacilityListType, ObjectType, Period, Priority};

pub use services::events::{EventService, NotificationGroup};
pub use services::facility::{FacilityDefinitionBuilder, FacilityService};
pub use services::simobject_data::SimObjectDataService;
pub use services::system_state::{SystemStateService, SystemStateValue};

pub use repository::SimObjectRepository;
