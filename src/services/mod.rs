//! # L4 Services
//!
//! Each module here owns one correlation-keyed registry and the
//! request/response shape for one area of the host Protocol (§4.7–§4.11).
//! A service is attached to a [`crate::dispatch::Dispatcher`] once per
//! connection; every `request_*` method then allocates whatever ids it
//! needs from the process-wide [`crate::ids::allocators`] and returns
//! a [`crate::request::Request`] the caller uses to cancel.

pub mod events;
pub mod facility;
pub mod simobject_data;
pub mod system_state;
