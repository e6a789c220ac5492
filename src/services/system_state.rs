//! # System-State Service
//!
//! Maps a free-form state name (`"Sim"`, `"AircraftLoaded"`, ...) to one of
//! three typed responses the host reports back in a single frame: an
//! integer, a float, and a fixed-width string, mirroring
//! `SIMCONNECT_RECV_SYSTEM_STATE`. Grounded on `connection.hpp`'s two
//! `requestSystemState` overloads (§11 item 2): one allocates and returns
//! the [`RequestId`], the other takes a caller-supplied one.
//!
//! The handler slot is single-callback and auto-removing (§4.7: "one-shot
//! handler ... remains armed until a matching response arrives").
//! Unrecognised names never reach this service's handler at all — the host
//! reports them as an exception frame instead (§7 Kind 3/5).

use std::sync::Arc;

use crate::codec::Reader;
use crate::connection::Connection;
use crate::dispatch::{Dispatcher, Frame};
use crate::error::Result;
use crate::handler::{HandlerPolicy, Registration, SinglePolicy, SingleThreadedRegistry};
use crate::ids::RequestId;
use crate::message::MessageTypeId;
use crate::request::Request;
use crate::transport::Transport;

/// The abstract wire-visible message type for a system-state response.
/// Vendor-bound in a real binding; see [`crate::message::well_known`].
pub const SYSTEM_STATE_RESPONSE: MessageTypeId = 10;

/// The typed payload of one system-state response.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStateValue {
    pub integer: i32,
    pub float: f32,
    pub string: String,
}

impl SystemStateValue {
    /// Treats the integer field as a boolean (`Sim`, `DialogMode`).
    pub fn as_bool(&self) -> bool {
        self.integer != 0
    }
}

fn decode(payload: &[u8]) -> Result<(RequestId, SystemStateValue)> {
    let mut r = Reader::new(payload);
    let request_id = RequestId(r.read_i32()? as u32);
    let integer = r.read_i32()?;
    let float = r.read_f32()?;
    let string = r.read_stringn(260)?;
    Ok((request_id, SystemStateValue { integer, float, string }))
}

type Registry = SingleThreadedRegistry<RequestId, SystemStateValue, SinglePolicy<SystemStateValue>>;

/// Issues and correlates `request-system-state` calls (§4.7).
///
/// The handler table is `Arc`-shared between the service and every
/// [`Request`] it hands out, so a `Request`'s cancel thunk can unregister
/// its slot without the service needing to outlive it.
pub struct SystemStateService {
    registry: Arc<Registry>,
}

impl Default for SystemStateService {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStateService {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new_single_threaded()),
        }
    }

    /// Registers this service's thunk on the root dispatcher for
    /// [`SYSTEM_STATE_RESPONSE`] frames. Call once per connection before
    /// issuing any request.
    pub fn attach(&self, dispatcher: &Dispatcher) {
        let registry = self.registry.clone();
        dispatcher.on_message(SYSTEM_STATE_RESPONSE, move |frame: &Frame| {
            if let Ok((request_id, value)) = decode(&frame.payload) {
                registry.dispatch(request_id, &value);
            }
        });
    }

    /// Allocates a [`RequestId`], registers a one-shot handler, and issues
    /// the request. Returns a [`Request`] the caller can cancel before a
    /// response arrives.
    pub fn request<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        name: &str,
        callback: impl FnMut(&SystemStateValue) + Send + 'static,
    ) -> Result<Request> {
        let request_id = connection.ids().next_request_id()?;
        self.request_with_id(connection, name, request_id, callback)?;
        let registry = self.registry.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }

    /// As [`SystemStateService::request`], but the caller supplies the
    /// [`RequestId`] instead of one being allocated (`connection.hpp`'s
    /// second overload).
    pub fn request_with_id<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        name: &str,
        request_id: RequestId,
        mut callback: impl FnMut(&SystemStateValue) + Send + 'static,
    ) -> Result<()> {
        self.registry.register(
            request_id,
            Registration::new(
                Box::new(move |value: &SystemStateValue| callback(value)),
                true,
            ),
        );
        let result = connection.transport_mut().request_system_state(request_id, name);
        connection.record_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Builder;
    use crate::transport::{MockTransport, OpenMode};
    use std::sync::Mutex;

    fn response_frame(request_id: u32, integer: i32, float: f32, string: &str) -> Vec<u8> {
        let mut b = Builder::new();
        b.put_i32(request_id as i32);
        b.put_i32(integer);
        b.put_f32(float);
        b.put_stringn(string, 260);
        b.into_bytes()
    }

    fn raw_frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let size = (crate::message::HEADER_SIZE + payload.len()) as u32;
        buf.extend_from_slice(&size.to_ne_bytes());
        buf.extend_from_slice(&1u32.to_ne_bytes());
        buf.extend_from_slice(&SYSTEM_STATE_RESPONSE.to_ne_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn s4_typed_callback_fires_once_with_decoded_value_via_dispatcher() {
        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();
        let dispatcher = Dispatcher::new();

        let service = SystemStateService::new();
        service.attach(&dispatcher);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let request = service
            .request(&mut conn, "Sim", move |value: &SystemStateValue| {
                s.lock().unwrap().push(value.clone());
            })
            .unwrap();

        let payload = response_frame(request.request_id().0, 1, 0.0, "");
        conn.transport_mut().push_frame(raw_frame(&payload));
        dispatcher.drain_once(&mut conn).unwrap();

        let got = seen.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].as_bool());
    }

    #[test]
    fn second_response_for_same_id_does_not_refire_one_shot() {
        let service = SystemStateService::new();
        let dispatcher = Dispatcher::new();
        service.attach(&dispatcher);

        let mut conn = Connection::new(MockTransport::new());
        conn.open("test", OpenMode::Simple, 0).unwrap();

        let hits = Arc::new(Mutex::new(0u32));
        let h = hits.clone();
        let request = service
            .request(&mut conn, "FlightLoaded", move |_| {
                *h.lock().unwrap() += 1;
            })
            .unwrap();

        let payload = response_frame(request.request_id().0, 0, 0.0, "KSEA");
        conn.transport_mut().push_frame(raw_frame(&payload));
        conn.transport_mut().push_frame(raw_frame(&payload));
        dispatcher.drain_once(&mut conn).unwrap();

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
