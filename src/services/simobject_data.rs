//! # SimObject Data Service
//!
//! Three request shapes over one wire family (§4.8): a one-shot read of a
//! single object, a periodic subscription to a single object, and a
//! by-type bulk query answered as a multi-part stream. All three decode
//! their payload through a caller-supplied [`DataDefinition<R>`] — tagged or
//! untagged, mirroring whichever form the definition was built with.
//!
//! The object id a record belongs to is never part of the wire-level field
//! list; it travels in the frame itself (the second word for a single-object
//! response, one word per entry for a by-type batch) and is handed to the
//! decoded record through the [`SimObjectIdHolder`] back-channel before the
//! caller's callback runs. Every `R` used with this service must implement
//! it explicitly — Rust has no way to make that implementation conditional
//! on whether the caller cares about the id, so it is a hard bound rather
//! than the original's best-effort capability check.
//!
//! Cancelling a one-shot or an in-flight by-type request only needs to
//! unregister the handler slot — the host retires both on its own.
//! Cancelling a *periodic* subscription additionally needs the host's
//! `stop-data-request`, which needs a live [`Connection`]; since a
//! [`Request`]'s cancel thunk is `'static` and may run long after the
//! `Connection` borrow that created it has ended, the thunk alone cannot
//! issue that call. [`SimObjectDataService::stop`] does both steps together
//! when a connection is at hand; a bare `drop` (or `Request::cancel`) still
//! unregisters the handler immediately, silencing the callback, but leaves
//! the host-side subscription to be discarded by the dispatcher's
//! no-matching-slot path instead (§5 Cancellation).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::codec::Reader;
use crate::connection::Connection;
use crate::datadef::DataDefinition;
use crate::dispatch::{Dispatcher, Frame};
use crate::error::Result;
use crate::handler::{HandlerPolicy, Registration, SinglePolicy, SingleThreadedRegistry};
use crate::ids::RequestId;
use crate::message::MessageTypeId;
use crate::request::Request;
use crate::transport::{DataRequestFlags, FrequencyLimits, SimObjectId, Transport};
use crate::types::{ObjectType, Period};

/// Abstract wire-visible message type for a single-object data response.
pub const SIMOBJECT_DATA_RESPONSE: MessageTypeId = 11;
/// Abstract wire-visible message type for a by-type bulk data response.
pub const SIMOBJECT_DATA_BYTYPE_RESPONSE: MessageTypeId = 12;

/// Lets the framework write the object id a record was decoded for into the
/// record itself, before the caller's callback runs (§4.8).
pub trait SimObjectIdHolder {
    fn set_sim_object_id(&mut self, object_id: u32);
}

fn decode_request_id(payload: &[u8]) -> Result<RequestId> {
    let mut r = Reader::new(payload);
    Ok(RequestId(r.read_i32()? as u32))
}

fn decode_record<R: Default>(reader: &mut Reader<'_>, definition: &DataDefinition<R>) -> Result<R> {
    let mut record = R::default();
    if definition.is_tagged() {
        let field_count = reader.read_i32()? as u32;
        definition.unmarshall_tagged(reader, &mut record, field_count)?;
    } else {
        definition.unmarshall(reader, &mut record)?;
    }
    Ok(record)
}

/// One by-type response frame: this request's id, its position in the
/// multi-part stream, and the batch of (object id, record) pairs it carries.
struct BatchFrame<R> {
    request_id: RequestId,
    entry_number: u32,
    out_of: u32,
    records: Vec<(u32, R)>,
}

fn decode_bytype_batch<R: SimObjectIdHolder + Default>(
    payload: &[u8],
    definition: &DataDefinition<R>,
) -> Result<BatchFrame<R>> {
    let mut r = Reader::new(payload);
    let request_id = RequestId(r.read_i32()? as u32);
    let entry_number = r.read_i32()? as u32;
    let out_of = r.read_i32()? as u32;
    let record_count = r.read_i32()? as u32;
    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        let object_id = r.read_i32()? as u32;
        let mut record = decode_record(&mut r, definition)?;
        record.set_sim_object_id(object_id);
        records.push((object_id, record));
    }
    Ok(BatchFrame {
        request_id,
        entry_number,
        out_of,
        records,
    })
}

type Registry = SingleThreadedRegistry<RequestId, Frame, SinglePolicy<Frame>>;

/// Issues and correlates `request-data-on-sim-object` and
/// `request-data-by-type` calls.
pub struct SimObjectDataService {
    registry: Arc<Registry>,
    /// Request ids whose by-type handler should be torn down once the
    /// dispatcher-level thunk (which holds the only live reference back
    /// into `registry` at the right moment) finishes routing the frame
    /// that completed them.
    completed: Arc<Mutex<Vec<RequestId>>>,
}

impl Default for SimObjectDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl SimObjectDataService {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new_single_threaded()),
            completed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers this service's thunks on the root dispatcher. Call once
    /// per connection before issuing any request.
    pub fn attach(&self, dispatcher: &Dispatcher) {
        let registry = self.registry.clone();
        dispatcher.on_message(SIMOBJECT_DATA_RESPONSE, move |frame: &Frame| {
            if let Ok(request_id) = decode_request_id(&frame.payload) {
                registry.dispatch(request_id, frame);
            }
        });

        let registry = self.registry.clone();
        let completed = self.completed.clone();
        dispatcher.on_message(SIMOBJECT_DATA_BYTYPE_RESPONSE, move |frame: &Frame| {
            let Ok(request_id) = decode_request_id(&frame.payload) else {
                return;
            };
            registry.dispatch(request_id, frame);
            let mut done = completed.lock().unwrap();
            if let Some(pos) = done.iter().position(|id| *id == request_id) {
                done.remove(pos);
                registry.unregister_all(&request_id);
            }
        });
    }

    /// One-shot read of a single object's data (default: the user's own
    /// current object). The handler is auto-removed after the first
    /// matching response.
    pub fn request_once<R, T: Transport>(
        &self,
        connection: &mut Connection<T>,
        definition: DataDefinition<R>,
        object_id: SimObjectId,
        mut callback: impl FnMut(&R) + Send + 'static,
    ) -> Result<Request>
    where
        R: SimObjectIdHolder + Default + Send + 'static,
    {
        let def_id = definition.register(connection)?;
        let request_id = connection.ids().next_request_id()?;
        self.registry.register(
            request_id,
            Registration::new(
                Box::new(move |frame: &Frame| {
                    let mut reader = Reader::new(&frame.payload);
                    let Ok(_) = reader.read_i32() else { return };
                    let Ok(recovered_id) = reader.read_i32() else { return };
                    if let Ok(mut record) = decode_record(&mut reader, &definition) {
                        record.set_sim_object_id(recovered_id as u32);
                        callback(&record);
                    }
                }),
                true,
            ),
        );
        let result = connection
            .transport_mut()
            .request_data_on_sim_object(request_id, def_id, object_id, Period::Once, DataRequestFlags::default(), FrequencyLimits::default());
        connection.record_result(result)?;
        let registry = self.registry.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }

    /// Periodic subscription to a single object's data. The handler is not
    /// auto-removed; cancel via [`SimObjectDataService::stop`] or by
    /// dropping the returned [`Request`] (§5 Cancellation).
    #[allow(clippy::too_many_arguments)]
    pub fn request_periodic<R, T: Transport>(
        &self,
        connection: &mut Connection<T>,
        definition: DataDefinition<R>,
        object_id: SimObjectId,
        period: Period,
        flags: DataRequestFlags,
        limits: FrequencyLimits,
        mut callback: impl FnMut(&R) + Send + 'static,
    ) -> Result<Request>
    where
        R: SimObjectIdHolder + Default + Send + 'static,
    {
        let def_id = definition.register(connection)?;
        let request_id = connection.ids().next_request_id()?;
        self.registry.register(
            request_id,
            Registration::new(
                Box::new(move |frame: &Frame| {
                    let mut reader = Reader::new(&frame.payload);
                    let Ok(_) = reader.read_i32() else { return };
                    let Ok(recovered_id) = reader.read_i32() else { return };
                    if let Ok(mut record) = decode_record(&mut reader, &definition) {
                        record.set_sim_object_id(recovered_id as u32);
                        callback(&record);
                    }
                }),
                false,
            ),
        );
        let result = connection
            .transport_mut()
            .request_data_on_sim_object(request_id, def_id, object_id, period, flags, limits);
        connection.record_result(result)?;
        let registry = self.registry.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }

    /// By-type bulk query (§4.8): `per_object` fires once per entry in the
    /// result set, in arrival order; `on_complete`, if given, fires exactly
    /// once at end-of-stream with the full `{object id -> R}` map, after
    /// which the handler slot is removed.
    pub fn request_by_type<R, T, F1, F2>(
        &self,
        connection: &mut Connection<T>,
        definition: DataDefinition<R>,
        radius_meters: u32,
        object_type: ObjectType,
        mut per_object: F1,
        mut on_complete: Option<F2>,
    ) -> Result<Request>
    where
        T: Transport,
        R: SimObjectIdHolder + Default + Send + 'static,
        F1: FnMut(&R) + Send + 'static,
        F2: FnMut(&HashMap<u32, R>) + Send + 'static,
    {
        let def_id = definition.register(connection)?;
        let request_id = connection.ids().next_request_id()?;
        let completed = self.completed.clone();
        let mut accumulated: HashMap<u32, R> = HashMap::new();
        self.registry.register(
            request_id,
            Registration::new(
                Box::new(move |frame: &Frame| {
                    let Ok(batch) = decode_bytype_batch(&frame.payload, &definition) else {
                        return;
                    };
                    for (object_id, record) in batch.records {
                        per_object(&record);
                        accumulated.insert(object_id, record);
                    }
                    if batch.entry_number + 1 == batch.out_of {
                        if let Some(cb) = on_complete.as_mut() {
                            cb(&accumulated);
                        }
                        completed.lock().unwrap().push(batch.request_id);
                    }
                }),
                false,
            ),
        );
        let result = connection
            .transport_mut()
            .request_data_by_type(request_id, def_id, radius_meters, object_type);
        connection.record_result(result)?;
        let registry = self.registry.clone();
        Ok(Request::new(request_id, move || {
            registry.unregister_all(&request_id);
        }))
    }

    /// Issues the host's stop-request for a periodic (or in-flight by-type)
    /// subscription and unregisters its handler, together.
    pub fn stop<T: Transport>(&self, connection: &mut Connection<T>, mut request: Request) -> Result<()> {
        let result = connection.transport_mut().stop_data_request(request.request_id());
        connection.record_result(result)?;
        request.cancel();
        Ok(())
    }
}
