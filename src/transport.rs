//! # Transport Adapter
//!
//! Wraps the handful of primitives the host Protocol exposes (§4.1, §6.1):
//! open/close, pull- and push-style dispatch, and the send operations every
//! higher layer composes. No exception ever escapes an implementation of
//! [`Transport`] — every failure is surfaced as an `Err` the connection
//! stores, exactly as the teacher's `IpcTransport` trait keeps failures
//! inside `Result` rather than letting them unwind across the abstraction.
//!
//! The real implementation (linking the vendor SDK) is out of scope for
//! this core (§1); [`MockTransport`] is the only implementation shipped,
//! standing in for the host the way the teacher's concrete `IpcTransport`s
//! stand in for a wire protocol in its own tests.

use std::collections::VecDeque;

use crate::error::{HResult, Result, SimConnectError};
use crate::ids::{DefinitionId, EventId, NotificationGroupId, RequestId};
use crate::types::{FacilityListScope, FacilityListType, ObjectType, Period};

/// How a connection asks the host to signal new data is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// No async signal; the caller polls.
    Simple,
    /// The host signals an OS auto-reset event.
    OsEvent,
    /// The host posts a window message.
    Windowed {
        window_handle: usize,
        user_message_id: u32,
    },
}

/// Flags accompanying a sim-object data subscription request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataRequestFlags {
    pub only_when_changed: bool,
    pub tagged: bool,
}

/// Frequency limiting for a periodic sim-object data subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyLimits {
    /// How many periods to wait before the first delivery.
    pub origin: u32,
    /// How many deliveries to make before stopping (0 = unlimited).
    pub limit: u32,
}

/// The object id a sim-object data request targets; `None` means the
/// user's own current object.
pub type SimObjectId = Option<u32>;

/// Abstracts the operations the host Protocol's low-level API provides.
///
/// Every send operation stores its own result and is also returned here so
/// callers can choose whether to inspect it immediately or rely on
/// `Connection::last_result`.
pub trait Transport {
    /// Establishes a session under `name`.
    fn open(&mut self, name: &str, mode: OpenMode, config_index: u32) -> Result<()>;

    /// Tears the session down. Idempotent when already closed.
    fn close(&mut self) -> Result<()>;

    /// True if `open` has succeeded and `close` has not yet been called.
    fn is_open(&self) -> bool;

    /// Pulls one frame, or `None` if nothing is waiting.
    fn get_next_dispatch(&mut self) -> Result<Option<Vec<u8>>>;

    /// Push-style variant: invokes `callback` once per waiting frame.
    /// Returns `true` if at least one frame was delivered.
    fn call_dispatch(&mut self, callback: &mut dyn FnMut(&[u8])) -> Result<bool> {
        let mut any = false;
        while let Some(frame) = self.get_next_dispatch()? {
            callback(&frame);
            any = true;
        }
        Ok(any)
    }

    fn subscribe_to_system_event(&mut self, event_id: EventId, name: &str) -> Result<()>;
    fn unsubscribe_from_system_event(&mut self, event_id: EventId) -> Result<()>;

    fn add_to_data_definition(
        &mut self,
        def_id: DefinitionId,
        variable_name: &str,
        units: &str,
        datum_id: u32,
        epsilon: f32,
    ) -> Result<()>;

    fn request_system_state(&mut self, req_id: RequestId, name: &str) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn request_data_on_sim_object(
        &mut self,
        req_id: RequestId,
        def_id: DefinitionId,
        object_id: SimObjectId,
        period: Period,
        flags: DataRequestFlags,
        limits: FrequencyLimits,
    ) -> Result<()>;

    fn request_data_by_type(
        &mut self,
        req_id: RequestId,
        def_id: DefinitionId,
        radius_meters: u32,
        object_type: ObjectType,
    ) -> Result<()>;

    fn stop_data_request(&mut self, req_id: RequestId) -> Result<()>;

    fn map_client_event_to_sim_event(&mut self, event_id: EventId, name: &str) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn transmit_client_event(
        &mut self,
        object_id: SimObjectId,
        event_id: EventId,
        group_or_priority: i32,
        group_id_is_priority: bool,
        data: [u32; 5],
    ) -> Result<()>;

    fn add_client_event_to_notification_group(
        &mut self,
        group_id: NotificationGroupId,
        event_id: EventId,
        maskable: bool,
    ) -> Result<()>;

    fn remove_client_event_from_notification_group(
        &mut self,
        group_id: NotificationGroupId,
        event_id: EventId,
    ) -> Result<()>;

    fn set_notification_group_priority(&mut self, group_id: NotificationGroupId, priority: i32) -> Result<()>;

    fn clear_notification_group(&mut self, group_id: NotificationGroupId) -> Result<()>;

    /// Asks the host to report a notification group's current membership.
    /// Only meaningful once the group has been created (its priority set at
    /// least once); callers are expected to no-op otherwise (§4.9).
    fn request_notification_group(&mut self, group_id: NotificationGroupId) -> Result<()>;

    fn list_facilities(
        &mut self,
        req_id: RequestId,
        scope: FacilityListScope,
        list_type: FacilityListType,
    ) -> Result<()>;

    fn request_facility_data(
        &mut self,
        def_id: DefinitionId,
        req_id: RequestId,
        icao: &str,
        region: &str,
    ) -> Result<()>;

    /// The last host result code observed, or the stored error code
    /// (§4.2 `fetch_send_id`).
    fn fetch_send_id(&self) -> HResult;
}

/// An in-process stand-in for the host, used by the core's own test suite
/// and available to downstream integration tests.
///
/// Frames queued with [`MockTransport::push_frame`] are returned in FIFO
/// order by `get_next_dispatch`/`call_dispatch`. Every send operation is
/// recorded in `sent` for assertions and otherwise always succeeds, unless
/// `fail_next_send` has been armed.
#[derive(Default)]
pub struct MockTransport {
    open: bool,
    frames: VecDeque<Vec<u8>>,
    last_send_id: i32,
    fail_next_send: bool,
    /// A log of every operation issued, in call order, for test assertions.
    pub sent: Vec<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw frame to be returned by the next dispatch pull.
    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    /// Arms the next send operation to fail with `TransportFailure(-1)`.
    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    fn record(&mut self, op: impl Into<String>) -> Result<()> {
        self.last_send_id += 1;
        if self.fail_next_send {
            self.fail_next_send = false;
            return Err(SimConnectError::TransportFailure(-1));
        }
        self.sent.push(op.into());
        Ok(())
    }
}

impl Transport for MockTransport {
    fn open(&mut self, name: &str, _mode: OpenMode, config_index: u32) -> Result<()> {
        if config_index > 0 {
            return Err(SimConnectError::BadConfig { index: config_index });
        }
        self.open = true;
        self.sent.push(format!("open({name})"));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.sent.push("close".to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn get_next_dispatch(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.frames.pop_front())
    }

    fn subscribe_to_system_event(&mut self, event_id: EventId, name: &str) -> Result<()> {
        self.record(format!("subscribe_to_system_event({event_id}, {name})"))
    }

    fn unsubscribe_from_system_event(&mut self, event_id: EventId) -> Result<()> {
        self.record(format!("unsubscribe_from_system_event({event_id})"))
    }

    fn add_to_data_definition(
        &mut self,
        def_id: DefinitionId,
        variable_name: &str,
        units: &str,
        datum_id: u32,
        epsilon: f32,
    ) -> Result<()> {
        self.record(format!(
            "add_to_data_definition({def_id}, {variable_name}, {units}, {datum_id}, {epsilon})"
        ))
    }

    fn request_system_state(&mut self, req_id: RequestId, name: &str) -> Result<()> {
        self.record(format!("request_system_state({req_id}, {name})"))
    }

    fn request_data_on_sim_object(
        &mut self,
        req_id: RequestId,
        def_id: DefinitionId,
        object_id: SimObjectId,
        period: Period,
        _flags: DataRequestFlags,
        _limits: FrequencyLimits,
    ) -> Result<()> {
        self.record(format!(
            "request_data_on_sim_object({req_id}, {def_id}, {object_id:?}, {period:?})"
        ))
    }

    fn request_data_by_type(
        &mut self,
        req_id: RequestId,
        def_id: DefinitionId,
        radius_meters: u32,
        object_type: ObjectType,
    ) -> Result<()> {
        self.record(format!(
            "request_data_by_type({req_id}, {def_id}, {radius_meters}, {object_type})"
        ))
    }

    fn stop_data_request(&mut self, req_id: RequestId) -> Result<()> {
        self.record(format!("stop_data_request({req_id})"))
    }

    fn map_client_event_to_sim_event(&mut self, event_id: EventId, name: &str) -> Result<()> {
        self.record(format!("map_client_event_to_sim_event({event_id}, {name})"))
    }

    fn transmit_client_event(
        &mut self,
        object_id: SimObjectId,
        event_id: EventId,
        group_or_priority: i32,
        group_id_is_priority: bool,
        data: [u32; 5],
    ) -> Result<()> {
        self.record(format!(
            "transmit_client_event({object_id:?}, {event_id}, {group_or_priority}, {group_id_is_priority}, {data:?})"
        ))
    }

    fn add_client_event_to_notification_group(
        &mut self,
        group_id: NotificationGroupId,
        event_id: EventId,
        maskable: bool,
    ) -> Result<()> {
        self.record(format!(
            "add_client_event_to_notification_group({group_id}, {event_id}, {maskable})"
        ))
    }

    fn remove_client_event_from_notification_group(
        &mut self,
        group_id: NotificationGroupId,
        event_id: EventId,
    ) -> Result<()> {
        self.record(format!(
            "remove_client_event_from_notification_group({group_id}, {event_id})"
        ))
    }

    fn set_notification_group_priority(&mut self, group_id: NotificationGroupId, priority: i32) -> Result<()> {
        self.record(format!("set_notification_group_priority({group_id}, {priority})"))
    }

    fn clear_notification_group(&mut self, group_id: NotificationGroupId) -> Result<()> {
        self.record(format!("clear_notification_group({group_id})"))
    }

    fn request_notification_group(&mut self, group_id: NotificationGroupId) -> Result<()> {
        self.record(format!("request_notification_group({group_id})"))
    }

    fn list_facilities(
        &mut self,
        req_id: RequestId,
        scope: FacilityListScope,
        list_type: FacilityListType,
    ) -> Result<()> {
        self.record(format!("list_facilities({req_id}, {scope:?}, {list_type:?})"))
    }

    fn request_facility_data(
        &mut self,
        def_id: DefinitionId,
        req_id: RequestId,
        icao: &str,
        region: &str,
    ) -> Result<()> {
        self.record(format!("request_facility_data({def_id}, {req_id}, {icao}, {region})"))
    }

    fn fetch_send_id(&self) -> HResult {
        self.last_send_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_with_nonzero_config_index_is_bad_config() {
        let mut t = MockTransport::new();
        let err = t.open("test", OpenMode::Simple, 3).unwrap_err();
        assert!(matches!(err, SimConnectError::BadConfig { index: 3 }));
    }

    #[test]
    fn queued_frames_drain_in_fifo_order() {
        let mut t = MockTransport::new();
        t.push_frame(vec![1]);
        t.push_frame(vec![2]);
        let mut seen = Vec::new();
        t.call_dispatch(&mut |frame| seen.push(frame.to_vec())).unwrap();
        assert_eq!(seen, vec![vec![1], vec![2]]);
    }

    #[test]
    fn armed_failure_surfaces_once() {
        let mut t = MockTransport::new();
        t.fail_next_send();
        let err = t
            .request_system_state(RequestId(1), "Sim")
            .unwrap_err();
        assert!(matches!(err, SimConnectError::TransportFailure(-1)));
        // Next call succeeds again.
        t.request_system_state(RequestId(1), "Sim").unwrap();
    }
}
