//! # Event Service
//!
//! Client events (§4.9): mapping a name to an [`EventId`], grouping mapped
//! events under a [`NotificationGroup`] with a shared priority, transmitting
//! events to the sim, and receiving inbound event frames keyed by event id.
//!
//! The original ties a `NotificationGroup` back to its owning `EventHandler`
//! through a template parameter, which in a systems language with no
//! recursive template instantiation becomes a genuine reference cycle. The
//! cycle is broken the way §9's design notes prescribe: all group state
//! (priority, created flag, membership) lives in one table owned by
//! [`EventService`], keyed by [`NotificationGroupId`]; [`NotificationGroup`]
//! is a cheap handle — an id plus a clone of the shared table's `Arc` — so
//! `create_notification_group` can still hand back a by-value, fluently
//! chainable object (`group.add_event(conn, "Brakes")?.add_event(conn,
//! "Gear")?`) without the handle itself owning anything that outlives the
//! service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::codec::Reader;
use crate::connection::Connection;
use crate::dispatch::{Dispatcher, Frame};
use crate::error::Result;
use crate::handler::{HandlerPolicy, MultiPolicy, Registration, SingleThreadedRegistry};
use crate::ids::EventId;
use crate::ids::NotificationGroupId;
use crate::message::MessageTypeId;
use crate::request::Request;
use crate::transport::Transport;
use crate::types::Priority;

/// The abstract wire-visible message type for an inbound event frame.
pub const EVENT_RESPONSE: MessageTypeId = 13;

/// One inbound event notification: which group it arrived through (if any),
/// which client event fired, and its associated data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventData {
    pub group_id: NotificationGroupId,
    pub event_id: EventId,
    pub data: u32,
}

fn decode(payload: &[u8]) -> Result<EventData> {
    let mut r = Reader::new(payload);
    let group_id = NotificationGroupId(r.read_i32()? as u32);
    let event_id = EventId(r.read_i32()? as u32);
    let data = r.read_i32()? as u32;
    Ok(EventData { group_id, event_id, data })
}

/// Maps a freshly mapped or already-mapped event id against the host.
/// Shared by [`EventService::map_event`] and [`NotificationGroup::add_event`]
/// so both paths issue exactly the same idempotent mapping call.
fn ensure_mapped<T: Transport>(connection: &mut Connection<T>, name: &str) -> Result<EventId> {
    let event_id = connection.catalog_event(name)?;
    if !connection.with_events(|c| c.is_mapped(event_id)) {
        let result = connection.transport_mut().map_client_event_to_sim_event(event_id, name);
        connection.record_result(result)?;
        connection.with_events(|c| c.mark_mapped(event_id));
    }
    Ok(event_id)
}

#[derive(Debug, Default)]
struct GroupState {
    priority: Option<Priority>,
    created: bool,
    members: HashSet<EventId>,
}

type GroupTable = Arc<Mutex<HashMap<NotificationGroupId, GroupState>>>;

type Registry = SingleThreadedRegistry<EventId, EventData, MultiPolicy<EventData>>;

/// Mapping, notification groups, transmit, and receive for client events.
pub struct EventService {
    registry: Arc<Registry>,
    groups: GroupTable,
}

impl Default for EventService {
    fn default() -> Self {
        Self::new()
    }
}

impl EventService {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new_single_threaded()),
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers this service's thunk on the root dispatcher for
    /// [`EVENT_RESPONSE`] frames. Call once per connection.
    pub fn attach(&self, dispatcher: &Dispatcher) {
        let registry = self.registry.clone();
        dispatcher.on_message(EVENT_RESPONSE, move |frame: &Frame| {
            if let Ok(event) = decode(&frame.payload) {
                registry.dispatch(event.event_id, &event);
            }
        });
    }

    /// Looks up or allocates `name`'s [`EventId`] and maps it with the host
    /// if it isn't mapped yet. Mapping an already-mapped event is a no-op.
    pub fn map_event<T: Transport>(&self, connection: &mut Connection<T>, name: &str) -> Result<EventId> {
        ensure_mapped(connection, name)
    }

    /// Registers a callback for every frame carrying `event_id`, regardless
    /// of which notification group it arrived through (§4.6 multi-handler
    /// policy: every registered callback fires, in registration order).
    pub fn on_event(
        &self,
        event_id: EventId,
        callback: impl FnMut(&EventData) + Send + 'static,
    ) -> Request {
        let handler_id = self.registry.register(event_id, Registration::new(Box::new(callback), false));
        let registry = self.registry.clone();
        Request::new(crate::ids::RequestId(event_id.0), move || {
            registry.unregister(&event_id, handler_id);
        })
    }

    /// Allocates a [`NotificationGroupId`] and returns a fluent handle for
    /// it. The group carries no priority until the first event is added.
    pub fn create_notification_group<T: Transport>(
        &self,
        connection: &mut Connection<T>,
    ) -> Result<NotificationGroup> {
        let id = connection.ids().next_group_id()?;
        self.groups.lock().insert(id, GroupState::default());
        Ok(NotificationGroup {
            id,
            groups: self.groups.clone(),
        })
    }

    /// Requests the host re-broadcast a notification group's membership
    /// (`NotificationGroup::request()` in the original). Warns and no-ops
    /// if the group has never been created — the host has nothing to
    /// report for a group it has never heard `set-notification-group-priority`
    /// for.
    pub fn request_group_state<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        group_id: NotificationGroupId,
    ) -> Result<()> {
        let created = self
            .groups
            .lock()
            .get(&group_id)
            .map(|g| g.created)
            .unwrap_or(false);
        if !created {
            warn!(%group_id, "requested state of a notification group that was never created");
            return Ok(());
        }
        let result = connection.transport_mut().request_notification_group(group_id);
        connection.record_result(result)
    }

    /// Sends `event_id` through `group_id`, to the user's own aircraft.
    pub fn send_event<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        event_id: EventId,
        group_id: NotificationGroupId,
        data: u32,
    ) -> Result<()> {
        let result = connection
            .transport_mut()
            .transmit_client_event(None, event_id, group_id.0 as i32, false, [data, 0, 0, 0, 0]);
        connection.record_result(result)
    }

    /// As [`EventService::send_event`], but the group-less priority form:
    /// the priority is passed as a group id with the Protocol's
    /// "group-id-is-priority" flag set.
    pub fn send_event_with_priority<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        event_id: EventId,
        priority: Priority,
        data: u32,
    ) -> Result<()> {
        let result =
            connection
                .transport_mut()
                .transmit_client_event(None, event_id, priority.raw(), true, [data, 0, 0, 0, 0]);
        connection.record_result(result)
    }

    /// As [`EventService::send_event`], targeted at a specific sim object.
    pub fn send_event_to_object<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        object_id: u32,
        event_id: EventId,
        group_id: NotificationGroupId,
        data: u32,
    ) -> Result<()> {
        let result = connection.transport_mut().transmit_client_event(
            Some(object_id),
            event_id,
            group_id.0 as i32,
            false,
            [data, 0, 0, 0, 0],
        );
        connection.record_result(result)
    }

    /// As [`EventService::send_event_with_priority`], targeted at a specific
    /// sim object.
    pub fn send_event_to_object_with_priority<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        object_id: u32,
        event_id: EventId,
        priority: Priority,
        data: u32,
    ) -> Result<()> {
        let result = connection.transport_mut().transmit_client_event(
            Some(object_id),
            event_id,
            priority.raw(),
            true,
            [data, 0, 0, 0, 0],
        );
        connection.record_result(result)
    }

    /// Five-word-data variant of [`EventService::send_event`].
    pub fn send_event5<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        event_id: EventId,
        group_id: NotificationGroupId,
        data: [u32; 5],
    ) -> Result<()> {
        let result = connection
            .transport_mut()
            .transmit_client_event(None, event_id, group_id.0 as i32, false, data);
        connection.record_result(result)
    }

    /// Five-word-data variant of [`EventService::send_event_with_priority`].
    pub fn send_event5_with_priority<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        event_id: EventId,
        priority: Priority,
        data: [u32; 5],
    ) -> Result<()> {
        let result = connection
            .transport_mut()
            .transmit_client_event(None, event_id, priority.raw(), true, data);
        connection.record_result(result)
    }

    /// Five-word-data variant of [`EventService::send_event_to_object`].
    pub fn send_event5_to_object<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        object_id: u32,
        event_id: EventId,
        group_id: NotificationGroupId,
        data: [u32; 5],
    ) -> Result<()> {
        let result =
            connection
                .transport_mut()
                .transmit_client_event(Some(object_id), event_id, group_id.0 as i32, false, data);
        connection.record_result(result)
    }

    /// Five-word-data variant of
    /// [`EventService::send_event_to_object_with_priority`].
    pub fn send_event5_to_object_with_priority<T: Transport>(
        &self,
        connection: &mut Connection<T>,
        object_id: u32,
        event_id: EventId,
        priority: Priority,
        data: [u32; 5],
    ) -> Result<()> {
        let result =
            connection
                .transport_mut()
                .transmit_client_event(Some(object_id), event_id, priority.raw(), true, data);
        connection.record_result(result)
    }
}

/// A fluent handle onto one notification group's state, shared with the
/// owning [`EventService`] through `groups`. Every method consumes and
/// returns `Self` so calls chain (`group.add_event(conn, "Brakes")?`), but
/// none of the state a call reads or writes lives in the handle itself.
pub struct NotificationGroup {
    id: NotificationGroupId,
    groups: GroupTable,
}

impl NotificationGroup {
    /// This group's id.
    pub fn id(&self) -> NotificationGroupId {
        self.id
    }

    /// The priority currently recorded for this group — `Priority::Default`
    /// until a `with_*_priority` call or the first `add_event` sets one.
    pub fn priority(&self) -> Priority {
        self.groups
            .lock()
            .get(&self.id)
            .and_then(|g| g.priority)
            .unwrap_or(Priority::Default)
    }

    /// True once the host has accepted `set-notification-group-priority`
    /// for this group (happens on the first successful `add_event`/
    /// `add_maskable_event`).
    pub fn is_created(&self) -> bool {
        self.groups.lock().get(&self.id).map(|g| g.created).unwrap_or(false)
    }

    fn set_priority(self, priority: Priority) -> Self {
        self.groups.lock().get_mut(&self.id).expect("group state present").priority = Some(priority);
        self
    }

    pub fn with_highest_priority(self) -> Self {
        self.set_priority(Priority::Highest)
    }

    pub fn with_highest_maskable_priority(self) -> Self {
        self.set_priority(Priority::HighestMaskable)
    }

    pub fn with_standard_priority(self) -> Self {
        self.set_priority(Priority::Standard)
    }

    pub fn with_default_priority(self) -> Self {
        self.set_priority(Priority::Default)
    }

    pub fn with_lowest_priority(self) -> Self {
        self.set_priority(Priority::Lowest)
    }

    fn add_event_impl<T: Transport>(self, connection: &mut Connection<T>, name: &str, maskable: bool) -> Result<Self> {
        let event_id = ensure_mapped(connection, name)?;

        if self.groups.lock().get(&self.id).expect("group state present").priority.is_none() {
            self.groups.lock().get_mut(&self.id).unwrap().priority = Some(Priority::Default);
        }

        let result = connection
            .transport_mut()
            .add_client_event_to_notification_group(self.id, event_id, maskable);
        connection.record_result(result)?;

        let needs_create = !self.groups.lock().get(&self.id).unwrap().created;
        if needs_create {
            let priority = self.priority();
            let result = connection.transport_mut().set_notification_group_priority(self.id, priority.raw());
            connection.record_result(result)?;
            self.groups.lock().get_mut(&self.id).unwrap().created = true;
        }

        self.groups.lock().get_mut(&self.id).unwrap().members.insert(event_id);
        Ok(self)
    }

    /// Auto-maps `name` if needed, adds it to this group, and — on the
    /// first successful add — transitions the group to *created* by
    /// issuing `set-notification-group-priority` (§4.9).
    pub fn add_event<T: Transport>(self, connection: &mut Connection<T>, name: &str) -> Result<Self> {
        self.add_event_impl(connection, name, false)
    }

    /// As [`NotificationGroup::add_event`], but the event can be masked
    /// from reaching the next, lower-priority group.
    pub fn add_maskable_event<T: Transport>(self, connection: &mut Connection<T>, name: &str) -> Result<Self> {
        self.add_event_impl(connection, name, true)
    }

    /// Removes one event's membership in this group. Leaves the event
    /// itself mapped.
    pub fn remove_event<T: Transport>(self, connection: &mut Connection<T>, event_id: EventId) -> Result<Self> {
        let result = connection
            .transport_mut()
            .remove_client_event_from_notification_group(self.id, event_id);
        connection.record_result(result)?;
        self.groups.lock().get_mut(&self.id).unwrap().members.remove(&event_id);
        Ok(self)
    }

    /// Clears every member from this group. The removed events remain
    /// mapped — `clear` only drops group membership (§4.9, S3).
    pub fn clear<T: Transport>(self, connection: &mut Connection<T>) -> Result<Self> {
        let result = connection.transport_mut().clear_notification_group(self.id);
        connection.record_result(result)?;
        self.groups.lock().get_mut(&self.id).unwrap().members.clear();
        Ok(self)
    }
}
