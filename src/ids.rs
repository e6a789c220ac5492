//! # Identifier Allocators and Event Catalog
//!
//! Four disjoint, process-wide namespaces of 32-bit identifiers: requests,
//! data definitions, client events, and notification groups. Each is backed
//! by a monotonically increasing counter; ids are never reused within a
//! connection's lifetime, and an id issued against one definition must not
//! be reused for a different one.
//!
//! The event catalog additionally deduplicates client events by name: two
//! calls to [`EventCatalog::get`] with the same name return the same
//! [`EventId`], allocating a fresh one only on first sight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use crate::error::{Result, SimConnectError};
use crate::handler::{Lockable, RealLock};

/// Correlates an outgoing request with one or more inbound responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

/// Names a registered data definition, for sim-objects or facilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(pub u32);

/// Names a client event; the binding client-side-id<->name is unique within
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

/// Names a notification group used to collect events under a shared priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationGroupId(pub u32);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for NotificationGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single monotonic counter over `u32`. Shared by all four id kinds; each
/// kind gets its own instance so the namespaces stay disjoint.
#[derive(Debug, Default)]
struct Counter(AtomicU32);

impl Counter {
    const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Returns the next value, or [`SimConnectError::OutOfIds`] once the
    /// counter would wrap past `u32::MAX`.
    fn next(&self) -> Result<u32> {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = current
                .checked_add(1)
                .ok_or(SimConnectError::OutOfIds)?;
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Ok(next),
                Err(observed) => current = observed,
            }
        }
    }
}

/// Process-wide monotonic allocators for the four id namespaces.
///
/// Every [`crate::connection::Connection`] in the process borrows the same
/// instance through [`allocators`] rather than owning one, so two
/// connections never hand out overlapping ids — matching `connection.hpp`'s
/// function-local static `Requests`.
#[derive(Debug, Default)]
pub struct IdAllocators {
    requests: Counter,
    definitions: Counter,
    events: Counter,
    groups: Counter,
}

impl IdAllocators {
    /// Creates a fresh set of allocators, all starting at 1.
    pub const fn new() -> Self {
        Self {
            requests: Counter::new(),
            definitions: Counter::new(),
            events: Counter::new(),
            groups: Counter::new(),
        }
    }

    /// Allocates the next [`RequestId`].
    pub fn next_request_id(&self) -> Result<RequestId> {
        self.requests.next().map(RequestId)
    }

    /// Allocates the next [`DefinitionId`].
    pub fn next_definition_id(&self) -> Result<DefinitionId> {
        self.definitions.next().map(DefinitionId)
    }

    /// Allocates the next [`EventId`].
    pub fn next_event_id(&self) -> Result<EventId> {
        self.events.next().map(EventId)
    }

    /// Allocates the next [`NotificationGroupId`].
    pub fn next_group_id(&self) -> Result<NotificationGroupId> {
        self.groups.next().map(NotificationGroupId)
    }
}

/// A single client event record in the [`EventCatalog`].
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// The allocated id for this event.
    pub id: EventId,
    /// The Protocol-level name, e.g. `"Brakes"`.
    pub name: String,
    /// True once `map_client_event_to_sim_event` has been issued to the host.
    pub mapped: bool,
}

/// Deduplicates client events by name.
///
/// `get(name)` is lazy: the first call allocates an [`EventId`] and records
/// an unmapped entry; every subsequent call with the same name returns the
/// existing record. Mapping the event with the host (see
/// [`crate::services::events::EventService::map_event`]) is a separate step
/// that flips `mapped` to `true`; mapping an already-mapped event is
/// idempotent.
#[derive(Debug, Default)]
pub struct EventCatalog {
    by_name: HashMap<String, EventId>,
    records: HashMap<EventId, EventRecord>,
}

impl EventCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing record for `name`, or allocates a fresh one.
    pub fn get(&mut self, allocators: &IdAllocators, name: &str) -> Result<EventId> {
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }
        let id = allocators.next_event_id()?;
        self.by_name.insert(name.to_string(), id);
        self.records.insert(
            id,
            EventRecord {
                id,
                name: name.to_string(),
                mapped: false,
            },
        );
        Ok(id)
    }

    /// Looks up a previously-registered event by id.
    ///
    /// Returns [`SimConnectError::UnknownEvent`] when `id` was never
    /// produced by [`EventCatalog::get`] against this catalog.
    pub fn lookup(&self, id: EventId) -> Result<&EventRecord> {
        self.records
            .get(&id)
            .ok_or_else(|| SimConnectError::UnknownEvent(id.to_string()))
    }

    /// Marks an event as mapped with the host. No-op if already mapped.
    pub fn mark_mapped(&mut self, id: EventId) {
        if let Some(record) = self.records.get_mut(&id) {
            record.mapped = true;
        }
    }

    /// True if the event with this id has been mapped with the host.
    pub fn is_mapped(&self, id: EventId) -> bool {
        self.records.get(&id).map(|r| r.mapped).unwrap_or(false)
    }
}

static ALLOCATORS: OnceLock<IdAllocators> = OnceLock::new();
static CATALOG: OnceLock<RealLock<EventCatalog>> = OnceLock::new();

/// The process-wide id allocators, created on first access and shared by
/// every [`crate::connection::Connection`] for the life of the process.
pub fn allocators() -> &'static IdAllocators {
    ALLOCATORS.get_or_init(IdAllocators::new)
}

/// Runs `f` against the process-wide event catalog, created on first
/// access. Takes a closure rather than handing out a guard so callers can't
/// hold the lock across an unrelated operation.
pub fn with_catalog<R>(f: impl FnOnce(&mut EventCatalog) -> R) -> R {
    CATALOG.get_or_init(|| RealLock::new(EventCatalog::new())).with_lock(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_increasing() {
        let allocators = IdAllocators::new();
        let mut previous = 0u32;
        for _ in 0..100 {
            let id = allocators.next_request_id().unwrap();
            assert!(id.0 > previous);
            previous = id.0;
        }
    }

    #[test]
    fn namespaces_are_disjoint_counters() {
        let allocators = IdAllocators::new();
        let req = allocators.next_request_id().unwrap();
        let def = allocators.next_definition_id().unwrap();
        assert_eq!(req.0, 1);
        assert_eq!(def.0, 1);
    }

    #[test]
    fn event_catalog_deduplicates_by_name() {
        let allocators = IdAllocators::new();
        let mut catalog = EventCatalog::new();
        let first = catalog.get(&allocators, "Brakes").unwrap();
        let second = catalog.get(&allocators, "Brakes").unwrap();
        assert_eq!(first, second);
        let other = catalog.get(&allocators, "Gear").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn mapping_an_event_is_idempotent() {
        let allocators = IdAllocators::new();
        let mut catalog = EventCatalog::new();
        let id = catalog.get(&allocators, "Brakes").unwrap();
        assert!(!catalog.is_mapped(id));
        catalog.mark_mapped(id);
        catalog.mark_mapped(id);
        assert!(catalog.is_mapped(id));
    }

    #[test]
    fn lookup_of_unregistered_id_is_unknown_event() {
        let catalog = EventCatalog::new();
        let err = catalog.lookup(EventId(42)).unwrap_err();
        assert!(matches!(err, SimConnectError::UnknownEvent(_)));
    }
}
