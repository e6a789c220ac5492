//! # Handler Registry
//!
//! A handler slot holds zero or more callables invoked when a message
//! matching its key arrives. Two policies parameterize every slot (§4.6):
//! [`SinglePolicy`] holds at most one callback, replacing on `register` and
//! clearing on `unregister`; [`MultiPolicy`] holds an ordered list, appends
//! on `register`, and can clear one slot or all of them. Both honour the
//! *auto-remove* flag (§3): a callback registered with `auto_remove = true`
//! is dropped after its first invocation.
//!
//! [`HandlerRegistry`] composes a policy per correlation key plus one
//! default slot, behind a pluggable lock (§5): [`NoopLock`] for
//! single-threaded builds, [`RealLock`] when a separate thread drives the
//! dispatcher. The lock discipline is: every mutation takes the lock, and
//! every callback invocation runs with the lock released — `dispatch`
//! drains a slot's registrations under the lock, releases it, invokes the
//! callbacks, then re-acquires the lock to restore whichever registrations
//! were not auto-removed.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// A single registered callback plus its auto-remove flag.
pub struct Registration<Payload> {
    callback: Box<dyn FnMut(&Payload) + Send>,
    auto_remove: bool,
}

impl<Payload> Registration<Payload> {
    pub fn new(callback: Box<dyn FnMut(&Payload) + Send>, auto_remove: bool) -> Self {
        Self {
            callback,
            auto_remove,
        }
    }
}

/// The behaviour a handler slot policy must provide.
pub trait HandlerPolicy<Payload>: Default {
    /// The id type `register` hands back for later `unregister` calls.
    type HandlerId: Copy + Eq + std::fmt::Debug;

    /// Registers a callback, returning an id that can later unregister it.
    fn register(&mut self, callback: Registration<Payload>) -> Self::HandlerId;

    /// Removes one registration by id. No-op if the id is unknown.
    fn unregister(&mut self, id: Self::HandlerId);

    /// Removes every registration.
    fn unregister_all(&mut self);

    /// True if at least one callback is currently registered.
    fn has_handlers(&self) -> bool;

    /// Removes and returns every active registration, leaving this policy
    /// empty. Used by [`HandlerRegistry::dispatch`] to invoke callbacks
    /// with the lock released.
    fn drain(&mut self) -> Vec<(Self::HandlerId, Registration<Payload>)>;

    /// Re-inserts registrations that should remain armed.
    fn restore(&mut self, entries: Vec<(Self::HandlerId, Registration<Payload>)>);
}

/// Holds at most one callback. Setting a new one replaces any existing
/// registration outright.
#[derive(Default)]
pub struct SinglePolicy<Payload> {
    slot: Option<Registration<Payload>>,
}

impl<Payload> HandlerPolicy<Payload> for SinglePolicy<Payload> {
    type HandlerId = ();

    fn register(&mut self, callback: Registration<Payload>) -> Self::HandlerId {
        self.slot = Some(callback);
    }

    fn unregister(&mut self, _id: Self::HandlerId) {
        self.slot = None;
    }

    fn unregister_all(&mut self) {
        self.slot = None;
    }

    fn has_handlers(&self) -> bool {
        self.slot.is_some()
    }

    fn drain(&mut self) -> Vec<(Self::HandlerId, Registration<Payload>)> {
        self.slot.take().into_iter().map(|r| ((), r)).collect()
    }

    fn restore(&mut self, entries: Vec<(Self::HandlerId, Registration<Payload>)>) {
        self.slot = entries.into_iter().next().map(|(_, r)| r);
    }
}

/// Holds an ordered list of callbacks, each with an allocator-issued
/// internal id. `register` appends; `unregister` removes one by id;
/// `unregister_all` clears the list; invocation calls every slot in
/// registration order.
#[derive(Default)]
pub struct MultiPolicy<Payload> {
    slots: Vec<(u32, Registration<Payload>)>,
    next_id: u32,
}

impl<Payload> HandlerPolicy<Payload> for MultiPolicy<Payload> {
    type HandlerId = u32;

    fn register(&mut self, callback: Registration<Payload>) -> Self::HandlerId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.slots.push((id, callback));
        id
    }

    fn unregister(&mut self, id: Self::HandlerId) {
        self.slots.retain(|(slot_id, _)| *slot_id != id);
    }

    fn unregister_all(&mut self) {
        self.slots.clear();
    }

    fn has_handlers(&self) -> bool {
        !self.slots.is_empty()
    }

    fn drain(&mut self) -> Vec<(Self::HandlerId, Registration<Payload>)> {
        std::mem::take(&mut self.slots)
    }

    fn restore(&mut self, mut entries: Vec<(Self::HandlerId, Registration<Payload>)>) {
        // Restored survivors keep their relative order and precede any
        // registration made while callbacks were running (none should be,
        // under the single-threaded cooperative model, but this keeps the
        // ordering guarantee honest if one slips in).
        entries.append(&mut self.slots);
        self.slots = entries;
    }
}

/// A pluggable lock used by [`HandlerRegistry`]. `NoopLock` is a plain
/// `RefCell` for single-threaded builds; `RealLock` wraps a
/// `parking_lot::Mutex` for the cross-thread configuration (§5).
pub trait Lockable<T> {
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// Single-threaded lock with no synchronization overhead.
pub struct NoopLock<T>(std::cell::RefCell<T>);

impl<T> NoopLock<T> {
    pub fn new(value: T) -> Self {
        Self(std::cell::RefCell::new(value))
    }
}

impl<T> Lockable<T> for NoopLock<T> {
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

/// Real mutex for a dispatcher driven from a thread other than the one
/// issuing send operations.
pub struct RealLock<T>(Mutex<T>);

impl<T> RealLock<T> {
    pub fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }
}

impl<T> Lockable<T> for RealLock<T> {
    fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.lock())
    }
}

pub(crate) struct RegistryInner<K, Payload, P> {
    default_slot: P,
    by_key: HashMap<K, P>,
}

/// A registry backed by [`NoopLock`], for single-threaded builds.
pub type SingleThreadedRegistry<K, Payload, P> =
    HandlerRegistry<K, Payload, P, NoopLock<RegistryInner<K, Payload, P>>>;

/// A registry backed by [`RealLock`], for the cross-thread configuration.
pub type CrossThreadRegistry<K, Payload, P> =
    HandlerRegistry<K, Payload, P, RealLock<RegistryInner<K, Payload, P>>>;

/// A correlation-keyed table of handler slots plus one default slot,
/// guarded by a pluggable lock.
pub struct HandlerRegistry<K, Payload, P, L> {
    lock: L,
    _marker: std::marker::PhantomData<(K, Payload, P)>,
}

impl<K, Payload, P, L> HandlerRegistry<K, Payload, P, L>
where
    K: Eq + Hash + Clone,
    P: HandlerPolicy<Payload> + Default,
    L: Lockable<RegistryInner<K, Payload, P>>,
{
    fn inner_new(lock: L) -> Self {
        Self {
            lock,
            _marker: std::marker::PhantomData,
        }
    }

    /// Registers a callback for `key`.
    pub fn register(&self, key: K, callback: Registration<Payload>) -> P::HandlerId {
        self.lock.with_lock(|inner| {
            inner
                .by_key
                .entry(key)
                .or_insert_with(P::default)
                .register(callback)
        })
    }

    /// Registers a default-slot callback, invoked when no keyed slot
    /// matches.
    pub fn register_default(&self, callback: Registration<Payload>) -> P::HandlerId {
        self.lock
            .with_lock(|inner| inner.default_slot.register(callback))
    }

    /// Removes one registration from `key`'s slot.
    pub fn unregister(&self, key: &K, id: P::HandlerId) {
        self.lock.with_lock(|inner| {
            if let Some(policy) = inner.by_key.get_mut(key) {
                policy.unregister(id);
            }
        });
    }

    /// Removes every registration for `key`.
    pub fn unregister_all(&self, key: &K) {
        self.lock.with_lock(|inner| {
            if let Some(policy) = inner.by_key.get_mut(key) {
                policy.unregister_all();
            }
        });
    }

    /// Dispatches `payload` to `key`'s slot if it has handlers, else to the
    /// default slot if that has handlers. Returns `true` if anything was
    /// invoked.
    pub fn dispatch(&self, key: K, payload: &Payload) -> bool {
        let drained = self.lock.with_lock(|inner| {
            if let Some(policy) = inner.by_key.get_mut(&key) {
                if policy.has_handlers() {
                    return Some((true, policy.drain()));
                }
            }
            if inner.default_slot.has_handlers() {
                return Some((false, inner.default_slot.drain()));
            }
            None
        });

        let Some((keyed, entries)) = drained else {
            return false;
        };

        let mut survivors = Vec::with_capacity(entries.len());
        for (id, mut reg) in entries {
            (reg.callback)(payload);
            if !reg.auto_remove {
                survivors.push((id, reg));
            }
        }

        self.lock.with_lock(|inner| {
            let policy = if keyed {
                inner.by_key.entry(key).or_insert_with(P::default)
            } else {
                &mut inner.default_slot
            };
            policy.restore(survivors);
        });

        true
    }
}

impl<K, Payload, P> HandlerRegistry<K, Payload, P, NoopLock<RegistryInner<K, Payload, P>>>
where
    K: Eq + Hash + Clone,
    P: HandlerPolicy<Payload> + Default,
{
    /// Creates a registry backed by a single-threaded, no-op lock.
    pub fn new_single_threaded() -> Self {
        Self::inner_new(NoopLock::new(RegistryInner {
            default_slot: P::default(),
            by_key: HashMap::new(),
        }))
    }
}

impl<K, Payload, P> HandlerRegistry<K, Payload, P, RealLock<RegistryInner<K, Payload, P>>>
where
    K: Eq + Hash + Clone,
    P: HandlerPolicy<Payload> + Default,
{
    /// Creates a registry backed by a real mutex, for cross-thread use.
    pub fn new_cross_thread() -> Self {
        Self::inner_new(RealLock::new(RegistryInner {
            default_slot: P::default(),
            by_key: HashMap::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn multi_handler_fans_out_to_every_registration_in_order() {
        let registry: HandlerRegistry<u32, u32, MultiPolicy<u32>, _> =
            HandlerRegistry::new_single_threaded();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3u32 {
            let order = order.clone();
            registry.register(
                1,
                Registration::new(Box::new(move |_payload: &u32| order.lock().push(tag)), false),
            );
        }

        registry.dispatch(1, &42);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn clearing_one_multi_slot_leaves_others_intact() {
        let registry: HandlerRegistry<u32, u32, MultiPolicy<u32>, _> =
            HandlerRegistry::new_single_threaded();
        let calls = Arc::new(AtomicU32::new(0));

        let c1 = calls.clone();
        let id1 = registry.register(
            1,
            Registration::new(Box::new(move |_: &u32| { c1.fetch_add(1, Ordering::SeqCst); }), false),
        );
        let c2 = calls.clone();
        registry.register(
            1,
            Registration::new(Box::new(move |_: &u32| { c2.fetch_add(10, Ordering::SeqCst); }), false),
        );

        registry.unregister(&1, id1);
        registry.dispatch(1, &0);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn auto_remove_single_handler_falls_through_after_first_hit() {
        let registry: HandlerRegistry<u32, u32, SinglePolicy<u32>, _> =
            HandlerRegistry::new_single_threaded();
        let hits = Arc::new(AtomicU32::new(0));
        let default_hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        registry.register(
            7,
            Registration::new(Box::new(move |_: &u32| { h.fetch_add(1, Ordering::SeqCst); }), true),
        );
        let d = default_hits.clone();
        registry.register_default(Registration::new(
            Box::new(move |_: &u32| { d.fetch_add(1, Ordering::SeqCst); }),
            false,
        ));

        registry.dispatch(7, &0);
        registry.dispatch(7, &0);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(default_hits.load(Ordering::SeqCst), 1);
    }
}
