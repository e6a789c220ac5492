//! # Request Handle
//!
//! The correlation-value object every L4 service hands back to a caller
//! (§3: "holds its RequestId and a cancel-thunk that unregisters its
//! handler(s)"). Dropping it or calling [`Request::cancel`] explicitly are
//! equivalent and idempotent — both run the thunk at most once, which is
//! what the owning service uses to issue a stop-request to the host (for a
//! periodic subscription) and unregister the handler slot (§5
//! Cancellation).

use crate::ids::RequestId;

/// A live request's correlation id plus the means to tear it down.
///
/// `cancel_thunk` is `None` once cancellation has run, so a second `cancel`
/// call (or a drop after an explicit `cancel`) is a no-op.
pub struct Request {
    request_id: RequestId,
    cancel_thunk: Option<Box<dyn FnOnce() + Send>>,
}

impl Request {
    /// Wraps a request id with the thunk that tears it down.
    pub fn new(request_id: RequestId, cancel_thunk: impl FnOnce() + Send + 'static) -> Self {
        Self {
            request_id,
            cancel_thunk: Some(Box::new(cancel_thunk)),
        }
    }

    /// The id this request correlates responses by.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Runs the cancel thunk now, if it hasn't already run. Safe to call
    /// more than once.
    pub fn cancel(&mut self) {
        if let Some(thunk) = self.cancel_thunk.take() {
            thunk();
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn dropping_runs_the_cancel_thunk_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        {
            let _req = Request::new(RequestId(1), move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_cancel_then_drop_only_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let mut req = Request::new(RequestId(1), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        req.cancel();
        drop(req);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_id_is_preserved() {
        let req = Request::new(RequestId(42), || {});
        assert_eq!(req.request_id(), RequestId(42));
    }
}
