//! Typed in-process events
//!
//! An [`Event<T>`] is a named channel with a fixed, ordered subscriber list.
//! Subscribers are attached while the dispatcher is being built; `build()`
//! seals the list. Each `emit` calls every subscriber in registration order and
//! spawns the returned future as its own task, so a slow subscriber never holds
//! back the next emission.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::{spawn_handler, HandlerFuture};

pub(crate) type EventHandler<T> = Arc<dyn Fn(T) -> HandlerFuture + Send + Sync>;

struct Subscription<T> {
    label: Arc<str>,
    handler: EventHandler<T>,
}

struct EventInner<T> {
    name: String,
    pending: Mutex<Vec<Subscription<T>>>,
    sealed: OnceLock<Vec<Subscription<T>>>,
}

/// Typed publish/subscribe channel. Clones share the same subscriber list.
pub struct Event<T> {
    inner: Arc<EventInner<T>>,
}

/// Create a new, distinct event channel
pub fn create_event<T>(name: impl Into<String>) -> Event<T> {
    Event::new(name)
}

impl<T> Event<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                name: name.into(),
                pending: Mutex::new(Vec::new()),
                sealed: OnceLock::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once the dispatcher has started and the subscriber list is fixed
    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.get().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.sealed.get() {
            Some(subs) => subs.len(),
            None => self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    /// Attach a subscriber. Refused once the event is sealed.
    pub(crate) fn subscribe(&self, label: Arc<str>, handler: EventHandler<T>) -> bool {
        if self.is_sealed() {
            tracing::error!(
                event = %self.inner.name,
                handler = %label,
                "subscription refused: dispatcher already running"
            );
            return false;
        }
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { label, handler });
        true
    }

    /// Freeze the subscriber list. Later calls are no-ops.
    pub(crate) fn seal(&self) {
        let subs = std::mem::take(
            &mut *self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let _ = self.inner.sealed.set(subs);
    }
}

impl<T: Clone + Send + 'static> Event<T> {
    /// Invoke every subscriber with `value`, in registration order.
    ///
    /// Returns the number of handler executions started. Emissions before the
    /// dispatcher is built reach nobody.
    pub fn emit(&self, value: T) -> usize {
        let Some(subs) = self.inner.sealed.get() else {
            tracing::debug!(event = %self.inner.name, "emit before dispatcher start dropped");
            return 0;
        };

        let mut started = 0;
        for sub in subs {
            let handler = Arc::clone(&sub.handler);
            let arg = value.clone();
            match catch_unwind(AssertUnwindSafe(move || handler(arg))) {
                Ok(fut) => {
                    spawn_handler(Arc::clone(&sub.label), fut);
                    started += 1;
                }
                Err(_) => {
                    tracing::error!(
                        event = %self.inner.name,
                        handler = %sub.label,
                        "handler panicked on invocation"
                    );
                }
            }
        }
        started
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("subscribers", &self.subscriber_count())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
