use super::codec::Envelope;
use log::*;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

/// A subscriber callback. Identity is the `Arc` allocation itself: keep a
/// clone of the `Arc` you passed to `subscribe` in order to `unsubscribe`
/// that specific registration later.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync + 'static>;

/// Maps message kinds to the handlers interested in them.
///
/// Registration order is preserved per kind and is the fan-out order.
/// Repeated registration of the same handler is not deduplicated; each
/// call appends an independent entry and doubles dispatch accordingly.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<String, Vec<Handler>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `kind`, appended after any existing
    /// entries for that kind.
    pub fn subscribe(&self, kind: &str, handler: Handler) {
        let mut entries = self.lock();
        entries.entry(kind.to_string()).or_default().push(handler);
    }

    /// Removes the first entry under `kind` that is the same allocation as
    /// `handler`. No-op when no such entry exists; entries under other
    /// kinds are never affected.
    pub fn unsubscribe(&self, kind: &str, handler: &Handler) {
        let mut entries = self.lock();
        if let Some(handlers) = entries.get_mut(kind) {
            if let Some(pos) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
                handlers.remove(pos);
            }
        }
    }

    /// Invokes every handler registered under `envelope.kind`, in
    /// registration order, passing the full envelope.
    ///
    /// The handler list is snapshotted before invocation, so concurrent
    /// subscribe/unsubscribe calls never corrupt an in-flight fan-out. A
    /// panicking handler is logged and the remaining handlers still run.
    pub fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Handler> = match self.lock().get(&envelope.kind) {
            Some(handlers) => handlers.clone(),
            None => return,
        };
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                error!(
                    "Subscriber for '{}' panicked; continuing fan-out",
                    envelope.kind
                );
            }
        }
    }

    /// Drops every registered handler.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of handlers currently registered under `kind`.
    pub fn handler_count(&self, kind: &str) -> usize {
        self.lock().get(kind).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        // The lock is never held across a handler call, so a poisoned
        // mutex can only come from a panic inside std collection code.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
