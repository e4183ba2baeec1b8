// Durable per-event-type subscriber lists.
//
// The same structure backs two things: the subscriptions a location keeps
// across reconnects, and the listener set attached to one live socket.
// Insertion order is kept so replays are deterministic.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::models::AlarmMessage;

/// Callback invoked for every inbound event of the type it was registered for.
pub type AlarmCallback = Arc<dyn Fn(&AlarmMessage) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Subscriptions {
    by_event: IndexMap<String, Vec<AlarmCallback>>,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_event.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

impl Subscriptions {
    /// Register `callback` for `event`. Returns `false` if that exact
    /// callback was already registered for it.
    pub(crate) fn add(&mut self, event: &str, callback: &AlarmCallback) -> bool {
        let list = self.by_event.entry(event.to_owned()).or_default();
        if list.iter().any(|existing| same_callback(existing, callback)) {
            return false;
        }
        list.push(Arc::clone(callback));
        true
    }

    pub(crate) fn get(&self, event: &str) -> Vec<AlarmCallback> {
        self.by_event.get(event).cloned().unwrap_or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &[AlarmCallback])> {
        self.by_event.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    /// Rebuild a fresh listener set from durable subscriptions.
    pub(crate) fn replay(&self) -> Self {
        let mut attached = Self::default();
        for (event, callbacks) in self.iter() {
            debug!(event, count = callbacks.len(), "re-registering callbacks for message type");
            for callback in callbacks {
                attached.add(event, callback);
            }
        }
        attached
    }
}

/// Identity comparison on the closure allocation, ignoring vtables.
fn same_callback(a: &AlarmCallback, b: &AlarmCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Invoke every callback; a panicking subscriber is logged and skipped.
pub(crate) fn dispatch(callbacks: &[AlarmCallback], message: &AlarmMessage) {
    for callback in callbacks {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(message))) {
            error!(
                location = %message.location_id,
                event = %message.event,
                panic = panic_message(panic.as_ref()),
                "alarm callback panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
