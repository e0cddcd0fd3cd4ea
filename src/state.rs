// MIT License - Copyright (c) 2026 Peter Wright
// State table and listener fan-out

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::error::AvrError;

/// Error a listener may return; anything that converts with `?` or `.into()`.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of listener callbacks.
pub type ListenerResult = std::result::Result<(), ListenerError>;

type StateFn = dyn Fn(&str, &str) -> ListenerResult + Send + Sync;
type RawFn = dyn Fn(&str) -> ListenerResult + Send + Sync;

/// Handle returned when a listener is registered; used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Last known value per state key, plus the observers of both kinds.
///
/// Values are overwritten unconditionally and never cleared, so a reader
/// sees the last value the receiver reported even while disconnected.
pub struct StateStore {
    values: RwLock<HashMap<String, String>>,
    state_listeners: RwLock<Vec<(ListenerId, Arc<StateFn>)>>,
    raw_listeners: RwLock<Vec<(ListenerId, Arc<RawFn>)>>,
    next_id: AtomicU64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            state_listeners: RwLock::new(Vec::new()),
            raw_listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Value stored under `key`, or an empty string.
    pub fn get(&self, key: &str) -> String {
        read(&self.values).get(key).cloned().unwrap_or_default()
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> HashMap<String, String> {
        read(&self.values).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.values).is_empty()
    }

    /// Store without notifying anyone.
    pub fn set_silent(&self, key: &str, value: &str) {
        write(&self.values).insert(key.to_string(), value.to_string());
    }

    /// Store, then call every state listener in registration order.
    ///
    /// Returns one error per listener that failed; the others still ran.
    pub fn set(&self, key: &str, value: &str) -> Vec<AvrError> {
        self.set_silent(key, value);
        debug!("STATE SET: {} = {}", key, value);

        // Snapshot so a listener can register or remove listeners.
        let listeners = read(&self.state_listeners).clone();
        listeners
            .iter()
            .filter_map(|(id, listener)| isolate(*id, || listener(key, value)))
            .collect()
    }

    /// Offer a raw token to every raw listener in registration order.
    pub fn dispatch_raw(&self, token: &str) -> Vec<AvrError> {
        let listeners = read(&self.raw_listeners).clone();
        listeners
            .iter()
            .filter_map(|(id, listener)| isolate(*id, || listener(token)))
            .collect()
    }

    pub fn add_state_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, &str) -> ListenerResult + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        write(&self.state_listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn add_raw_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) -> ListenerResult + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        write(&self.raw_listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener of either kind. Returns false if it was not found.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = write(&self.state_listeners);
        let before = state.len();
        state.retain(|(lid, _)| *lid != id);
        if state.len() != before {
            return true;
        }
        drop(state);

        let mut raw = write(&self.raw_listeners);
        let before = raw.len();
        raw.retain(|(lid, _)| *lid != id);
        raw.len() != before
    }

    pub fn listener_count(&self) -> usize {
        read(&self.state_listeners).len() + read(&self.raw_listeners).len()
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Run one listener, turning an error return or a panic into `ListenerFailed`.
fn isolate(id: ListenerId, call: impl FnOnce() -> ListenerResult) -> Option<AvrError> {
    let reason = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return None,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => {
            if let Some(msg) = panic.downcast_ref::<&str>() {
                format!("panicked: {msg}")
            } else if let Some(msg) = panic.downcast_ref::<String>() {
                format!("panicked: {msg}")
            } else {
                "panicked".to_string()
            }
        }
    };
    warn!("Listener {} failed: {}", id.0, reason);
    Some(AvrError::ListenerFailed { id: id.0, reason })
}

// A panicking listener never runs while a lock is held, but recover anyway.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_get_unset_key_is_empty() {
        let store = StateStore::new();
        assert_eq!(store.get("zone2_vol"), "");
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let store = StateStore::new();
        store.set("zone1_vol", "40");
        store.set("zone1_vol", "45");
        assert_eq!(store.get("zone1_vol"), "45");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_listeners_called_in_order_without_dedup() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        store.add_state_listener(move |k, v| {
            first.lock().unwrap().push(format!("a:{k}={v}"));
            Ok(())
        });
        let second = seen.clone();
        store.add_state_listener(move |k, v| {
            second.lock().unwrap().push(format!("b:{k}={v}"));
            Ok(())
        });

        store.set("power", "ON");
        store.set("power", "ON");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:power=ON", "b:power=ON", "a:power=ON", "b:power=ON"]
        );
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let store = StateStore::new();
        let received = Arc::new(Mutex::new(None));

        let bad = store.add_state_listener(|_, _| Err("listener exploded".into()));
        let sink = received.clone();
        store.add_state_listener(move |k, v| {
            *sink.lock().unwrap() = Some((k.to_string(), v.to_string()));
            Ok(())
        });

        let failures = store.set("zone2", "ON");

        assert_eq!(
            *received.lock().unwrap(),
            Some(("zone2".to_string(), "ON".to_string()))
        );
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            AvrError::ListenerFailed { id, reason } => {
                assert_eq!(*id, bad.as_u64());
                assert_eq!(reason, "listener exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let store = StateStore::new();
        let count = Arc::new(AtomicU64::new(0));

        store.add_raw_listener(|_| panic!("raw listener panic"));
        let counter = count.clone();
        store.add_raw_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let failures = store.dispatch_raw("PWON");
        let failures_again = store.dispatch_raw("PWON");

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures_again.len(), 1);
        assert!(failures[0].to_string().contains("raw listener panic"));
    }

    #[test]
    fn test_remove_listener() {
        let store = StateStore::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let id = store.add_state_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let raw = store.add_raw_listener(|_| Ok(()));
        assert_eq!(store.listener_count(), 2);

        store.set("power", "ON");
        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        store.set("power", "STANDBY");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(store.remove_listener(raw));
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_register_listener() {
        let store = Arc::new(StateStore::new());
        let inner = store.clone();
        store.add_state_listener(move |_, _| {
            inner.add_state_listener(|_, _| Ok(()));
            Ok(())
        });
        assert!(store.set("power", "ON").is_empty());
        assert_eq!(store.listener_count(), 2);
    }

    #[test]
    fn test_set_silent_skips_listeners() {
        let store = StateStore::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        store.add_state_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store.set_silent("raw_command", "PWON");
        assert_eq!(store.get("raw_command"), "PWON");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
