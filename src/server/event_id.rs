//! Per-path last-event-id store.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;

use crate::protocol::constants::EVENT_ID_LEN;

/// Process-wide registry of the last event id assigned to each path.
///
/// Written by mutation handlers via
/// [`set_event_id`](crate::server::PrepSession::set_event_id); read by `send`
/// to honor `Last-Event-ID` skip logic. Lifetime is the process; there is no
/// persistence.
#[derive(Debug, Default)]
pub struct EventIdStore {
    ids: Mutex<HashMap<String, String>>,
}

impl EventIdStore {
    #[must_use]
    pub fn new() -> Self {
        EventIdStore {
            ids: Mutex::new(HashMap::new()),
        }
    }

    /// Assign a fresh id to `path` and return it.
    pub fn set(&self, path: &str) -> String {
        let id = generate_event_id();
        self.ids.lock().insert(path.to_string(), id.clone());
        id
    }

    /// The last id assigned to `path`, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.ids.lock().get(path).cloned()
    }
}

/// Random 6-character alphanumeric identifier.
fn generate_event_id() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(EVENT_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_stored_id() {
        let store = EventIdStore::new();
        let id = store.set("/doc");
        assert_eq!(store.get("/doc"), Some(id));
    }

    #[test]
    fn test_get_unknown_path() {
        let store = EventIdStore::new();
        assert_eq!(store.get("/missing"), None);
    }

    #[test]
    fn test_ids_are_six_alphanumeric_chars() {
        let store = EventIdStore::new();
        let id = store.set("/doc");
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_set_replaces_previous_id() {
        let store = EventIdStore::new();
        let first = store.set("/doc");
        let second = store.set("/doc");
        assert_eq!(store.get("/doc"), Some(second.clone()));
        // 62^6 id space makes a collision here effectively impossible.
        assert_ne!(first, second);
    }
}
