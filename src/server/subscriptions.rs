//! Subscription engine: per-path, per-profile multicast of notifications.
//!
//! The index maps `path` to buckets keyed by the canonical form of the
//! negotiated [`EventProfile`]. Each bucket owns one [`Emitter`] holding the
//! listener sinks of every connection subscribed with a structurally equal
//! profile. Buckets with no listeners and paths with no buckets are removed
//! eagerly, so the index never retains empty entries.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::profile::EventProfile;

/// Sink invoked with a rendered notification and the terminal flag.
pub type NotificationSink = Box<dyn Fn(&str, bool) + Send + Sync>;

/// Sink invoked when the subscription's stream must close.
pub type EndSink = Box<dyn Fn() + Send + Sync>;

/// Per-profile notification generator used by [`SubscriptionIndex::notify`].
/// Returning `None` skips delivery for that profile.
pub type GenerateNotification = Arc<dyn Fn(&EventProfile) -> Option<String> + Send + Sync>;

/// A connection's registration request: where it lives in the index and the
/// two write-only sinks into its response stream.
pub struct Subscription {
    pub path: String,
    /// Must be the cleaned profile; see [`EventProfile::cleanup`].
    pub profile: EventProfile,
    pub write_notification: NotificationSink,
    pub write_end: EndSink,
}

#[derive(Clone)]
struct Listener {
    id: u64,
    notify: Arc<dyn Fn(&str, bool) + Send + Sync>,
    end: Arc<dyn Fn() + Send + Sync>,
}

/// Multicast object for one `(path, profile)` bucket. Listeners are invoked
/// in registration order.
#[derive(Default)]
struct Emitter {
    listeners: Vec<Listener>,
}

struct Bucket {
    /// First-inserted profile instance, retained as the canonical one.
    profile: EventProfile,
    emitter: Emitter,
}

/// Process-wide index of active subscriptions.
#[derive(Default)]
pub struct SubscriptionIndex {
    paths: Mutex<HashMap<String, HashMap<String, Bucket>>>,
    next_listener: AtomicU64,
}

impl SubscriptionIndex {
    #[must_use]
    pub fn new() -> Self {
        SubscriptionIndex::default()
    }

    /// Register a connection and return its unsubscribe handle.
    ///
    /// Profiles compare structurally: a later subscriber with an equal
    /// profile joins the existing bucket and shares its emitter.
    pub fn subscribe(self: &Arc<Self>, sub: Subscription) -> SubscriptionHandle {
        let key = sub.profile.canonical_key();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let listener = Listener {
            id,
            notify: Arc::from(sub.write_notification),
            end: Arc::from(sub.write_end),
        };

        let mut paths = self.paths.lock();
        let inner = paths.entry(sub.path.clone()).or_default();
        let bucket = inner.entry(key.clone()).or_insert_with(|| Bucket {
            profile: sub.profile.clone(),
            emitter: Emitter::default(),
        });
        bucket.emitter.listeners.push(listener);
        tracing::debug!(path = %sub.path, profile = %key, "subscription added");

        SubscriptionHandle {
            index: Arc::clone(self),
            path: sub.path,
            key,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Fan a notification out to every subscriber under `path`.
    ///
    /// `generate` runs once per profile bucket; a `None` return skips that
    /// bucket. When `last_event` is set, every listener under the path also
    /// receives end after the notifications.
    ///
    /// An unknown path is not an error. Fan-out iterates over a snapshot of
    /// the listener set taken under the lock, so a listener unsubscribing
    /// itself mid-delivery cannot corrupt iteration.
    pub fn notify(
        &self,
        path: &str,
        generate: &dyn Fn(&EventProfile) -> Option<String>,
        last_event: bool,
    ) {
        let snapshot: Vec<(EventProfile, Vec<Listener>)> = {
            let paths = self.paths.lock();
            match paths.get(path) {
                None => return,
                Some(inner) => inner
                    .values()
                    .map(|bucket| (bucket.profile.clone(), bucket.emitter.listeners.clone()))
                    .collect(),
            }
        };

        for (profile, listeners) in &snapshot {
            match generate(profile) {
                Some(notification) => {
                    tracing::debug!(
                        path,
                        listeners = listeners.len(),
                        last_event,
                        "delivering notification"
                    );
                    for listener in listeners {
                        (listener.notify)(&notification, last_event);
                    }
                }
                None => {
                    tracing::trace!(path, "generator skipped profile");
                }
            }
        }

        if last_event {
            for (_, listeners) in &snapshot {
                for listener in listeners {
                    (listener.end)();
                }
            }
        }
    }

    /// Number of active listeners under a path, across all profiles.
    #[must_use]
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.paths
            .lock()
            .get(path)
            .map(|inner| inner.values().map(|b| b.emitter.listeners.len()).sum())
            .unwrap_or(0)
    }

    /// Number of profile buckets under a path.
    #[must_use]
    pub fn profile_count(&self, path: &str) -> usize {
        self.paths.lock().get(path).map(HashMap::len).unwrap_or(0)
    }

    /// Whether no subscriptions exist at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    fn remove_listener(&self, path: &str, key: &str, id: u64) {
        let mut paths = self.paths.lock();
        let Some(inner) = paths.get_mut(path) else {
            return;
        };
        if let Some(bucket) = inner.get_mut(key) {
            bucket.emitter.listeners.retain(|l| l.id != id);
            if bucket.emitter.listeners.is_empty() {
                inner.remove(key);
            }
        }
        if inner.is_empty() {
            paths.remove(path);
        }
        tracing::debug!(path, profile = %key, "subscription removed");
    }
}

/// Idempotent unsubscribe handle. Unsubscribes on drop if not done
/// explicitly.
pub struct SubscriptionHandle {
    index: Arc<SubscriptionIndex>,
    path: String,
    key: String,
    id: u64,
    active: AtomicBool,
}

impl SubscriptionHandle {
    /// Detach this subscription's sinks. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.index.remove_listener(&self.path, &self.key, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fields::FieldItem;
    use parking_lot::Mutex as PlMutex;

    fn profile(media_type: &str) -> EventProfile {
        let mut p = EventProfile::new();
        p.insert("content-type", FieldItem::new(media_type));
        p.cleanup()
    }

    fn recording_sub(
        path: &str,
        media_type: &str,
        log: Arc<PlMutex<Vec<String>>>,
        ends: Arc<PlMutex<usize>>,
    ) -> Subscription {
        Subscription {
            path: path.into(),
            profile: profile(media_type),
            write_notification: Box::new(move |n, _last| log.lock().push(n.to_string())),
            write_end: Box::new(move || *ends.lock() += 1),
        }
    }

    #[test]
    fn test_equal_profiles_share_one_bucket() {
        let index = Arc::new(SubscriptionIndex::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        let _a = index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
        let _b = index.subscribe(recording_sub("/r", "Message/RFC822", log.clone(), ends.clone()));
        assert_eq!(index.profile_count("/r"), 1);
        assert_eq!(index.subscriber_count("/r"), 2);
    }

    #[test]
    fn test_unsubscribe_removes_empty_entries() {
        let index = Arc::new(SubscriptionIndex::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        let a = index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
        let b = index.subscribe(recording_sub("/r", "text/plain", log.clone(), ends.clone()));
        a.unsubscribe();
        assert_eq!(index.profile_count("/r"), 1);
        b.unsubscribe();
        assert!(index.is_empty());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let index = Arc::new(SubscriptionIndex::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        let a = index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
        let _b = index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(index.subscriber_count("/r"), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let index = Arc::new(SubscriptionIndex::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        {
            let _a =
                index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
            assert_eq!(index.subscriber_count("/r"), 1);
        }
        assert!(index.is_empty());
    }

    #[test]
    fn test_notify_unknown_path_is_silent() {
        let index = SubscriptionIndex::new();
        index.notify("/nothing", &|_| Some("n".into()), false);
    }

    #[test]
    fn test_notify_delivers_per_profile() {
        let index = Arc::new(SubscriptionIndex::new());
        let rfc_log = Arc::new(PlMutex::new(Vec::new()));
        let plain_log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        let _a =
            index.subscribe(recording_sub("/r", "message/rfc822", rfc_log.clone(), ends.clone()));
        let _b = index.subscribe(recording_sub("/r", "text/plain", plain_log.clone(), ends.clone()));

        index.notify(
            "/r",
            &|p| {
                let ct = p.content_type().unwrap().value.clone();
                (ct == "message/rfc822").then(|| format!("for {ct}"))
            },
            false,
        );

        assert_eq!(rfc_log.lock().as_slice(), ["for message/rfc822"]);
        assert!(plain_log.lock().is_empty());
    }

    #[test]
    fn test_last_event_ends_every_listener() {
        let index = Arc::new(SubscriptionIndex::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let ends = Arc::new(PlMutex::new(0));
        let _a = index.subscribe(recording_sub("/r", "message/rfc822", log.clone(), ends.clone()));
        let _b = index.subscribe(recording_sub("/r", "text/plain", log.clone(), ends.clone()));

        // The generator only serves one profile; end still reaches both.
        index.notify(
            "/r",
            &|p| (p.content_type().unwrap().value == "message/rfc822").then(|| "bye".to_string()),
            true,
        );
        assert_eq!(*ends.lock(), 2);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_listener_unsubscribing_mid_delivery() {
        let index = Arc::new(SubscriptionIndex::new());
        let handle_slot: Arc<PlMutex<Option<SubscriptionHandle>>> = Arc::new(PlMutex::new(None));
        let seen = Arc::new(PlMutex::new(0usize));

        let slot = handle_slot.clone();
        let seen_in = seen.clone();
        let handle = index.subscribe(Subscription {
            path: "/r".into(),
            profile: profile("message/rfc822"),
            write_notification: Box::new(move |_n, _last| {
                *seen_in.lock() += 1;
                if let Some(h) = slot.lock().take() {
                    h.unsubscribe();
                }
            }),
            write_end: Box::new(|| {}),
        });
        *handle_slot.lock() = Some(handle);

        index.notify("/r", &|_| Some("first".into()), false);
        index.notify("/r", &|_| Some("second".into()), false);

        assert_eq!(*seen.lock(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_delivery_order_matches_registration() {
        let index = Arc::new(SubscriptionIndex::new());
        let order = Arc::new(PlMutex::new(Vec::new()));
        let mk = |tag: &'static str| {
            let order = order.clone();
            Subscription {
                path: "/r".into(),
                profile: profile("message/rfc822"),
                write_notification: Box::new(move |_n, _l| order.lock().push(tag)),
                write_end: Box::new(|| {}),
            }
        };
        let _a = index.subscribe(mk("first"));
        let _b = index.subscribe(mk("second"));
        index.notify("/r", &|_| Some("n".into()), false);
        assert_eq!(order.lock().as_slice(), ["first", "second"]);
    }
}
