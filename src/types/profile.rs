//! Negotiated event profiles, the subscription key.

use std::collections::BTreeMap;
use std::fmt;

use super::fields::{FieldItem, FieldValue};

/// The canonical, post-negotiation content specification that keys
/// subscriptions.
///
/// The only entry defined today is `content-type`, holding the negotiated
/// media type item. Two profiles are equal iff their mappings are
/// structurally deep-equal; that equality defines subscription bucketing.
///
/// Only the form produced by [`EventProfile::cleanup`] may be used as a
/// subscription key: cleanup strips the negotiator's extra parameters and
/// canonicalizes names and ordering so structural equality is well defined.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventProfile {
    entries: BTreeMap<String, FieldItem>,
}

impl EventProfile {
    /// Empty profile.
    #[must_use]
    pub fn new() -> Self {
        EventProfile {
            entries: BTreeMap::new(),
        }
    }

    /// Insert an entry, replacing any previous value for the name.
    pub fn insert(&mut self, name: impl Into<String>, item: FieldItem) {
        self.entries.insert(name.into(), item);
    }

    /// Look up an entry by name.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldItem> {
        self.entries.get(name)
    }

    /// Mutable entry lookup. Application `negotiate_events` hooks use this to
    /// replace an item's parameters before the profile is cleaned.
    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldItem> {
        self.entries.get_mut(name)
    }

    /// The negotiated `content-type` item.
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&FieldItem> {
        self.entries.get("content-type")
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldItem)> {
        self.entries.iter()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the subscription-key-safe form of this profile.
    ///
    /// Strips `extra` from every item, lowercases bare values and parameter
    /// names, and sorts parameters by name. Idempotent:
    /// `cleanup(cleanup(p)) == cleanup(p)`.
    #[must_use]
    pub fn cleanup(&self) -> EventProfile {
        let entries = self
            .entries
            .iter()
            .map(|(name, item)| {
                let mut params: Vec<(String, FieldValue)> = item
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect();
                params.sort_by(|a, b| a.0.cmp(&b.0));
                (
                    name.to_ascii_lowercase(),
                    FieldItem {
                        value: item.value.to_ascii_lowercase(),
                        params,
                        extra: Vec::new(),
                    },
                )
            })
            .collect();
        EventProfile { entries }
    }

    /// Deterministic string form of a cleaned profile, used as the real key
    /// in the subscription index. The canonical [`EventProfile`] is kept
    /// alongside the key for rendering and for the `generate_notification`
    /// callback.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        for (name, item) in &self.entries {
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(name);
            out.push('=');
            render_item(&mut out, item);
        }
        out
    }
}

fn render_item(out: &mut String, item: &FieldItem) {
    out.push_str(&item.value);
    for (k, v) in &item.params {
        out.push(';');
        out.push_str(k);
        out.push('=');
        render_value(out, v);
    }
}

fn render_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Inner(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                render_item(out, item);
            }
            out.push(')');
        }
        other => {
            if let Some(text) = other.as_text() {
                out.push_str(&text);
            }
        }
    }
}

impl fmt::Display for EventProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(item: FieldItem) -> EventProfile {
        let mut p = EventProfile::new();
        p.insert("content-type", item);
        p
    }

    #[test]
    fn test_cleanup_strips_extra() {
        let mut item = FieldItem::new("message/rfc822");
        item.extra
            .push(("delta".into(), FieldValue::String("text/plain".into())));
        let cleaned = profile_with(item).cleanup();
        assert!(cleaned.content_type().unwrap().extra.is_empty());
    }

    #[test]
    fn test_cleanup_lowercases_and_sorts() {
        let item = FieldItem::new("Message/RFC822")
            .with_param("Zeta", FieldValue::Integer(1))
            .with_param("Alpha", FieldValue::Integer(2));
        let cleaned = profile_with(item).cleanup();
        let ct = cleaned.content_type().unwrap();
        assert_eq!(ct.value, "message/rfc822");
        assert_eq!(ct.params[0].0, "alpha");
        assert_eq!(ct.params[1].0, "zeta");
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let item = FieldItem::new("Message/RFC822")
            .with_param("B", FieldValue::Integer(1))
            .with_param("a", FieldValue::Integer(2));
        let once = profile_with(item).cleanup();
        assert_eq!(once.cleanup(), once);
    }

    #[test]
    fn test_structural_equality_buckets_profiles() {
        let a = profile_with(
            FieldItem::new("Message/Rfc822").with_param("Delta", FieldValue::String("text/plain".into())),
        )
        .cleanup();
        let b = profile_with(
            FieldItem::new("message/rfc822").with_param("delta", FieldValue::String("text/plain".into())),
        )
        .cleanup();
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_canonical_key_renders_params() {
        let p = profile_with(
            FieldItem::new("message/rfc822").with_param("delta", FieldValue::String("text/plain".into())),
        );
        assert_eq!(p.canonical_key(), "content-type=message/rfc822;delta=text/plain");
    }
}
