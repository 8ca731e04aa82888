//! The `Events` response header dictionary.

use crate::error::Result;
use crate::protocol::constants::PROTOCOL_NAME;
use crate::protocol::fields;
use crate::types::fields::{params_get, FieldParams, FieldValue};

/// Ordered dictionary serialized into the `Events` response header.
///
/// Always carries `protocol=prep` and a `status` integer. A successful
/// [`send`](crate::server::PrepSession::send) adds `expires`; failed
/// negotiation returns the dictionary to the caller instead, which serializes
/// it onto its own response.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsHeader {
    entries: FieldParams,
}

impl EventsHeader {
    /// Dictionary with `protocol=prep` and the given status.
    #[must_use]
    pub fn with_status(status: i64) -> Self {
        EventsHeader {
            entries: vec![
                ("protocol".into(), FieldValue::Token(PROTOCOL_NAME.into())),
                ("status".into(), FieldValue::Integer(status)),
            ],
        }
    }

    /// The protocol token, normally `prep`.
    #[must_use]
    pub fn protocol(&self) -> Option<String> {
        params_get(&self.entries, "protocol").and_then(FieldValue::as_text)
    }

    /// The PREP status code carried by the dictionary.
    #[must_use]
    pub fn status(&self) -> Option<i64> {
        params_get(&self.entries, "status").and_then(FieldValue::as_integer)
    }

    /// The `expires` timestamp string, present after a successful `send`.
    #[must_use]
    pub fn expires(&self) -> Option<String> {
        params_get(&self.entries, "expires").and_then(FieldValue::as_text)
    }

    /// Set an entry, replacing any existing one with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.entries.push((name, value));
    }

    /// Merge every entry of `params` into the dictionary.
    pub fn merge(&mut self, params: FieldParams) {
        for (name, value) in params {
            self.set(name, value);
        }
    }

    /// Entries in insertion order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &FieldParams {
        &self.entries
    }

    /// Serialize into an `Events` header value.
    pub fn to_header_value(&self) -> Result<String> {
        fields::serialize_dictionary(&self.entries)
    }

    /// Parse an `Events` header value back into a dictionary.
    pub fn parse(value: &str) -> Result<Self> {
        Ok(EventsHeader {
            entries: fields::parse_dictionary(value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_status_carries_protocol() {
        let events = EventsHeader::with_status(406);
        assert_eq!(events.protocol().as_deref(), Some("prep"));
        assert_eq!(events.status(), Some(406));
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut events = EventsHeader::with_status(200);
        events.set("status", FieldValue::Integer(412));
        assert_eq!(events.status(), Some(412));
        assert_eq!(
            events
                .entries()
                .iter()
                .filter(|(k, _)| k == "status")
                .count(),
            1
        );
    }

    #[test]
    fn test_round_trip() {
        let mut events = EventsHeader::with_status(200);
        events.set("expires", FieldValue::String("Sun, 02 Aug 2026 10:00:00 GMT".into()));
        let header = events.to_header_value().unwrap();
        let parsed = EventsHeader::parse(&header).unwrap();
        assert_eq!(parsed.protocol().as_deref(), Some("prep"));
        assert_eq!(parsed.status(), Some(200));
        assert_eq!(
            parsed.expires().as_deref(),
            Some("Sun, 02 Aug 2026 10:00:00 GMT")
        );
    }
}
