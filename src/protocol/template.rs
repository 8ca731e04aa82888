//! Notification body and part-header templates.
//!
//! Renders `message/rfc822` notification bodies and the explicit part-header
//! block used when a negotiated profile is not the implicit digest type.

use crate::protocol::constants::RFC822;
use crate::types::profile::EventProfile;

/// Fields of a `message/rfc822` notification body.
#[derive(Debug, Clone, Default)]
pub struct Rfc822Fields {
    pub method: String,
    pub date: String,
    pub event_id: Option<String>,
    pub etag: Option<String>,
    pub location: Option<String>,
    pub delta: Option<String>,
}

/// Render a notification body.
///
/// Optional lines are omitted entirely when absent. A blank line always
/// follows the headers; the delta body is appended iff one was supplied and
/// the verb is a write (PUT, PATCH, POST).
#[must_use]
pub fn rfc822(fields: &Rfc822Fields) -> String {
    let mut out = String::new();
    write_line(&mut out, "Method", &fields.method);
    write_line(&mut out, "Date", &fields.date);
    if let Some(event_id) = &fields.event_id {
        write_line(&mut out, "Event-ID", event_id);
    }
    if let Some(etag) = &fields.etag {
        write_line(&mut out, "ETag", etag);
    }
    if let Some(location) = &fields.location {
        write_line(&mut out, "Location", location);
    }
    out.push_str("\r\n");
    if let Some(delta) = &fields.delta {
        if fields.method.starts_with('P') {
            out.push_str(delta);
        }
    }
    out
}

fn write_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Render the explicit header block of a digest part.
///
/// Writes every `content-*` profile entry except `content-type:
/// message/rfc822`, which is implicit for digest parts. Names render in
/// Train-Case, values lowercased.
#[must_use]
pub fn part_header_block(profile: &EventProfile) -> String {
    let mut out = String::new();
    for (name, item) in profile.iter() {
        if !name.to_ascii_lowercase().starts_with("content-") {
            continue;
        }
        if name.eq_ignore_ascii_case("content-type") && item.value_eq(RFC822) {
            continue;
        }
        write_line(&mut out, &train_case(name), &item.value.to_ascii_lowercase());
    }
    out
}

/// `content-type` becomes `Content-Type`.
fn train_case(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fields::FieldItem;

    #[test]
    fn test_rfc822_minimal() {
        let body = rfc822(&Rfc822Fields {
            method: "PATCH".into(),
            date: "Sun, 02 Aug 2026 10:00:00 GMT".into(),
            ..Default::default()
        });
        assert_eq!(
            body,
            "Method: PATCH\r\nDate: Sun, 02 Aug 2026 10:00:00 GMT\r\n\r\n"
        );
    }

    #[test]
    fn test_rfc822_optional_lines() {
        let body = rfc822(&Rfc822Fields {
            method: "PUT".into(),
            date: "Sun, 02 Aug 2026 10:00:00 GMT".into(),
            event_id: Some("a1b2c3".into()),
            etag: Some("\"v2\"".into()),
            location: Some("/resource".into()),
            delta: None,
        });
        assert!(body.contains("Event-ID: a1b2c3\r\n"));
        assert!(body.contains("ETag: \"v2\"\r\n"));
        assert!(body.contains("Location: /resource\r\n"));
        assert!(body.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_rfc822_delta_only_for_writes() {
        let with_delta = |method: &str| {
            rfc822(&Rfc822Fields {
                method: method.into(),
                date: "now".into(),
                delta: Some("@@ -1 +1 @@".into()),
                ..Default::default()
            })
        };
        assert!(with_delta("PATCH").ends_with("\r\n\r\n@@ -1 +1 @@"));
        assert!(with_delta("POST").ends_with("\r\n\r\n@@ -1 +1 @@"));
        assert!(with_delta("DELETE").ends_with("\r\n\r\n"));
        assert!(with_delta("GET").ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_part_header_block_skips_implicit_rfc822() {
        let mut profile = EventProfile::new();
        profile.insert("content-type", FieldItem::new("message/rfc822"));
        assert_eq!(part_header_block(&profile), "");
    }

    #[test]
    fn test_part_header_block_renders_train_case() {
        let mut profile = EventProfile::new();
        profile.insert("content-type", FieldItem::new("Text/Plain"));
        assert_eq!(part_header_block(&profile), "Content-Type: text/plain\r\n");
    }

    #[test]
    fn test_train_case() {
        assert_eq!(train_case("content-type"), "Content-Type");
        assert_eq!(train_case("content-transfer-encoding"), "Content-Transfer-Encoding");
    }
}
