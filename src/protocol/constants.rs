//! Protocol constants for PREP.

/// Protocol token carried in `Accept-Events` and `Events` values.
pub const PROTOCOL_NAME: &str = "prep";

/// Media type of default notification bodies, implicit for digest parts.
pub const RFC822: &str = "message/rfc822";

/// Response statuses eligible for event streaming.
pub const ELIGIBLE_STATUSES: [u16; 4] = [200, 204, 206, 226];

/// Default streaming duration in seconds.
pub const DEFAULT_DURATION_SECS: u64 = 3600;

/// Cap on client-requested streaming duration in seconds.
pub const MAX_DURATION_SECS: u64 = 7200;

/// Length of generated multipart boundary strings.
pub const BOUNDARY_LEN: usize = 20;

/// Length of generated event ids.
pub const EVENT_ID_LEN: usize = 6;

/// CRLF lines appended after each notification in quirk mode.
pub const QUIRK_PAD_LINES: usize = 240;

/// Header names used by the middleware.
pub mod headers {
    use axum::http::HeaderName;

    pub const ACCEPT_EVENTS: HeaderName = HeaderName::from_static("accept-events");
    pub const EVENTS: HeaderName = HeaderName::from_static("events");
    pub const EVENT_ID: HeaderName = HeaderName::from_static("event-id");
    pub const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");
    pub const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
}

/// Environment variables consulted by [`PrepConfig`](crate::server::PrepConfig).
pub mod env {
    /// Comma-separated default content types offered by `configure`.
    pub const CONTENT_TYPES: &str = "NOTIFICATIONS_CONTENT_TYPES";
    /// Default streaming duration in seconds.
    pub const DURATION: &str = "NOTIFICATIONS_DURATION";
    /// Cap on client-requested duration in seconds.
    pub const DURATION_MAX: &str = "NOTIFICATIONS_DURATION_MAX";
}
