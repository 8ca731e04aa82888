//! Axum middleware for PREP support.
//!
//! The layer extracts PREP information from incoming requests, shares the
//! process-wide subscription index and event-id store, and attaches a
//! [`PrepSession`] to request extensions. Handlers extract the session and
//! drive the protocol through it:
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use prep_rs::PrepLayer;
//!
//! let app = Router::new()
//!     .route("/resource", get(handler))
//!     .layer(PrepLayer::new().middleware());
//! ```

use axum::http::{HeaderMap, HeaderValue, Method};
use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::Arc;

use super::config::PrepConfig;
use super::event_id::EventIdStore;
use super::session::PrepSession;
use super::subscriptions::SubscriptionIndex;
use crate::protocol::constants::headers;
use crate::protocol::fields;
use crate::types::fields::FieldItem;

/// Whether a user agent needs quirk-mode padding to defeat its buffering
/// heuristics.
#[must_use]
pub fn is_quirk_agent(user_agent: &str) -> bool {
    user_agent.to_lowercase().contains("firefox")
}

/// PREP state extracted from one HTTP request.
///
/// Parsed once by the middleware and carried by the session for the rest of
/// the request lifecycle.
#[derive(Clone, Debug)]
pub struct PrepState {
    /// Request path, the default notification path.
    pub path: String,

    /// Request method as an uppercase string.
    pub method: String,

    /// Parsed `Accept-Events` request header, when present and valid.
    pub accept_events: Option<Vec<FieldItem>>,

    /// Raw `Last-Event-ID` request header.
    pub last_event_id: Option<String>,

    /// Whether quirk-mode padding applies to this client.
    pub is_quirk_mode: bool,
}

impl PrepState {
    /// Parse PREP request state from method, path, and headers.
    #[must_use]
    pub fn from_parts(method: &Method, path: &str, request_headers: &HeaderMap) -> Self {
        let accept_events = request_headers
            .get(headers::ACCEPT_EVENTS)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| match fields::parse_list(v) {
                Ok(items) => Some(items),
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring malformed Accept-Events header");
                    None
                }
            });

        let last_event_id = request_headers
            .get(headers::LAST_EVENT_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let is_quirk_mode = request_headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(is_quirk_agent)
            .unwrap_or(false);

        PrepState {
            path: path.to_string(),
            method: method.as_str().to_string(),
            accept_events,
            last_event_id,
            is_quirk_mode,
        }
    }
}

/// Axum middleware layer for PREP support.
///
/// Clones share the same subscription index and event-id store, so one layer
/// instance serves a whole router.
#[derive(Clone)]
pub struct PrepLayer {
    config: PrepConfig,

    /// Shared index of active streaming connections.
    pub subscriptions: Arc<SubscriptionIndex>,

    /// Shared per-path last-event-id registry.
    pub event_ids: Arc<EventIdStore>,
}

impl PrepLayer {
    /// Create a layer configured from the `NOTIFICATIONS_*` environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PrepConfig::from_env())
    }

    /// Create a layer with explicit configuration.
    #[must_use]
    pub fn with_config(config: PrepConfig) -> Self {
        PrepLayer {
            config,
            subscriptions: Arc::new(SubscriptionIndex::new()),
            event_ids: Arc::new(EventIdStore::new()),
        }
    }

    /// The layer's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    /// Create the middleware function for use with `Router::layer()`.
    #[must_use]
    pub fn middleware(
        &self,
    ) -> impl tower::Layer<
        axum::routing::Route,
        Service = impl tower::Service<
            Request,
            Response = Response,
            Error = std::convert::Infallible,
            Future = impl Send + 'static,
        > + Clone
                      + Send
                      + Sync
                      + 'static,
    > + Clone {
        axum::middleware::from_fn_with_state(self.clone(), prep_middleware_handler)
    }

    async fn handle_middleware(&self, mut req: Request, next: Next) -> Response {
        let state = PrepState::from_parts(req.method(), req.uri().path(), req.headers());
        let session = Arc::new(PrepSession::new(
            state,
            self.config.clone(),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.event_ids),
        ));
        req.extensions_mut().insert(Arc::clone(&session));

        let mut response = next.run(req).await;

        // `configure` staged an offer; advertise it, preserving prior values.
        if let Some(offer) = session.accept_events_offer() {
            append_header_value(response.headers_mut(), &headers::ACCEPT_EVENTS, &offer);
        }

        response
    }
}

impl Default for PrepLayer {
    fn default() -> Self {
        Self::new()
    }
}

async fn prep_middleware_handler(
    axum::extract::State(layer): axum::extract::State<PrepLayer>,
    req: Request,
    next: Next,
) -> Response {
    layer.handle_middleware(req, next).await
}

fn append_header_value(
    response_headers: &mut HeaderMap,
    name: &axum::http::HeaderName,
    value: &str,
) {
    let merged = match response_headers.get(name).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {value}"),
        None => value.to_string(),
    };
    if let Ok(header_value) = HeaderValue::from_str(&merged) {
        response_headers.insert(name.clone(), header_value);
    } else {
        tracing::error!(header = %name, "dropping unrepresentable header value");
    }
}
