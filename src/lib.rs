//! # PREP: Per-Resource Events over HTTP
//!
//! This crate implements the server side of the Per-Resource Events Protocol
//! (PREP), an HTTP extension that lets a client issuing a `GET` receive the
//! resource representation *and* a live stream of subsequent modification
//! notifications for the same resource, multiplexed inside a single response
//! body using nested multipart encapsulation.
//!
//! ## Overview
//!
//! Three pieces cooperate per request:
//!
//! 1. **Negotiation** - the client's structured `Accept-Events` parameters
//!    are matched against the handler's declared offer, including nested
//!    parameter lists such as `delta` format alternatives, producing the
//!    canonical [`EventProfile`] that keys the subscription.
//! 2. **Subscriptions** - active streaming connections are indexed by
//!    `(path, profile)`; a mutation anywhere in the process fans out to
//!    exactly the connections whose profile matches.
//! 3. **Streaming** - the response body is a `multipart/mixed` envelope:
//!    first the representation part, then an open-ended `multipart/digest`
//!    part into which notifications are written until the connection closes,
//!    the negotiated duration elapses, or a terminal event arrives.
//!
//! ## Server Usage
//!
//! ```ignore
//! use axum::{routing::get, Extension, Router};
//! use axum::response::{IntoResponse, Response};
//! use prep_rs::{PrepLayer, PrepSession, SendArgs, SendOutcome, TriggerArgs};
//! use std::sync::Arc;
//!
//! async fn get_resource(Extension(prep): Extension<Arc<PrepSession>>) -> Response {
//!     if let Err(_events) = prep.configure(None) {
//!         return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "").into_response();
//!     }
//!     match prep.send(SendArgs {
//!         headers: vec![("Content-Type".into(), "text/plain".into())],
//!         body: Some("The quick brown fox jumps over the lazy dog.".into()),
//!         ..Default::default()
//!     }) {
//!         SendOutcome::Stream(response) => response,
//!         SendOutcome::Declined(_events) => "plain response".into_response(),
//!     }
//! }
//!
//! async fn patch_resource(Extension(prep): Extension<Arc<PrepSession>>) -> &'static str {
//!     prep.set_event_id(None);
//!     prep.trigger(TriggerArgs::default());
//!     "ok"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/resource", get(get_resource).patch(patch_resource))
//!         .layer(PrepLayer::new().middleware());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9001").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - structured items, event profiles, the `Events` dictionary
//! - **[error]** - error types and result handling
//! - **[protocol]** - structured-field parsing, negotiation, templates
//! - **[server]** - the axum layer, per-request sessions, subscriptions

pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

pub use error::{PrepError, Result};
pub use server::{
    is_quirk_agent, EventIdStore, Modifiers, NotificationArgs, PrepConfig, PrepLayer, PrepSession,
    PrepState, SendArgs, SendBody, SendOutcome, SubscriptionIndex, TriggerArgs,
};
pub use types::{EventProfile, EventsHeader, FieldItem, FieldParams, FieldValue};
