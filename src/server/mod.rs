//! PREP server implementation.
//!
//! This module provides the axum-facing surface of the middleware:
//!
//! ```text
//! server/
//! ├── middleware     - PrepLayer and PrepState extraction
//! ├── session        - PrepSession: configure / send / trigger
//! ├── subscriptions  - SubscriptionIndex and Emitter fan-out
//! ├── event_id       - EventIdStore for Last-Event-ID handling
//! └── config         - PrepConfig options
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PrepLayer`] | Axum middleware layer |
//! | [`PrepSession`] | Per-request protocol handle |
//! | [`PrepState`] | Parsed PREP request state |
//! | [`SubscriptionIndex`] | Active connection index |
//! | [`EventIdStore`] | Per-path last event ids |
//! | [`PrepConfig`] | Configuration options |

pub mod config;
pub mod event_id;
pub mod middleware;
pub mod session;
pub mod subscriptions;


pub use config::PrepConfig;
pub use event_id::EventIdStore;
pub use middleware::{is_quirk_agent, PrepLayer, PrepState};
pub use session::{
    Modifiers, NotificationArgs, PrepSession, SendArgs, SendBody, SendOutcome, TriggerArgs,
};
pub use subscriptions::{
    GenerateNotification, Subscription, SubscriptionHandle, SubscriptionIndex,
};
