//! Core PREP data types.

pub mod events;
pub mod fields;
pub mod profile;

pub use events::EventsHeader;
pub use fields::{params_get, params_remove, FieldItem, FieldParams, FieldValue};
pub use profile::EventProfile;
