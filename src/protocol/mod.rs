//! Protocol-level pieces of PREP: structured-field parsing, content
//! negotiation, and notification templates.

pub mod constants;
pub mod fields;
pub mod negotiate;
pub mod template;

pub use constants::PROTOCOL_NAME;
pub use negotiate::{
    match_item, match_type, negotiate_content, negotiate_item, negotiate_list, negotiate_type,
    sort_by_q, MatchOutcome,
};
pub use template::{part_header_block, rfc822, Rfc822Fields};
