//! Content negotiation over structured items and media types.
//!
//! The negotiator is pure: it matches a client's requested items against a
//! server-declared offer and produces the negotiated [`EventProfile`]. A
//! partial match surfaces the request's mismatched or list-valued parameters
//! in the item's third slot, so the application can pick among proposed
//! alternatives (for example a list of `delta` formats) before the profile is
//! cleaned into a subscription key.

use crate::types::fields::{params_get, FieldItem, FieldParams, FieldValue};
use crate::types::profile::EventProfile;

/// Result of matching one requested item against one allowed item.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Bare values do not match.
    No,
    /// Bare values match and every request parameter agrees with the offer.
    Exact,
    /// Bare values match; the carried parameters are the request's
    /// mismatched or list-valued ones.
    Partial(FieldParams),
}

impl MatchOutcome {
    #[inline]
    #[must_use]
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchOutcome::No)
    }
}

/// Match a requested item against an allowed item.
///
/// Bare values compare ASCII-case-insensitively. `q` is a weight consumed by
/// [`sort_by_q`], not a matchable parameter.
#[must_use]
pub fn match_item(req: &FieldItem, allowed: &FieldItem) -> MatchOutcome {
    if !req.value.eq_ignore_ascii_case(&allowed.value) {
        return MatchOutcome::No;
    }
    match_params(req, allowed)
}

/// Match a requested media type against an allowed one, honoring `*/*` and
/// `type/*` wildcards on the request side.
#[must_use]
pub fn match_type(req: &FieldItem, allowed: &FieldItem) -> MatchOutcome {
    if !media_type_matches(&req.value, &allowed.value) {
        return MatchOutcome::No;
    }
    match_params(req, allowed)
}

fn match_params(req: &FieldItem, allowed: &FieldItem) -> MatchOutcome {
    let mut extra = FieldParams::new();
    for (name, value) in &req.params {
        if name.eq_ignore_ascii_case("q") {
            continue;
        }
        let agrees = match value {
            FieldValue::Inner(_) => false,
            scalar => params_get(&allowed.params, name) == Some(scalar),
        };
        if !agrees {
            extra.push((name.clone(), value.clone()));
        }
    }
    if extra.is_empty() {
        MatchOutcome::Exact
    } else {
        MatchOutcome::Partial(extra)
    }
}

fn media_type_matches(req: &str, allowed: &str) -> bool {
    let (req_type, req_subtype) = split_media_type(req);
    let (allowed_type, allowed_subtype) = split_media_type(allowed);
    (req_type == "*" || req_type.eq_ignore_ascii_case(allowed_type))
        && (req_subtype == "*" || req_subtype.eq_ignore_ascii_case(allowed_subtype))
}

fn split_media_type(value: &str) -> (&str, &str) {
    match value.split_once('/') {
        Some((t, s)) => (t, s),
        None => (value, ""),
    }
}

/// Wildcard specificity of a media type: 2 for concrete, 1 for `type/*`,
/// 0 for `*/*`.
#[must_use]
pub fn specificity(value: &str) -> u8 {
    let (t, s) = split_media_type(value);
    match (t, s) {
        ("*", _) => 0,
        (_, "*") => 1,
        _ => 2,
    }
}

/// Media-type quality order: specificity descending, then `q` descending,
/// then insertion order.
#[must_use]
pub fn sort_by_q(items: &[FieldItem]) -> Vec<FieldItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        specificity(&b.value)
            .cmp(&specificity(&a.value))
            .then_with(|| {
                b.quality()
                    .partial_cmp(&a.quality())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    sorted
}

/// Every allowed item some requested item matches, in offer order. Each
/// result keeps the offer's own params and gains the request's extras when
/// the match was partial.
#[must_use]
pub fn negotiate_list(requested: &[FieldItem], allowed: &[FieldItem]) -> Vec<FieldItem> {
    negotiate_all(requested, allowed, match_item)
}

fn negotiate_all(
    requested: &[FieldItem],
    allowed: &[FieldItem],
    matcher: fn(&FieldItem, &FieldItem) -> MatchOutcome,
) -> Vec<FieldItem> {
    let requested = sort_by_q(requested);
    let mut results = Vec::new();
    for candidate in allowed {
        for req in &requested {
            match matcher(req, candidate) {
                MatchOutcome::No => continue,
                MatchOutcome::Exact => {
                    results.push(candidate.clone());
                    break;
                }
                MatchOutcome::Partial(extra) => {
                    let mut chosen = candidate.clone();
                    chosen.extra = extra;
                    results.push(chosen);
                    break;
                }
            }
        }
    }
    results
}

/// First match over the q-sorted request side, or `None`.
#[must_use]
pub fn negotiate_item(requested: &[FieldItem], allowed: &[FieldItem]) -> Option<FieldItem> {
    negotiate_first(requested, allowed, match_item)
}

/// [`negotiate_item`] with media-type wildcard rules.
#[must_use]
pub fn negotiate_type(requested: &[FieldItem], allowed: &[FieldItem]) -> Option<FieldItem> {
    negotiate_first(requested, allowed, match_type)
}

fn negotiate_first(
    requested: &[FieldItem],
    allowed: &[FieldItem],
    matcher: fn(&FieldItem, &FieldItem) -> MatchOutcome,
) -> Option<FieldItem> {
    for req in sort_by_q(requested) {
        for candidate in allowed {
            match matcher(&req, candidate) {
                MatchOutcome::No => continue,
                MatchOutcome::Exact => return Some(candidate.clone()),
                MatchOutcome::Partial(extra) => {
                    let mut chosen = candidate.clone();
                    chosen.extra = extra;
                    return Some(chosen);
                }
            }
        }
    }
    None
}

/// Negotiate a request's fields against the configured offer.
///
/// Only `accept` is processed today. A request without `accept` defaults to
/// `*/*`. Returns `{content-type: negotiated item}` or `None` when no media
/// type overlaps (the caller maps that to 406).
#[must_use]
pub fn negotiate_content(request: &FieldParams, offer: &FieldParams) -> Option<EventProfile> {
    let allowed = params_get(offer, "accept").and_then(FieldValue::as_inner)?;
    let default_accept;
    let requested: &[FieldItem] = match params_get(request, "accept").and_then(FieldValue::as_inner) {
        Some(items) => items,
        None => {
            default_accept = [FieldItem::new("*/*")];
            &default_accept
        }
    };
    let item = negotiate_type(requested, allowed)?;
    let mut profile = EventProfile::new();
    profile.insert("content-type", item);
    Some(profile)
}
