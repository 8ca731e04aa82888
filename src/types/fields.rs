//! Structured-field item types used throughout negotiation and subscription.
//!
//! A [`FieldItem`] is the three-slot item of the PREP model: a bare value, an
//! ordered parameter map, and an optional second map of *extra* parameters.
//! The extra map is only ever populated by the negotiator; it carries the
//! unmatched or list-valued parameter alternatives a request proposed, so the
//! application can pick among them before the item becomes a subscription key.

/// Parameter value of a structured item.
///
/// RFC 8941 parameters are bare items; PREP additionally allows a parameter
/// whose value is an inner list (for example `delta=("text/plain"
/// "text/diff")`), represented here as [`FieldValue::Inner`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An unquoted token, e.g. `prep`.
    Token(String),
    /// A quoted string, e.g. `"message/rfc822"`.
    String(String),
    /// An integer, e.g. `duration=1800`.
    Integer(i64),
    /// A decimal, e.g. `q=0.5`.
    Decimal(f64),
    /// A boolean flag.
    Boolean(bool),
    /// A nested list of items, e.g. `delta=("text/plain" "text/diff")`.
    Inner(Vec<FieldItem>),
}

impl FieldValue {
    /// Textual form of a scalar value, `None` for inner lists.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Token(s) | FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Inner(_) => None,
        }
    }

    /// Integer value, if this is an integer.
    #[inline]
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Nested item list, if this is an inner list.
    #[inline]
    #[must_use]
    pub fn as_inner(&self) -> Option<&[FieldItem]> {
        match self {
            FieldValue::Inner(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric weight for quality sorting. Integers and decimals qualify.
    #[must_use]
    pub fn as_weight(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

/// Ordered parameter map: name to value, insertion order preserved.
pub type FieldParams = Vec<(String, FieldValue)>;

/// A structured-field item: bare value plus ordered parameters, with an
/// optional negotiator-populated map of extra parameter alternatives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldItem {
    /// Bare value text. Tokens and strings are not distinguished here;
    /// matching is ASCII-case-insensitive either way.
    pub value: String,
    /// Ordered parameters. List-valued parameters parse into
    /// [`FieldValue::Inner`] entries.
    pub params: FieldParams,
    /// Extra parameters surfaced by the negotiator on a partial match.
    /// Empty means absent; stripped by profile cleanup.
    pub extra: FieldParams,
}

impl FieldItem {
    /// Create an item with no parameters.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        FieldItem {
            value: value.into(),
            params: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Builder-style parameter append.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Look up a parameter by name, ASCII-case-insensitively.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&FieldValue> {
        params_get(&self.params, name)
    }

    /// Quality weight from the `q` parameter, defaulting to 1.0.
    #[must_use]
    pub fn quality(&self) -> f64 {
        self.param("q").and_then(FieldValue::as_weight).unwrap_or(1.0)
    }

    /// Whether the bare value equals `other` ignoring ASCII case.
    #[inline]
    #[must_use]
    pub fn value_eq(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }
}

/// Look up an entry in an ordered parameter map, ASCII-case-insensitively.
#[must_use]
pub fn params_get<'a>(params: &'a FieldParams, name: &str) -> Option<&'a FieldValue> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Remove an entry from an ordered parameter map, ASCII-case-insensitively.
pub fn params_remove(params: &mut FieldParams, name: &str) {
    params.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_param_lookup_is_case_insensitive() {
        let item = FieldItem::new("message/rfc822")
            .with_param("Delta", FieldValue::String("text/plain".into()));
        assert_eq!(
            item.param("delta"),
            Some(&FieldValue::String("text/plain".into()))
        );
    }

    #[test]
    fn test_quality_defaults_to_one() {
        let item = FieldItem::new("text/plain");
        assert_eq!(item.quality(), 1.0);
    }

    #[test]
    fn test_quality_reads_decimal_and_integer() {
        let half = FieldItem::new("a/b").with_param("q", FieldValue::Decimal(0.5));
        assert_eq!(half.quality(), 0.5);
        let zero = FieldItem::new("a/b").with_param("q", FieldValue::Integer(0));
        assert_eq!(zero.quality(), 0.0);
    }

    #[test]
    fn test_value_eq_ignores_case() {
        let item = FieldItem::new("Message/RFC822");
        assert!(item.value_eq("message/rfc822"));
    }

    #[test]
    fn test_params_remove() {
        let mut params: FieldParams = vec![
            ("q".into(), FieldValue::Decimal(0.5)),
            ("duration".into(), FieldValue::Integer(60)),
        ];
        params_remove(&mut params, "Q");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, "duration");
    }

    #[test]
    fn test_as_weight() {
        assert_eq!(FieldValue::Integer(1).as_weight(), Some(1.0));
        assert_eq!(FieldValue::Decimal(0.25).as_weight(), Some(0.25));
        assert_eq!(FieldValue::Token("x".into()).as_weight(), None);
    }
}
