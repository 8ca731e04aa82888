//! Structured-fields adapter over the `sfv` crate.
//!
//! PREP offers and requests use one extension beyond RFC 8941: a parameter
//! whose value is an inner list, as in `"prep";accept=("message/rfc822")` or
//! `delta=("text/plain" "text/diff")`. `sfv` rejects that syntax, so this
//! adapter lifts each list-valued parameter out in a quote-aware pre-scan,
//! substitutes a placeholder string parameter, parses the remainder with
//! `sfv`, then re-parses the captured lists (recursively, for a `delta` list
//! nested inside an `accept` list) and grafts them back as
//! [`FieldValue::Inner`] entries.

use sfv::{BareItem, Decimal, FromPrimitive, InnerList, Item, ListEntry, Parameters, Parser,
          SerializeValue};

use crate::error::{PrepError, Result};
use crate::types::fields::{FieldItem, FieldParams, FieldValue};

const NESTED_SENTINEL: &str = "*nested-param:";

/// Parse a structured list of items, with nested-parameter support.
pub fn parse_list(input: &str) -> Result<Vec<FieldItem>> {
    let (clean, captures) = extract_nested_params(input)?;
    let list = Parser::parse_list(clean.as_bytes())
        .map_err(|e| PrepError::HeaderParse(format!("invalid structured list: {e}")))?;
    let mut items = Vec::new();
    for entry in list {
        match entry {
            ListEntry::Item(item) => items.push(convert_item(item, &captures)?),
            ListEntry::InnerList(_) => {
                return Err(PrepError::HeaderParse(
                    "inner list not allowed at the top level".to_string(),
                ))
            }
        }
    }
    Ok(items)
}

/// Parse a structured dictionary into an ordered name/value map.
pub fn parse_dictionary(input: &str) -> Result<FieldParams> {
    let (clean, captures) = extract_nested_params(input)?;
    let dict = Parser::parse_dictionary(clean.as_bytes())
        .map_err(|e| PrepError::HeaderParse(format!("invalid structured dictionary: {e}")))?;
    let mut entries = Vec::new();
    for (name, entry) in dict {
        let value = match entry {
            // PREP dictionaries carry no parameters on scalar members.
            ListEntry::Item(item) => convert_param(item.bare_item, &captures)?,
            ListEntry::InnerList(inner) => {
                let mut items = Vec::new();
                for item in inner.items {
                    items.push(convert_item(item, &captures)?);
                }
                FieldValue::Inner(items)
            }
        };
        entries.push((name, value));
    }
    Ok(entries)
}

/// Serialize an ordered name/value map into a structured dictionary string.
pub fn serialize_dictionary(entries: &FieldParams) -> Result<String> {
    let mut dict = sfv::Dictionary::new();
    for (name, value) in entries {
        let entry = match value {
            FieldValue::Inner(items) => {
                let mut members = Vec::new();
                for item in items {
                    members.push(to_sfv_item(item)?);
                }
                ListEntry::InnerList(InnerList {
                    items: members,
                    params: Parameters::new(),
                })
            }
            scalar => ListEntry::Item(Item {
                bare_item: to_bare(scalar)?,
                params: Parameters::new(),
            }),
        };
        dict.insert(name.clone(), entry);
    }
    dict.serialize_value()
        .map_err(|e| PrepError::Serialize(format!("invalid dictionary value: {e}")))
}

fn convert_item(item: Item, captures: &[(String, String)]) -> Result<FieldItem> {
    let value = match item.bare_item {
        BareItem::Token(t) => t,
        BareItem::String(s) => s,
        other => {
            return Err(PrepError::HeaderParse(format!(
                "unsupported bare item in list: {other:?}"
            )))
        }
    };
    let mut params = FieldParams::new();
    for (name, bare) in item.params {
        params.push((name, convert_param(bare, captures)?));
    }
    Ok(FieldItem {
        value,
        params,
        extra: Vec::new(),
    })
}

fn convert_param(bare: BareItem, captures: &[(String, String)]) -> Result<FieldValue> {
    if let BareItem::String(s) = &bare {
        if let Some(rest) = s.strip_prefix(NESTED_SENTINEL) {
            let idx: usize = rest.trim_end_matches('*').parse().map_err(|_| {
                PrepError::HeaderParse("corrupt nested-parameter placeholder".to_string())
            })?;
            let raw = captures
                .get(idx)
                .map(|(_, raw)| raw.as_str())
                .ok_or_else(|| {
                    PrepError::HeaderParse("dangling nested-parameter placeholder".to_string())
                })?;
            return Ok(FieldValue::Inner(parse_captured_list(raw)?));
        }
    }
    Ok(match bare {
        BareItem::Token(t) => FieldValue::Token(t),
        BareItem::String(s) => FieldValue::String(s),
        BareItem::Integer(i) => FieldValue::Integer(i),
        BareItem::Decimal(d) => FieldValue::Decimal(d.to_string().parse().unwrap_or(0.0)),
        BareItem::Boolean(b) => FieldValue::Boolean(b),
        other => {
            return Err(PrepError::HeaderParse(format!(
                "unsupported parameter value: {other:?}"
            )))
        }
    })
}

/// Parse a captured `(...)` span as the members of one inner list.
fn parse_captured_list(raw: &str) -> Result<Vec<FieldItem>> {
    let (clean, captures) = extract_nested_params(raw)?;
    let list = Parser::parse_list(clean.as_bytes())
        .map_err(|e| PrepError::HeaderParse(format!("invalid nested list: {e}")))?;
    match list.into_iter().next() {
        Some(ListEntry::InnerList(inner)) => {
            let mut items = Vec::new();
            for item in inner.items {
                items.push(convert_item(item, &captures)?);
            }
            Ok(items)
        }
        _ => Err(PrepError::HeaderParse(
            "nested parameter is not an inner list".to_string(),
        )),
    }
}

fn to_sfv_item(item: &FieldItem) -> Result<Item> {
    let mut params = Parameters::new();
    for (name, value) in &item.params {
        params.insert(name.clone(), to_bare(value)?);
    }
    Ok(Item {
        bare_item: bare_for_value_text(&item.value),
        params,
    })
}

fn bare_for_value_text(text: &str) -> BareItem {
    if !text.is_empty()
        && text.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '*')
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~:/".contains(c))
    {
        BareItem::Token(text.to_string())
    } else {
        BareItem::String(text.to_string())
    }
}

fn to_bare(value: &FieldValue) -> Result<BareItem> {
    Ok(match value {
        FieldValue::Token(t) => BareItem::Token(t.clone()),
        FieldValue::String(s) => BareItem::String(s.clone()),
        FieldValue::Integer(i) => BareItem::Integer(*i),
        FieldValue::Decimal(d) => BareItem::Decimal(
            Decimal::from_f64(*d)
                .ok_or_else(|| PrepError::Serialize(format!("unrepresentable decimal: {d}")))?,
        ),
        FieldValue::Boolean(b) => BareItem::Boolean(*b),
        FieldValue::Inner(_) => {
            return Err(PrepError::Serialize(
                "inner list not allowed as a parameter value".to_string(),
            ))
        }
    })
}

/// Lift `;name=(...)` parameters out of `input`, returning the cleaned string
/// and the captured raw lists in placeholder order.
fn extract_nested_params(input: &str) -> Result<(String, Vec<(String, String)>)> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut captures: Vec<(String, String)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            let end = skip_string(&chars, i)?;
            out.extend(&chars[i..end]);
            i = end;
        } else if c == ';' {
            out.push(';');
            i += 1;
            let name_start = i;
            while i < chars.len() && is_key_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
            }
            let name: String = chars[name_start..i].iter().collect();
            if i + 1 < chars.len() && chars[i] == '=' && chars[i + 1] == '(' {
                let end = skip_parens(&chars, i + 1)?;
                let raw: String = chars[i + 1..end].iter().collect();
                out.push('=');
                out.push_str(&format!("\"{}{}*\"", NESTED_SENTINEL, captures.len()));
                captures.push((name, raw));
                i = end;
            }
        } else {
            out.push(c);
            i += 1;
        }
    }

    Ok((out, captures))
}

/// Index just past the closing quote of the string starting at `start`.
fn skip_string(chars: &[char], start: usize) -> Result<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(PrepError::HeaderParse("unterminated string".to_string()))
}

/// Index just past the parenthesized span starting at `start`.
fn skip_parens(chars: &[char], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '"' => i = skip_string(chars, i)?,
            '(' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err(PrepError::HeaderParse("unterminated inner list".to_string()))
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_uppercase() || c.is_ascii_digit()
        || matches!(c, '_' | '-' | '.' | '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_list() {
        let items = parse_list("\"prep\", \"other\"").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, "prep");
        assert_eq!(items[1].value, "other");
    }

    #[test]
    fn test_parse_item_with_scalar_params() {
        let items = parse_list("\"prep\";duration=1800").unwrap();
        assert_eq!(items[0].param("duration"), Some(&FieldValue::Integer(1800)));
    }

    #[test]
    fn test_parse_nested_accept_param() {
        let items = parse_list("\"prep\";accept=(\"message/rfc822\")").unwrap();
        let accept = items[0].param("accept").unwrap();
        let inner = accept.as_inner().unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].value, "message/rfc822");
    }

    #[test]
    fn test_parse_doubly_nested_delta_param() {
        let items =
            parse_list("\"prep\";accept=(\"message/rfc822\";delta=(\"text/plain\" \"text/diff\"))")
                .unwrap();
        let accept = items[0].param("accept").unwrap().as_inner().unwrap();
        let delta = accept[0].param("delta").unwrap().as_inner().unwrap();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].value, "text/plain");
        assert_eq!(delta[1].value, "text/diff");
    }

    #[test]
    fn test_parse_scalar_delta_param() {
        let items = parse_list("\"prep\";accept=(\"message/rfc822\";delta=\"text/plain\")").unwrap();
        let accept = items[0].param("accept").unwrap().as_inner().unwrap();
        assert_eq!(
            accept[0].param("delta"),
            Some(&FieldValue::String("text/plain".into()))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_list("\"unterminated").is_err());
        assert!(parse_list("\"prep\";accept=(\"open").is_err());
    }

    #[test]
    fn test_dictionary_round_trip() {
        let entries: FieldParams = vec![
            ("protocol".into(), FieldValue::Token("prep".into())),
            ("status".into(), FieldValue::Integer(200)),
            ("expires".into(), FieldValue::String("Sun, 02 Aug 2026 10:00:00 GMT".into())),
        ];
        let header = serialize_dictionary(&entries).unwrap();
        let parsed = parse_dictionary(&header).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn test_q_parses_as_decimal() {
        let items = parse_list("\"prep\";q=0.5").unwrap();
        assert_eq!(items[0].quality(), 0.5);
    }
}
