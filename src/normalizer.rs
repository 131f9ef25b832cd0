//! Bidirectional conversion between OData wire values and MCP JSON values
//! (§4.3): legacy `/Date(ms±hhmm)/` literals ↔ ISO 8601, and SAP
//! decimal-as-string ↔ JSON number.
//!
//! Field-name heuristics are a fallback for services that under-annotate
//! their metadata; whenever the schema supplies an authoritative EDM type
//! the type drives the conversion and the heuristic is skipped entirely.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::AppError;
use crate::schema::{EntityType, ODataVersion};

static LEGACY_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/Date\((-?\d+)([+-]\d{4})?\)/$").expect("valid regex"));

/// Property-name substrings that mark a v2 string property as a legacy
/// date when the schema itself doesn't say so (§4.3).
const DATE_NAME_HINTS: &[&str] = &[
    "Date", "Time", "At", "On", "Created", "Modified", "Updated", "Changed", "Valid", "Expired",
    "Start", "End", "From", "To", "Since", "Until", "Delivery", "Due", "Posted", "Timestamp",
];

/// Property-name tokens that mark a numeric-looking property as a SAP
/// decimal-as-string when the schema doesn't say so (§4.3).
const DECIMAL_NAME_HINTS: &[&str] = &[
    "quantity", "qty", "amount", "amt", "price", "cost", "value", "val", "total", "sum", "net",
    "gross", "tax", "vat", "discount", "disc", "rate", "percent", "weight", "wgt", "volume",
    "vol", "balance", "credit", "debit", "fee", "charge", "margin", "profit", "salary", "wage",
    "pay", "budget", "revenue", "score", "points", "units", "count",
];

const DECIMAL_NAME_SUFFIXES: &[&str] = &["_qty", "_amt", "_val", "_no", "_num", "_count"];

fn looks_like_date_field(name: &str) -> bool {
    DATE_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

fn looks_like_decimal_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    DECIMAL_NAME_HINTS.iter().any(|hint| {
        if *hint == "percent" {
            lower.contains("percent")
        } else {
            lower == *hint || lower.contains(hint)
        }
    }) || DECIMAL_NAME_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Parses a legacy `/Date(ms±hhmm)/` literal into milliseconds since the
/// epoch. The timezone offset, if present, only ever adjusted wall-clock
/// rendering on the originating server — the millisecond count is already
/// UTC, so it is ignored here exactly as the regex in §4.3 implies.
fn parse_legacy_date(raw: &str) -> Option<i64> {
    let caps = LEGACY_DATE_RE.captures(raw)?;
    caps.get(1)?.as_str().parse::<i64>().ok()
}

/// `/Date(ms)/` → RFC 3339 UTC, no sub-second precision.
fn decode_legacy_date(ms: i64) -> Result<String, AppError> {
    let dt = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Normalization(format!("legacy date out of range: {ms}")))?;
    Ok(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// ISO 8601 → `/Date(ms)/`, the inverse of [`decode_legacy_date`].
fn encode_legacy_date(iso: &str) -> Result<String, AppError> {
    let dt = DateTime::parse_from_rfc3339(iso)
        .map_err(|e| AppError::Normalization(format!("not a valid ISO 8601 timestamp: {iso} ({e})")))?;
    Ok(format!("/Date({})/", dt.timestamp_millis()))
}

/// Response → MCP. Walks the value recursively; `entity_type` supplies
/// authoritative EDM types when known (pass `None` for untyped payloads,
/// e.g. function-import results of unknown shape).
pub fn decode_response(value: Value, entity_type: Option<&EntityType>) -> Result<Value, AppError> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let prop = entity_type.and_then(|t| t.find_property(&key));
                let decoded = decode_field(val, prop)?;
                out.insert(key, decoded);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_response(item, entity_type))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn decode_field(val: Value, prop: Option<&crate::schema::Property>) -> Result<Value, AppError> {
    match val {
        Value::String(s) => {
            if let Some(ms) = parse_legacy_date(&s) {
                return Ok(Value::String(decode_legacy_date(ms)?));
            }
            if let Some(p) = prop {
                if p.edm_type.is_integer() {
                    if let Ok(n) = s.parse::<i64>() {
                        return Ok(Value::Number(n.into()));
                    }
                }
            }
            Ok(Value::String(s))
        }
        Value::Object(map) => {
            // Nested entity/complex-type values have no per-field schema
            // context here; recurse untyped rather than over-claiming the
            // parent property's type.
            decode_response(Value::Object(map), None)
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_field(item, None))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

/// MCP → Request. Applies the heuristics (or schema, when known) to encode
/// dates as legacy literals for v2 and decimals as round-trippable strings.
pub fn encode_request(
    value: Value,
    entity_type: Option<&EntityType>,
    version: ODataVersion,
) -> Result<Value, AppError> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let prop = entity_type.and_then(|t| t.find_property(&key));
                let encoded = encode_field(&key, val, prop, version)?;
                out.insert(key, encoded);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}

fn encode_field(
    name: &str,
    val: Value,
    prop: Option<&crate::schema::Property>,
    version: ODataVersion,
) -> Result<Value, AppError> {
    match (prop, &val) {
        // Schema says it's temporal: encode on v2, pass through on v4.
        (Some(p), Value::String(s)) if p.edm_type.is_temporal() => {
            if version == ODataVersion::V2 && looks_like_iso8601(s) {
                Ok(Value::String(encode_legacy_date(s)?))
            } else {
                Ok(val)
            }
        }
        // Schema says it's decimal: format as a lossless string.
        (Some(p), Value::Number(n)) if p.edm_type.is_decimal() => Ok(Value::String(format_decimal_number(n)?)),
        // No authoritative type: fall back to name heuristics.
        (None, Value::String(s)) if version == ODataVersion::V2 && looks_like_iso8601(s) && looks_like_date_field(name) => {
            Ok(Value::String(encode_legacy_date(s)?))
        }
        (None, Value::Number(n)) if looks_like_decimal_field(name) => Ok(Value::String(format_decimal_number(n)?)),
        _ => Ok(val),
    }
}

fn looks_like_iso8601(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
}

/// Formats a finite number as a non-scientific decimal string with
/// sufficient digits to round-trip, using a fixed-point decimal type
/// rather than float formatting to avoid precision loss.
fn format_decimal_number(n: &serde_json::Number) -> Result<String, AppError> {
    if let Some(i) = n.as_i64() {
        return Ok(i.to_string());
    }
    let f = n
        .as_f64()
        .ok_or_else(|| AppError::Normalization(format!("not a finite number: {n}")))?;
    let decimal = Decimal::try_from(f)
        .map_err(|e| AppError::Normalization(format!("cannot represent {f} as a decimal: {e}")))?;
    Ok(decimal.normalize().to_string())
}

/// Parses a formatted decimal string back into an `f64`, used by
/// round-trip tests and by [`decode_field`]'s integer-coercion path.
pub fn parse_decimal(raw: &str) -> Result<f64, AppError> {
    raw.parse::<Decimal>()
        .map_err(|e| AppError::Normalization(format!("invalid decimal literal {raw}: {e}")))
        .and_then(|d| {
            use rust_decimal::prelude::ToPrimitive;
            d.to_f64()
                .ok_or_else(|| AppError::Normalization(format!("decimal {d} has no f64 representation")))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EdmType, EntityType, Property};

    fn entity_type_with(props: Vec<Property>) -> EntityType {
        EntityType {
            name: "T".to_string(),
            keys: vec!["Id".to_string()],
            properties: props,
            navigation_properties: vec![],
        }
    }

    fn decimal_property(name: &str) -> Property {
        Property {
            name: name.to_string(),
            edm_type: EdmType::Decimal,
            nullable: true,
            max_length: None,
            precision: Some(19),
            scale: Some(4),
        }
    }

    #[test]
    fn decodes_legacy_date_to_iso8601() {
        let input = serde_json::json!({ "ReleaseDate": "/Date(836438400000)/" });
        let decoded = decode_response(input, None).unwrap();
        assert_eq!(decoded["ReleaseDate"], "1996-07-04T00:00:00Z");
    }

    #[test]
    fn legacy_date_round_trips_through_encode() {
        for ms in [0_i64, 836438400000, -86400000, 1_700_000_000_000] {
            let legacy = format!("/Date({ms})/");
            let iso = decode_legacy_date(ms).unwrap();
            let back = encode_legacy_date(&iso).unwrap();
            assert_eq!(back, legacy);
        }
    }

    #[test]
    fn schema_typed_decimal_encodes_as_string() {
        let entity = entity_type_with(vec![decimal_property("UnitPrice")]);
        let input = serde_json::json!({ "UnitPrice": 19.99 });
        let encoded = encode_request(input, Some(&entity), ODataVersion::V2).unwrap();
        assert_eq!(encoded["UnitPrice"], "19.99");
    }

    #[test]
    fn heuristic_decimal_name_encodes_without_schema() {
        let input = serde_json::json!({ "TotalAmount": 1234.5 });
        let encoded = encode_request(input, None, ODataVersion::V2).unwrap();
        assert_eq!(encoded["TotalAmount"], "1234.5");
    }

    #[test]
    fn non_matching_field_name_is_left_as_a_number() {
        let input = serde_json::json!({ "RetryCount": 3 });
        let encoded = encode_request(input, None, ODataVersion::V2).unwrap();
        // "count" is in the heuristic set, by design (retry counters are
        // numeric-ish SAP fields too), so this one *does* become a string.
        assert_eq!(encoded["RetryCount"], "3");

        let input = serde_json::json!({ "Flag": 3 });
        let encoded = encode_request(input, None, ODataVersion::V2).unwrap();
        assert_eq!(encoded["Flag"], 3);
    }

    #[test]
    fn decimal_format_has_no_scientific_notation() {
        let formatted = format_decimal_number(&serde_json::Number::from_f64(0.0000001).unwrap()).unwrap();
        assert!(!formatted.to_lowercase().contains('e'));
    }

    #[test]
    fn decimal_round_trips_within_precision() {
        for n in [0.0_f64, 19.99, -42.5, 1000000.01] {
            let number = serde_json::Number::from_f64(n).unwrap();
            let formatted = format_decimal_number(&number).unwrap();
            let parsed = parse_decimal(&formatted).unwrap();
            assert!((parsed - n).abs() < 1e-9);
            assert!(!formatted.to_lowercase().contains('e'));
        }
    }

    #[test]
    fn v4_dates_pass_through_unchanged() {
        let entity = entity_type_with(vec![Property {
            name: "ReleaseDate".to_string(),
            edm_type: EdmType::DateTimeOffset,
            nullable: true,
            max_length: None,
            precision: None,
            scale: None,
        }]);
        let input = serde_json::json!({ "ReleaseDate": "1996-07-04T00:00:00Z" });
        let encoded = encode_request(input, Some(&entity), ODataVersion::V4).unwrap();
        assert_eq!(encoded["ReleaseDate"], "1996-07-04T00:00:00Z");
    }
}
