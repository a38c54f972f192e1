//! Turns whatever the recognizer sent back into ordered result records.
//!
//! Language-model backends do not always answer with clean JSON, so a raw
//! body is first classified:
//!
//! * [`ResponsePayload::DirectJson`]: the body parses as a JSON array or object.
//! * [`ResponsePayload::EmbeddedJson`]: free text with a `[...]` span that parses.
//! * [`ResponsePayload::Unparseable`]: neither; a placeholder record carries
//!   the raw text so the renderer still has something to show.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::error::RecognitionError;
use super::types::{RecognitionResponse, RecognitionResult};
use crate::variables::Variables;

pub const PARSE_ERROR_EXPRESSION: &str = "Unable to parse recognition result";

static EMBEDDED_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("embedded array pattern"));
static ARITHMETIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9\s.+\-*/×÷^%()]*[0-9][0-9\s.+\-*/×÷^%()]*$").expect("arithmetic pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    DirectJson(Value),
    EmbeddedJson(Value),
    Unparseable(String),
}

pub fn classify(raw: &str) -> ResponsePayload {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        match value {
            Value::Array(_) | Value::Object(_) => return ResponsePayload::DirectJson(value),
            // A JSON string literal wrapping the real answer.
            Value::String(inner) if inner.trim() != trimmed => return classify(&inner),
            _ => {}
        }
    }

    match find_embedded_records(trimmed) {
        Some(value) => ResponsePayload::EmbeddedJson(value),
        None => ResponsePayload::Unparseable(raw.to_string()),
    }
}

/// First `[...]` span in free text that parses as an array holding at least
/// one record object. Bracketed prose like `[1]` is skipped.
fn find_embedded_records(text: &str) -> Option<Value> {
    if let Some(found) = EMBEDDED_ARRAY.find(text) {
        if let Ok(value) = serde_json::from_str::<Value>(found.as_str()) {
            if holds_record(&value) {
                return Some(value);
            }
        }
    }

    text.match_indices('[').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) if holds_record(&value) => Some(value),
            _ => None,
        }
    })
}

fn holds_record(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().any(Value::is_object))
}

pub fn normalize(raw: &str) -> Vec<RecognitionResult> {
    match classify(raw) {
        ResponsePayload::DirectJson(Value::Array(items))
            if !items.is_empty() && !items.iter().any(Value::is_object) =>
        {
            vec![parse_error_placeholder(raw.to_string())]
        }
        ResponsePayload::DirectJson(value) | ResponsePayload::EmbeddedJson(value) => {
            normalize_value(value)
        }
        ResponsePayload::Unparseable(text) => vec![parse_error_placeholder(text)],
    }
}

/// Records from an already parsed payload. A non-empty array that yields no
/// record becomes the placeholder rather than an empty list.
pub fn normalize_value(value: Value) -> Vec<RecognitionResult> {
    match value {
        Value::Array(items) => {
            let records: Vec<_> = items.iter().filter_map(normalize_item).collect();
            if records.is_empty() && !items.is_empty() {
                vec![parse_error_placeholder(Value::Array(items).to_string())]
            } else {
                records
            }
        }
        Value::Object(mut map) => match map.remove("results") {
            Some(results) => normalize_value(results),
            None => vec![record_from_map(&map)],
        },
        Value::String(text) => normalize(&text),
        Value::Null => Vec::new(),
        other => vec![parse_error_placeholder(other.to_string())],
    }
}

/// Splits a raw service body into results and echoed variables.
///
/// An object carrying only `message`/`error` is the service reporting a
/// failure and becomes [`RecognitionError::Service`].
pub fn parse_response(raw: &str) -> Result<RecognitionResponse, RecognitionError> {
    let ResponsePayload::DirectJson(Value::Object(mut map)) = classify(raw) else {
        return Ok(RecognitionResponse {
            results: normalize(raw),
            variables: None,
        });
    };

    if let Some(message) = service_error_message(&map) {
        return Err(RecognitionError::Service(message));
    }

    let variables = match map.remove("variables") {
        Some(Value::Object(vars)) => Some(vars.into_iter().collect::<Variables>()),
        _ => None,
    };

    let results = match map.remove("results") {
        Some(results) => normalize_value(results),
        None => vec![record_from_map(&map)],
    };

    Ok(RecognitionResponse { results, variables })
}

/// Display text for one record, as laid out in the results band.
pub fn format_result(result: &RecognitionResult) -> String {
    let value = format_value(&result.value);
    if looks_arithmetic(&result.expression) && is_numeric(&result.value) {
        format!("{} = {value}", result.expression.trim())
    } else {
        format!("{}, result: {value}", result.expression.trim())
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.to_string()
            } else if let Some(uint) = number.as_u64() {
                uint.to_string()
            } else {
                let float = number.as_f64().unwrap_or(f64::NAN);
                if float.fract() == 0.0 && float.abs() < 1e15 {
                    format!("{}", float as i64)
                } else {
                    float.to_string()
                }
            }
        }
        other => other.to_string(),
    }
}

fn looks_arithmetic(expression: &str) -> bool {
    ARITHMETIC.is_match(expression.trim())
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(text) => text.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn normalize_item(item: &Value) -> Option<RecognitionResult> {
    match item {
        Value::Object(map) => Some(record_from_map(map)),
        Value::Null => None,
        other => {
            log::debug!("skipping non-object recognition item: {other}");
            None
        }
    }
}

fn record_from_map(map: &Map<String, Value>) -> RecognitionResult {
    let expression = match first_present(map, &["expression", "expr"]) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let value = first_present(map, &["value", "result"])
        .cloned()
        .unwrap_or(Value::Null);
    let is_assignment = first_present(map, &["isAssignment", "assign", "is_assignment"])
        .map(coerce_bool)
        .unwrap_or(false);

    RecognitionResult {
        expression,
        value,
        is_assignment,
    }
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        _ => false,
    }
}

fn service_error_message(map: &Map<String, Value>) -> Option<String> {
    let carries_results = ["results", "expr", "expression", "result", "value"]
        .iter()
        .any(|key| map.contains_key(*key));
    if carries_results {
        return None;
    }
    match first_present(map, &["message", "error"])? {
        Value::String(message) => Some(message.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_error_placeholder(raw: String) -> RecognitionResult {
    RecognitionResult {
        expression: PARSE_ERROR_EXPRESSION.to_string(),
        value: Value::String(raw),
        is_assignment: false,
    }
}
