//! Recover JSON from free-form model output.
//!
//! Generation services are asked for strict JSON but routinely wrap it in
//! markdown code fences or surrounding prose. Recovery runs in stages:
//! 1. strip a leading/trailing code fence
//! 2. parse directly
//! 3. parse the outermost `{...}` or `[...]` slice
//! 4. (name lists only) salvage every quoted string token

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::JsonRecoveryError;

const FENCE: &str = "```";

lazy_static! {
    static ref QUOTED_STRING: Regex =
        Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("quoted string pattern is valid");
}

/// Strip code-fence lines from the start and end of `text`.
///
/// A leading fence may carry a language tag (```` ```json ````).
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();

    if body.starts_with(FENCE) {
        body = match body.find('\n') {
            Some(newline) => &body[newline + 1..],
            None => body.trim_start_matches(FENCE).trim_start_matches("json"),
        };
    }

    let trimmed_end = body.trim_end();
    if let Some(rest) = trimmed_end.strip_suffix(FENCE) {
        body = rest;
    }

    body.trim()
}

/// Extract a JSON value from model output.
pub fn extract_json(text: &str) -> Result<Value, JsonRecoveryError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(JsonRecoveryError::new("model output is empty"));
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    if let Some(slice) = outermost_json_slice(body) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            return Ok(value);
        }
    }

    Err(JsonRecoveryError::new(format!(
        "no parsable JSON in {} chars of output",
        text.len()
    )))
}

/// Extract a flat list of names from model output.
///
/// Accepts `{"fields": [...]}` (or a comma-separated `fields` string), any
/// object without a `fields` key (its keys become the list) or a bare array.
/// A `fields` key holding anything else yields no names. When nothing
/// parses, every quoted string in the text is salvaged instead, minus the
/// `fields` key itself.
pub fn extract_name_list(text: &str) -> Result<Vec<String>, JsonRecoveryError> {
    let names = match extract_json(text) {
        Ok(value) => names_from_value(&value),
        Err(_) => salvage_quoted_strings(strip_code_fences(text)),
    };

    let names = dedupe(names);
    if names.is_empty() {
        return Err(JsonRecoveryError::new("no field names recoverable"));
    }
    Ok(names)
}

fn names_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => match map.get("fields") {
            Some(Value::Array(items)) => items.iter().filter_map(name_of).collect(),
            Some(Value::Object(inner)) => inner.keys().cloned().collect(),
            Some(Value::String(list)) => split_name_string(list),
            // A `fields` key that carries no names never falls back to the keys
            Some(_) => Vec::new(),
            None => map.keys().cloned().collect(),
        },
        Value::Array(items) => items.iter().filter_map(name_of).collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Names from a comma- or newline-separated string.
fn split_name_string(list: &str) -> Vec<String> {
    list.split([',', '\n']).map(str::to_string).collect()
}

/// Name carried by one list item.
fn name_of(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => ["name", "field", "label"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn salvage_quoted_strings(text: &str) -> Vec<String> {
    QUOTED_STRING
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .filter(|s| s != "fields")
        .collect()
}

/// Undo JSON string escapes, keeping the raw token if it is not valid JSON.
fn unescape(token: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{token}\"")).unwrap_or_else(|_| token.to_string())
}

fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// Slice from the first `{`/`[` to the last matching `}`/`]`.
fn outermost_json_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_equals_plain() {
        let fenced = extract_json("```json\n{\"fields\":[\"A\",\"B\"]}\n```").unwrap();
        let plain = extract_json("{\"fields\":[\"A\",\"B\"]}").unwrap();
        assert_eq!(fenced, plain);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
        assert_eq!(strip_code_fences("```json{}```"), "{}");
    }

    #[test]
    fn test_json_inside_prose() {
        let value = extract_json("Sure! Here it is:\n{\"a\": 1}\nHope that helps.").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(extract_json("I could not do that.").is_err());
        assert!(extract_json("   ").is_err());
    }

    #[test]
    fn test_name_list_from_fields_key() {
        let names = extract_name_list(r#"{"fields": ["Name", "Date of birth", "Name"]}"#).unwrap();
        assert_eq!(names, vec!["Name", "Date of birth"]);
    }

    #[test]
    fn test_name_list_from_object_keys() {
        let names = extract_name_list(r#"{"Name": "", "Passport": null}"#).unwrap();
        assert_eq!(names, vec!["Name", "Passport"]);
    }

    #[test]
    fn test_name_list_from_bare_array_of_objects() {
        let names = extract_name_list(r#"[{"name": "Name"}, {"label": "Address"}, 42]"#).unwrap();
        assert_eq!(names, vec!["Name", "Address", "42"]);
    }

    #[test]
    fn test_name_list_salvage() {
        // Trailing comma and missing brace: not valid JSON
        let names = extract_name_list(r#"{fields: ["Full name", "Email", ]"#).unwrap();
        assert_eq!(names, vec!["Full name", "Email"]);
    }

    #[test]
    fn test_name_list_salvage_unescapes() {
        let names = extract_name_list(r#"fields: ["Mother's \"maiden\" name",]"#).unwrap();
        assert_eq!(names, vec![r#"Mother's "maiden" name"#]);
    }

    #[test]
    fn test_name_list_from_fields_string() {
        let names = extract_name_list(r#"{"fields": "Full name, Date of birth\nNationality"}"#).unwrap();
        assert_eq!(names, vec!["Full name", "Date of birth", "Nationality"]);
    }

    #[test]
    fn test_fields_key_without_names_is_not_a_field() {
        assert!(extract_name_list(r#"{"fields": null}"#).is_err());
        assert!(extract_name_list(r#"{"fields": 3}"#).is_err());
        assert!(extract_name_list(r#"{"fields": ""}"#).is_err());
    }

    #[test]
    fn test_name_list_nothing_recoverable() {
        assert!(extract_name_list("no fields here").is_err());
        assert!(extract_name_list(r#"{"fields": []}"#).is_err());
    }
}
