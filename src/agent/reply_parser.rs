// QueryCut Reply Parser - Conversation Extraction from Model Output
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Completion models do not answer with pure JSON. Replies arrive wrapped in
// prose, markdown fences, trailing commentary, or with an outer object that
// never closes. Extraction is layered:
//   1. outermost balanced `{...}` span parsed as JSON
//   2. `"conversations": [...]` fragment wrapped into a synthetic object
//   3. the same two scans over Python-literal text (single-quoted keys and
//      strings, trailing commas) rewritten into JSON
//   4. per-element coercion, dropping elements that do not coerce

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::segment_resolver::{ConversationRange, ResolutionError};

/// Key the model is instructed to put its list under
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Which extraction layer recovered the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    BalancedObject,
    KeyedFragment,
    /// Single-quoted literal rewritten to JSON, then scanned again
    PythonLiteral,
}

/// Candidate ranges recovered from one model reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub ranges: Vec<ConversationRange>,
    /// Elements present in the list that lacked `start`/`end` or failed coercion
    pub dropped: usize,
    pub strategy: ExtractionStrategy,
}

/// Recover the `conversations` list from a raw model reply.
///
/// Fails with [`ResolutionError::Unparseable`] only when no extraction layer
/// finds a correctly shaped list. Bad elements inside a good list are
/// dropped one by one.
pub fn parse_reply(raw: &str) -> Result<ParsedReply, ResolutionError> {
    let (items, strategy) = if let Some(items) = extract_from_balanced_object(raw) {
        (items, ExtractionStrategy::BalancedObject)
    } else if let Some(items) = extract_from_keyed_fragment(raw) {
        info!("[PARSER] Reply was not clean JSON, recovered list from keyed fragment");
        (items, ExtractionStrategy::KeyedFragment)
    } else if let Some(items) = extract_from_python_literal(raw) {
        info!("[PARSER] Reply used single-quoted literals, recovered list after rewrite");
        (items, ExtractionStrategy::PythonLiteral)
    } else {
        warn!(
            "[PARSER] No conversations list in reply ({} chars)",
            raw.chars().count()
        );
        debug!("[PARSER] Raw reply: {}", raw);
        return Err(ResolutionError::Unparseable);
    };

    let total = items.len();
    let ranges: Vec<ConversationRange> = items.iter().filter_map(coerce_range).collect();
    let dropped = total - ranges.len();

    if dropped > 0 {
        warn!(
            "[PARSER] Dropped {}/{} malformed conversation entries",
            dropped, total
        );
    }

    Ok(ParsedReply {
        ranges,
        dropped,
        strategy,
    })
}

/// Try every balanced `{...}` span left to right until one parses into an
/// object carrying a `conversations` array.
fn extract_from_balanced_object(raw: &str) -> Option<Vec<Value>> {
    let mut search_from = 0;

    while let Some(offset) = raw[search_from..].find('{') {
        let open = search_from + offset;
        // An unterminated span swallows the rest of the reply, so nothing
        // after it can balance either.
        let close = balanced_span(raw, open, b'{', b'}')?;

        if let Some(items) = conversations_from_json(&raw[open..=close]) {
            return Some(items);
        }
        search_from = close + 1;
    }

    None
}

/// Find `"conversations"`, take the list literal after it up to its closing
/// bracket and parse it inside a minimal synthetic object.
fn extract_from_keyed_fragment(raw: &str) -> Option<Vec<Value>> {
    let needle = format!("\"{}\"", CONVERSATIONS_KEY);
    let mut search_from = 0;

    while let Some(offset) = raw[search_from..].find(&needle) {
        let key_end = search_from + offset + needle.len();
        if let Some(items) = list_after_key(&raw[key_end..]) {
            return Some(items);
        }
        search_from = key_end;
    }

    None
}

fn list_after_key(rest: &str) -> Option<Vec<Value>> {
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    if !rest.starts_with('[') {
        return None;
    }

    let close = balanced_span(rest, 0, b'[', b']')?;
    let synthetic = format!("{{\"{}\": {}}}", CONVERSATIONS_KEY, &rest[..=close]);
    conversations_from_json(&synthetic)
}

/// Index of the delimiter closing the one opened at `open`, skipping anything
/// inside JSON string literals. `None` if the text ends first.
fn balanced_span(text: &str, open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    scan_balanced(text, open, open_ch, close_ch, b"\"")
}

/// Like [`balanced_span`], but strings may be delimited by any of `quotes`.
fn scan_balanced(
    text: &str,
    open: usize,
    open_ch: u8,
    close_ch: u8,
    quotes: &[u8],
) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }

        if quotes.contains(&b) {
            quote = Some(b);
        } else if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }

    None
}

/// Both scans again, over literal text where `'` also delimits strings.
/// Each candidate span is rewritten to JSON on its own so apostrophes in
/// surrounding prose never open a string.
fn extract_from_python_literal(raw: &str) -> Option<Vec<Value>> {
    let mut search_from = 0;
    while let Some(offset) = raw[search_from..].find('{') {
        let open = search_from + offset;
        match scan_balanced(raw, open, b'{', b'}', b"'\"") {
            Some(close) => {
                if let Some(items) = conversations_from_json(&literal_to_json(&raw[open..=close])) {
                    return Some(items);
                }
                search_from = close + 1;
            }
            // Unterminated here; an inner object may still close
            None => search_from = open + 1,
        }
    }

    let needle = format!("'{}'", CONVERSATIONS_KEY);
    let mut search_from = 0;
    while let Some(offset) = raw[search_from..].find(&needle) {
        let key_end = search_from + offset + needle.len();
        let rest = raw[key_end..].trim_start();
        if let Some(rest) = rest.strip_prefix(':').map(str::trim_start) {
            if rest.starts_with('[') {
                if let Some(close) = scan_balanced(rest, 0, b'[', b']', b"'\"") {
                    let synthetic = format!(
                        "{{\"{}\": {}}}",
                        CONVERSATIONS_KEY,
                        literal_to_json(&rest[..=close])
                    );
                    if let Some(items) = conversations_from_json(&synthetic) {
                        return Some(items);
                    }
                }
            }
        }
        search_from = key_end;
    }

    None
}

/// Rewrite a Python-style literal into JSON: single-quoted strings become
/// double-quoted (escaping any `"` inside), trailing commas before `]` or `}`
/// are removed. Double-quoted strings pass through untouched.
fn literal_to_json(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len() + 8);
    let mut quote: Option<char> = None;
    let mut chars = literal.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => match c {
                '\\' => match chars.next() {
                    Some('\'') if q == '\'' => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                c if c == q => {
                    quote = None;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                c => out.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push('"');
                }
                ']' | '}' => {
                    let kept = out.trim_end().len();
                    if out[..kept].ends_with(',') {
                        out.truncate(kept - 1);
                    }
                    out.push(c);
                }
                c => out.push(c),
            },
        }
    }

    out
}

fn conversations_from_json(candidate: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(mut map)) => match map.remove(CONVERSATIONS_KEY) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        Ok(_) => None,
        Err(e) => {
            debug!("[PARSER] Candidate span rejected: {}", e);
            None
        }
    }
}

fn coerce_range(item: &Value) -> Option<ConversationRange> {
    let start = coerce_seconds(item.get("start")?)?;
    let end = coerce_seconds(item.get("end")?)?;
    Some(ConversationRange::new(start, end))
}

/// Coerce a JSON number or string to seconds.
///
/// Strings may be plain decimals (`"12.5"`) or clock notation
/// (`"01:02"`, `"00:01:02.500"`). Non-finite results are rejected.
pub fn coerce_seconds(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_seconds(s.trim())?,
        _ => return None,
    };
    secs.is_finite().then_some(secs)
}

fn parse_seconds(text: &str) -> Option<f64> {
    if let Ok(secs) = text.parse::<f64>() {
        return Some(secs);
    }

    let parts: Vec<&str> = text.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let mut total = 0.0;
    for part in parts {
        let value: f64 = part.trim().parse().ok()?;
        if value < 0.0 {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spans(reply: &ParsedReply) -> Vec<(f64, f64)> {
        reply.ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_clean_json_reply() {
        let reply = parse_reply(r#"{"conversations": [{"start": 5, "end": 12}]}"#).unwrap();
        assert_eq!(spans(&reply), vec![(5.0, 12.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::BalancedObject);
        assert_eq!(reply.dropped, 0);
    }

    #[test]
    fn test_object_inside_prose() {
        let raw = "Sure, here you go:\n{ \"conversations\": [{\"start\": \"5\", \"end\": \"12\"}] }\nLet me know if you need more.";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(5.0, 12.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::BalancedObject);
    }

    #[test]
    fn test_markdown_fenced_reply() {
        let raw = "```json\n{\"conversations\": [{\"start\": 1.5, \"end\": 4}, {\"start\": 30, \"end\": 41.25}]}\n```";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(1.5, 4.0), (30.0, 41.25)]);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scanner() {
        let raw = r#"{"note": "closing } early", "conversations": [{"start": 2, "end": 3}]}"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(2.0, 3.0)]);
    }

    #[test]
    fn test_stray_braces_in_prose_before_object() {
        let raw = "Format is {start, end}. Result: {\"conversations\": [{\"start\": 7, \"end\": 9}]}";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(7.0, 9.0)]);
    }

    #[test]
    fn test_unclosed_outer_object_uses_fallback() {
        let raw = "{\"conversations\": [{\"start\": \"5\", \"end\": \"12\"}, {\"start\": 20, \"end\": 31}]";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(5.0, 12.0), (20.0, 31.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::KeyedFragment);
    }

    #[test]
    fn test_fallback_recovers_same_list_as_clean_reply() {
        let clean = r#"{"conversations": [{"start": 3, "end": 8}, {"start": "10", "end": "14.5"}]}"#;
        let broken = r#"Here: {"conversations": [{"start": 3, "end": 8}, {"start": "10", "end": "14.5"}], "comment": "I also thought abo"#;
        let a = parse_reply(clean).unwrap();
        let b = parse_reply(broken).unwrap();
        assert_eq!(a.ranges, b.ranges);
        assert_eq!(b.strategy, ExtractionStrategy::KeyedFragment);
    }

    #[test]
    fn test_fallback_after_invalid_json_object() {
        // Trailing comma makes the balanced span invalid JSON
        let raw = r#"{"conversations": [{"start": 1, "end": 2}], }"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(1.0, 2.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::KeyedFragment);
    }

    #[test]
    fn test_single_quoted_literal_reply() {
        let reply = parse_reply("{'conversations': [{'start': '5', 'end': '12'}]}").unwrap();
        assert_eq!(spans(&reply), vec![(5.0, 12.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::PythonLiteral);
    }

    #[test]
    fn test_single_quoted_literal_inside_prose() {
        let raw = "Here's what I found:\n{'conversations': [{'start': 1.5, 'end': 4}, {'start': '30', 'end': '41.25'},]}\nThat's all.";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(1.5, 4.0), (30.0, 41.25)]);
        assert_eq!(reply.strategy, ExtractionStrategy::PythonLiteral);
    }

    #[test]
    fn test_single_quoted_unclosed_object_uses_key() {
        let raw = "{'conversations': [{'start': 2, 'end': 6}], 'note': 'he said \"hi\" and it\\'s cut";
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(2.0, 6.0)]);
        assert_eq!(reply.strategy, ExtractionStrategy::PythonLiteral);
    }

    #[test]
    fn test_literal_to_json() {
        assert_eq!(
            literal_to_json(r#"{'a': 'say "hi"', 'b': [1, 2,], 'c': 'it\'s'}"#),
            r#"{"a": "say \"hi\"", "b": [1, 2], "c": "it's"}"#
        );
        assert_eq!(literal_to_json(r#"{"x": "y's"}"#), r#"{"x": "y's"}"#);
    }

    #[test]
    fn test_garbage_is_unparseable() {
        let err = parse_reply("I could not find anything relevant, sorry!").unwrap_err();
        assert!(matches!(err, ResolutionError::Unparseable));
        assert_eq!(err.to_string(), "unparseable response");
    }

    #[test]
    fn test_wrong_shape_is_unparseable() {
        assert!(parse_reply(r#"{"conversations": "none"}"#).is_err());
        assert!(parse_reply(r#"{"segments": [{"start": 1, "end": 2}]}"#).is_err());
    }

    #[test]
    fn test_truncated_list_is_unparseable() {
        let raw = r#"{"conversations": [{"start": 1, "end": 2}, {"start": 5, "en"#;
        assert!(matches!(parse_reply(raw), Err(ResolutionError::Unparseable)));
    }

    #[test]
    fn test_empty_list_is_not_an_error() {
        let reply = parse_reply(r#"{"conversations": []}"#).unwrap();
        assert!(reply.ranges.is_empty());
    }

    #[test]
    fn test_bad_elements_dropped_individually() {
        let raw = r#"{"conversations": [
            {"start": 1, "end": 4},
            {"start": "abc", "end": 9},
            {"end": 12},
            "not an object",
            {"start": null, "end": 3},
            {"start": "20", "end": "25"}
        ]}"#;
        let reply = parse_reply(raw).unwrap();
        assert_eq!(spans(&reply), vec![(1.0, 4.0), (20.0, 25.0)]);
        assert_eq!(reply.dropped, 4);
    }

    #[test]
    fn test_inverted_range_survives_parsing() {
        // Parsing does not judge ranges; validation does.
        let reply = parse_reply(r#"{"conversations": [{"start": 9, "end": 2}]}"#).unwrap();
        assert_eq!(spans(&reply), vec![(9.0, 2.0)]);
    }

    #[test]
    fn test_coerce_seconds() {
        assert_eq!(coerce_seconds(&json!(12)), Some(12.0));
        assert_eq!(coerce_seconds(&json!(" 7.25 ")), Some(7.25));
        assert_eq!(coerce_seconds(&json!("01:30")), Some(90.0));
        assert_eq!(coerce_seconds(&json!("01:00:02.5")), Some(3602.5));
        assert_eq!(coerce_seconds(&json!("NaN")), None);
        assert_eq!(coerce_seconds(&json!("inf")), None);
        assert_eq!(coerce_seconds(&json!("1:2:3:4")), None);
        assert_eq!(coerce_seconds(&json!(true)), None);
        assert_eq!(coerce_seconds(&json!([1])), None);
    }
}
