//! Safe reader for the single-quoted array literals embedded in the feed.
//!
//! The upstream page ships its data as script source (`[['101','Name',...]]`).
//! Instead of evaluating it, every quoted run is rewritten into a JSON string
//! and the result goes through `serde_json`.

use crate::error::{AppError, Result};
use serde_json::Value;
use std::fmt::Write as _;
use std::str::Chars;
use tracing::warn;

/// One positional row of an array literal.
pub type Row = Vec<Value>;

/// Parse an array-of-arrays literal, failing soft.
///
/// Malformed input is logged and yields an empty sequence, so a broken
/// fragment reads as "zero stations this cycle" rather than an error.
pub fn parse_rows(fragment: &str) -> Vec<Row> {
    match try_parse_rows(fragment) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(
                "Discarding malformed array literal ({} bytes): {}",
                fragment.len(),
                e
            );
            Vec::new()
        }
    }
}

/// Parse an array-of-arrays literal, reporting why it failed.
pub fn try_parse_rows(fragment: &str) -> Result<Vec<Row>> {
    let json = rewrite_to_json(fragment)?;

    let value: Value = serde_json::from_str(&json)
        .map_err(|e| AppError::Parse(format!("Invalid array literal: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(AppError::Parse(
            "Expected a top-level array literal".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Array(fields) => Ok(fields),
            other => Err(AppError::Parse(format!(
                "Row {} is not an array: {}",
                index, other
            ))),
        })
        .collect()
}

/// Serialize rows back into the single-quoted literal form used by the feed.
pub fn to_literal(rows: &[Row]) -> String {
    let mut out = String::from("[");
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_array(&mut out, row);
    }
    out.push(']');
    out
}

/// Text of a field, trimmed. Numbers and booleans are rendered as text.
pub fn field_text(row: &[Value], index: usize) -> Option<String> {
    match row.get(index)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric value of a field, or NaN when absent or unparsable.
pub fn field_number(row: &[Value], index: usize) -> f64 {
    let value = match row.get(index) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(f64::NAN)
}

/// Byte length of the bracketed literal opening `text`.
///
/// Brackets inside quoted strings are skipped. `None` when `text` does not
/// start with `[` or its brackets never balance.
pub fn literal_len(text: &str) -> Option<usize> {
    if !text.starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn rewrite_to_json(fragment: &str) -> Result<String> {
    let mut out = String::with_capacity(fragment.len() + 16);
    let mut chars = fragment.trim().chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => rewrite_string(&mut chars, &mut out, c)?,
            // JS tolerates `[a, b,]`, JSON does not
            ']' | '}' => {
                strip_trailing_comma(&mut out);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn rewrite_string(chars: &mut Chars<'_>, out: &mut String, quote: char) -> Result<()> {
    out.push('"');

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some('"') => out.push_str("\\\""),
                Some(esc @ ('\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                    out.push('\\');
                    out.push(esc);
                }
                // unknown escapes collapse to the bare character, as in JS
                Some(other) => push_char(out, other),
                None => break,
            },
            c if c == quote => {
                out.push('"');
                return Ok(());
            }
            c => push_char(out, c),
        }
    }

    Err(AppError::Parse("Unterminated string literal".to_string()))
}

fn push_char(out: &mut String, c: char) {
    match c {
        '"' => out.push_str("\\\""),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 => {
            let _ = write!(out, "\\u{:04x}", c as u32);
        }
        c => out.push(c),
    }
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}

fn write_array(out: &mut String, values: &[Value]) {
    out.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_value(out, value);
    }
    out.push(']');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => {
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('\'');
        }
        Value::Array(items) => write_array(out, items),
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_rows() {
        let rows = parse_rows("[['101','Bergamo','BG','100','200'],['102','Lecco','LC','5','6']]");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("101"));
        assert_eq!(rows[1][2], json!("LC"));
    }

    #[test]
    fn test_escaped_single_quote_is_unescaped() {
        let rows = parse_rows(r"[['Sant\'Omobono Terme','BG']]");
        assert_eq!(rows[0][0], json!("Sant'Omobono Terme"));
    }

    #[test]
    fn test_double_quote_inside_single_quoted_string() {
        let rows = parse_rows(r#"[['Monte "Alto"', 'x']]"#);
        assert_eq!(rows[0][0], json!("Monte \"Alto\""));
    }

    #[test]
    fn test_mixed_primitives() {
        let rows = parse_rows("[[1, -2.5, true, null, 'a']]");
        assert_eq!(rows[0], vec![json!(1), json!(-2.5), json!(true), json!(null), json!("a")]);
    }

    #[test]
    fn test_brackets_and_commas_inside_strings() {
        let rows = parse_rows("[['a,b]', '[c]'], ['d']]");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("a,b]"));
        assert_eq!(rows[0][1], json!("[c]"));
    }

    #[test]
    fn test_multiline_fragment_with_trailing_commas() {
        let fragment = "[\n  ['1','A'],\n  ['2','B',],\n]";
        let rows = parse_rows(fragment);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![json!("2"), json!("B")]);
    }

    #[test]
    fn test_malformed_input_yields_empty() {
        assert!(parse_rows("[['unterminated]]").is_empty());
        assert!(parse_rows("[['a','b']").is_empty());
        assert!(parse_rows("['a','b']").is_empty());
        assert!(parse_rows("").is_empty());
        assert!(parse_rows("{}").is_empty());
    }

    #[test]
    fn test_try_parse_reports_reason() {
        let err = try_parse_rows("[['x").unwrap_err();
        assert!(err.to_string().contains("Unterminated"));
    }

    #[test]
    fn test_field_accessors() {
        let row = vec![json!(" 5.5 "), json!(3), json!("n/d"), json!(null)];
        assert_eq!(field_number(&row, 0), 5.5);
        assert_eq!(field_number(&row, 1), 3.0);
        assert!(field_number(&row, 2).is_nan());
        assert!(field_number(&row, 3).is_nan());
        assert!(field_number(&row, 99).is_nan());
        assert_eq!(field_text(&row, 0).as_deref(), Some("5.5"));
        assert_eq!(field_text(&row, 1).as_deref(), Some("3"));
        assert_eq!(field_text(&row, 3), None);
    }

    #[test]
    fn test_literal_len_skips_quoted_brackets() {
        let text = r"[['1','Cima [A]; Nord'],['2','it\'s ]']]; var x = 1;";
        let len = literal_len(text).unwrap();
        assert_eq!(&text[..len], r"[['1','Cima [A]; Nord'],['2','it\'s ]']]");
        assert_eq!(literal_len("[['open'"), None);
        assert_eq!(literal_len("null;"), None);
    }

    #[test]
    fn test_to_literal_escapes_quotes() {
        let rows = vec![vec![json!("it's"), json!("back\\slash"), json!(4)]];
        assert_eq!(to_literal(&rows), r"[['it\'s','back\\slash',4]]");
    }
}
