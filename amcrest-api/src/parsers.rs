//! Parsers for the `key=value` text the device's CGI endpoints return.
//!
//! Metadata calls answer with one pair (`sn=AD410ABCDEF`); configuration and
//! storage calls answer with one pair per line. JSON payloads are handled by
//! [`amcrest_stream::Event::data_field`] instead.

use std::collections::HashMap;

/// Parse a single `key=value`.
///
/// The text is trimmed, split on the first `=`, and surrounding double quotes
/// are removed from the value. Text without `=` is returned as a key with an
/// empty value.
pub fn parse_one_kv(text: &str) -> (String, String) {
    let text = text.trim();
    match text.split_once('=') {
        Some((key, value)) => (key.to_string(), unquote(value).to_string()),
        None => (text.to_string(), String::new()),
    }
}

/// Parse every `key=value` separated by `delim`.
///
/// Delimiters inside double quotes do not split. Blank entries are skipped.
pub fn parse_many_kv(text: &str, delim: char) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut rest = text;

    loop {
        let (entry, next) = match find_next_unquoted(rest, delim) {
            Some(idx) => (&rest[..idx], Some(&rest[idx + delim.len_utf8()..])),
            None => (rest, None),
        };

        if !entry.trim().is_empty() {
            let (key, value) = parse_one_kv(entry);
            pairs.insert(key, value);
        }

        match next {
            Some(next) => rest = next,
            None => break,
        }
    }

    pairs
}

/// Byte offset of the first `ch` outside double quotes
pub fn find_next_unquoted(text: &str, ch: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ch && !in_quotes {
            return Some(idx);
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
