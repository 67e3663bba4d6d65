//! Parser for the `key=value;key=value` payload carried by each segment.
//!
//! Keys are lower-cased, values are kept verbatim (newlines included). The
//! grammar has no escaping: every `;` ends a pair, and only the first `=` of a
//! pair separates key from value.

use std::collections::HashMap;

use crate::event::Event;

/// Split a payload into its key/value pairs.
///
/// Chunks without an `=`, or with an empty key, are ignored. A trailing chunk
/// without a terminating `;` is still parsed.
pub fn parse_payload(payload: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(payload);
    parse_pairs(&text)
}

fn parse_pairs(text: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();

    for chunk in text.split(';') {
        if let Some((key, value)) = chunk.split_once('=') {
            if key.is_empty() {
                continue;
            }
            pairs.insert(key.to_lowercase(), value.to_string());
        }
    }

    pairs
}

/// Convert a segment payload into an [`Event`].
///
/// A missing or non-numeric `index` becomes 0. Invalid UTF-8 is decoded
/// lossily and noted in [`Event::error`].
pub fn payload_to_event(payload: &[u8]) -> Event {
    let (text, error) = match std::str::from_utf8(payload) {
        Ok(text) => (std::borrow::Cow::Borrowed(text), None),
        Err(e) => (
            String::from_utf8_lossy(payload),
            Some(format!("payload is not valid UTF-8: {e}")),
        ),
    };

    let mut pairs = parse_pairs(&text);
    let index = pairs
        .get("index")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);

    Event {
        code: pairs.remove("code").unwrap_or_default(),
        action: pairs.remove("action").unwrap_or_default(),
        index,
        data: pairs.remove("data").unwrap_or_default(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_payload() {
        let parts = parse_payload(b"a=b;c=d;eq=this\nis\ntest");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts, map(&[("a", "b"), ("c", "d"), ("eq", "this\nis\ntest")]));

        let parts = parse_payload(b"a=b");
        assert_eq!(parts, map(&[("a", "b")]));

        let parts = parse_payload(b"");
        assert!(parts.is_empty());
    }

    #[test]
    fn test_keys_are_lowercased_values_are_not() {
        let parts = parse_payload(b"Code=VideoMotion;ACTION=Start");
        assert_eq!(parts, map(&[("code", "VideoMotion"), ("action", "Start")]));
    }

    #[test]
    fn test_only_first_equals_splits() {
        let parts = parse_payload(b"data=a=b=c");
        assert_eq!(parts, map(&[("data", "a=b=c")]));
    }

    #[test]
    fn test_chunks_without_key_are_ignored() {
        let parts = parse_payload(b"novalue;=orphan;;k=v;");
        assert_eq!(parts, map(&[("k", "v")]));
    }

    #[test]
    fn test_payload_to_event() {
        let payload = b"Code=_DoTalkAction_;action=Pulse;index=0;data={\n   \"Action\" : \"Invite\",\n   \"CallID\" : \"1\"\n}\n\r\n";
        let event = payload_to_event(payload);
        assert_eq!(event.code, "_DoTalkAction_");
        assert_eq!(event.action, "Pulse");
        assert_eq!(event.index, 0);
        assert!(event.data.starts_with('{'));
        assert_eq!(event.data_field("Action").as_deref(), Some("Invite"));
        assert_eq!(event.error, None);
    }

    #[test]
    fn test_bad_index_defaults_to_zero() {
        assert_eq!(payload_to_event(b"Code=VideoMotion;index=two").index, 0);
        assert_eq!(payload_to_event(b"Code=VideoMotion").index, 0);
        assert_eq!(payload_to_event(b"Code=VideoMotion;index=3").index, 3);
    }

    #[test]
    fn test_invalid_utf8_is_flagged() {
        let event = payload_to_event(b"Code=VideoMotion;action=Start;data=\xff\xfe");
        assert_eq!(event.code, "VideoMotion");
        assert!(event.error.is_some());
    }

    proptest! {
        #[test]
        fn prop_single_chunk_yields_at_most_one_pair(s in "[^;]*") {
            let parts = parse_payload(s.as_bytes());
            prop_assert!(parts.len() <= 1);
            if let Some((key, value)) = s.split_once('=') {
                if !key.is_empty() {
                    prop_assert_eq!(parts.get(&key.to_lowercase()), Some(&value.to_string()));
                }
            } else {
                prop_assert!(parts.is_empty());
            }
        }
    }
}
