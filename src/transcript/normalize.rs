use serde_json::{Map, Value};

use super::{format_clock, TranscriptSegment, DEFAULT_TIMESTAMP};

const SPEAKER_KEYS: &[&str] = &["speaker", "role", "name"];
const TIME_KEYS: &[&str] = &["timestamp", "time", "start"];
const TEXT_KEYS: &[&str] = &["text", "content", "message"];
/// Keys under which an object-shaped payload may nest its segment array.
const SEGMENT_LIST_KEYS: &[&str] = &["segments", "transcript", "utterances", "results"];

/// Remove a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Normalize provider JSON into canonical segments.
///
/// Returns `None` when the payload is not a JSON array or no element carries text, which tells
/// the caller to fall back to the heuristic parser rather than store an empty transcript.
pub fn normalize_json_segments(raw: &str) -> Option<Vec<TranscriptSegment>> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let items = value.as_array()?;
    let segments = segments_from_items(items);
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Structured layer of the parser: the whole text, then the outermost `[...]`, then an
/// outermost `{...}` holding a segment list.
pub(crate) fn sniff_structured(raw: &str) -> Option<Vec<TranscriptSegment>> {
    if let Some(segments) = normalize_json_segments(raw) {
        return Some(segments);
    }

    if let Some(region) = outer_region(raw, '[', ']') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(region) {
            let segments = segments_from_items(&items);
            if !segments.is_empty() {
                return Some(segments);
            }
        }
    }

    let region = outer_region(raw, '{', '}')?;
    let object: Map<String, Value> = serde_json::from_str(region).ok()?;
    let items = SEGMENT_LIST_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))?;
    let segments = segments_from_items(items);
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

fn outer_region(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

fn segments_from_items(items: &[Value]) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            continue;
        };
        let Some(text) = first_text(object, TEXT_KEYS) else {
            continue;
        };
        let speaker = first_label(object, SPEAKER_KEYS)
            .unwrap_or_else(|| format!("Speaker {}", idx + 1));
        let timestamp = first_time(object).unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string());
        segments.push(TranscriptSegment::new(segments.len(), speaker, timestamp, text));
    }
    segments
}

fn first_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_label(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // Numeric speaker ids ("speaker": 2) become "Speaker 2"
        Value::Number(n) => Some(format!("Speaker {}", n)),
        _ => None,
    })
}

fn first_time(object: &Map<String, Value>) -> Option<String> {
    TIME_KEYS.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n.as_f64().map(format_clock),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn test_normalizes_heterogeneous_fields() {
        let raw = r#"```json
[
  {"speaker": "Interviewer", "timestamp": "00:00", "text": "Welcome"},
  {"role": "Participant", "time": "00:07", "content": "Thanks"},
  {"speaker": 3, "start": 75.4, "message": "Hello"}
]
```"#;
        let segments = normalize_json_segments(raw).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].speaker, "Participant");
        assert_eq!(segments[1].timestamp, "00:07");
        assert_eq!(segments[1].text, "Thanks");
        assert_eq!(segments[2].speaker, "Speaker 3");
        assert_eq!(segments[2].timestamp, "01:15");
    }

    #[test]
    fn test_drops_elements_without_text() {
        let raw = r#"[{"speaker":"A","text":"  "},{"speaker":"B","text":"kept"},"stray",42]"#;
        let segments = normalize_json_segments(raw).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].speaker, "B");
    }

    #[test]
    fn test_returns_none_instead_of_empty() {
        assert!(normalize_json_segments("[]").is_none());
        assert!(normalize_json_segments(r#"[{"speaker":"A"}]"#).is_none());
        assert!(normalize_json_segments(r#"{"segments":[]}"#).is_none());
        assert!(normalize_json_segments("not json").is_none());
    }

    #[test]
    fn test_sniff_object_with_segment_list() {
        let raw = r#"Result: {"language":"ko","segments":[{"speaker":"A","text":"안녕"}]}"#;
        let segments = sniff_structured(raw).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "안녕");
    }

    #[test]
    fn test_sniff_rejects_truncated_payload() {
        assert!(sniff_structured("[{speaker: 'A'").is_none());
        assert!(sniff_structured("] backwards [").is_none());
    }
}
