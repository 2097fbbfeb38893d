use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::transcript::{strip_code_fence, TranscriptSegment};

// "Speaker 2", "화자 1", "참석자 3", "발언자 4"
static NUMBERED_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(speaker|화자|참석자|발언자)\s*(\d+)").unwrap());

// Line-leading "Label [MM:SS]:" as produced in delimited-text mode
static LEADING_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\p{L}[^:\[\]()\n]{0,39}?)\s*[\[(]\d{1,2}:\d{2}(?::\d{2})?[\])]").unwrap()
});

/// Comparison key for speaker labels: case and inner whitespace are not significant.
pub fn speaker_key(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Count distinct speaker labels in a raw provider result.
///
/// Array-shaped input is read field by field; anything else is scanned for speaker labels.
pub fn count_distinct_speakers(raw: &str) -> usize {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(strip_code_fence(raw)) {
        let speakers: HashSet<String> = items
            .iter()
            .filter_map(|item| {
                let object = item.as_object()?;
                ["speaker", "role"].iter().find_map(|key| match object.get(*key)? {
                    Value::String(s) if !s.trim().is_empty() => Some(speaker_key(s)),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
            })
            .collect();
        return speakers.len();
    }

    let mut speakers: HashSet<String> = HashSet::new();
    for caps in NUMBERED_LABEL_RE.captures_iter(raw) {
        speakers.insert(format!("{} {}", caps[1].to_lowercase(), &caps[2]));
    }
    for caps in LEADING_LABEL_RE.captures_iter(raw) {
        let label = caps[1].trim();
        if !NUMBERED_LABEL_RE.is_match(label) {
            speakers.insert(speaker_key(label));
        }
    }
    speakers.len()
}

/// Merge adjacent segments with the same speaker, keeping the first timestamp.
pub fn merge_consecutive_speakers(segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut merged: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if speaker_key(&last.speaker) == speaker_key(&segment.speaker) => {
                last.text.push('\n');
                last.text.push_str(&segment.text);
            }
            _ => merged.push(segment),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_structured_speakers() {
        let raw = r#"[{"speaker":"Speaker 1","text":"a"},{"speaker":"Speaker 2","text":"b"},{"speaker":"Speaker 1","text":"c"}]"#;
        assert_eq!(count_distinct_speakers(raw), 2);

        let fenced = "```json\n[{\"speaker\":\"Kim\",\"text\":\"a\"}]\n```";
        assert_eq!(count_distinct_speakers(fenced), 1);
    }

    #[test]
    fn test_counts_numbered_labels_in_text() {
        let raw = "Speaker 1 [00:00]: hi\nSpeaker 2 [00:03]: hello\nSpeaker 1 [00:05]: ok";
        assert_eq!(count_distinct_speakers(raw), 2);

        let korean = "화자 1 00:00 안녕하세요\n화자 2 00:02 네\n화자 3 00:04 반갑습니다";
        assert_eq!(count_distinct_speakers(korean), 3);
    }

    #[test]
    fn test_mixed_numbered_labels_are_distinct() {
        let raw = "Speaker 1 [00:00]: hi\n화자 1 [00:03]: 네\n참석자 1 [00:06]: 안녕하세요";
        assert_eq!(count_distinct_speakers(raw), 3);
        assert_eq!(count_distinct_speakers("Speaker 1 [00:00]: a\nspeaker 1 [00:02]: b"), 1);
    }

    #[test]
    fn test_counts_named_labels_in_text() {
        let raw = "김민수 [00:00]: 시작할게요\n이지은 [00:04]: 네\n김민수 [00:09]: 첫 질문";
        assert_eq!(count_distinct_speakers(raw), 2);
    }

    #[test]
    fn test_plain_prose_has_no_speakers() {
        assert_eq!(count_distinct_speakers("just some words without labels"), 0);
        assert_eq!(count_distinct_speakers(""), 0);
    }

    #[test]
    fn test_merge_consecutive_speakers() {
        let segments = vec![
            TranscriptSegment::new(0, "A", "00:00", "one"),
            TranscriptSegment::new(1, "A", "00:02", "two"),
            TranscriptSegment::new(2, "B", "00:05", "three"),
            TranscriptSegment::new(3, "A", "00:09", "four"),
        ];
        let merged = merge_consecutive_speakers(segments);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].text, "one\ntwo");
        assert_eq!(merged[0].timestamp, "00:00");
        assert_eq!(merged[2].text, "four");
    }

    #[test]
    fn test_merge_and_count_agree_on_case() {
        let raw = r#"[{"speaker":"Kim","text":"a"},{"speaker":"kim ","text":"b"}]"#;
        assert_eq!(count_distinct_speakers(raw), 1);

        let merged = merge_consecutive_speakers(vec![
            TranscriptSegment::new(0, "Kim", "00:00", "a"),
            TranscriptSegment::new(1, "kim", "00:03", "b"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].speaker, "Kim");
        assert_eq!(merged[0].text, "a\nb");
    }
}
