//! Canonical transcript model and the layered parser that produces it.
//!
//! Raw text comes from provider JSON, provider free text, or pasted documents. Parsing tries,
//! in order: structured JSON (whole text, then the outermost bracketed region), line-oriented
//! speaker heuristics, and finally a single `System` segment holding the raw content.

mod lines;
mod normalize;
mod rules;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use normalize::{normalize_json_segments, strip_code_fence};
pub use rules::{clean_speaker_name, MetadataKind, ParsingRule, SpeakerTurn};

pub const DEFAULT_TITLE: &str = "Transcript";
pub const DEFAULT_TIMESTAMP: &str = "00:00";
/// Speaker assigned to text that appears before any recognizable speaker line.
pub const ORPHAN_SPEAKER: &str = "Transcript";
/// Speaker of the single segment emitted when nothing else could be recovered.
pub const FALLBACK_SPEAKER: &str = "System";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub speaker: String,
    pub timestamp: String,
    pub text: String,
}

impl TranscriptSegment {
    /// Ids derive from position and content so re-parsing the same text yields the same ids.
    pub fn new(
        index: usize,
        speaker: impl Into<String>,
        timestamp: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let speaker = speaker.into();
        let timestamp = timestamp.into();
        let text = text.into();
        let seed = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", index, speaker, timestamp, text);
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string(),
            speaker,
            timestamp,
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTranscript {
    pub title: String,
    pub headers: Vec<String>,
    pub segments: Vec<TranscriptSegment>,
    pub raw_content: String,
}

impl CanonicalTranscript {
    /// Distinct speakers in first-appearance order.
    pub fn speakers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if !seen.contains(&segment.speaker.as_str()) {
                seen.push(&segment.speaker);
            }
        }
        seen
    }
}

/// Format an offset in seconds as `MM:SS`, or `HH:MM:SS` from one hour on.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Parse arbitrary transcript text into the canonical structure. Never fails.
pub fn parse_transcript(raw_content: &str, title: Option<&str>) -> CanonicalTranscript {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    if raw_content.is_empty() {
        return CanonicalTranscript {
            title,
            headers: Vec::new(),
            segments: Vec::new(),
            raw_content: raw_content.to_string(),
        };
    }

    if let Some(segments) = normalize::sniff_structured(raw_content) {
        log::debug!("Transcript parsed as structured JSON ({} segments)", segments.len());
        return CanonicalTranscript {
            title,
            headers: Vec::new(),
            segments,
            raw_content: raw_content.to_string(),
        };
    }

    let (headers, mut segments) = lines::parse_lines(raw_content, &ParsingRule::default_rules());

    if segments.is_empty() {
        log::debug!("No speaker structure found, keeping raw content as a single segment");
        segments.push(TranscriptSegment::new(
            0,
            FALLBACK_SPEAKER,
            DEFAULT_TIMESTAMP,
            raw_content,
        ));
    }

    CanonicalTranscript {
        title,
        headers,
        segments,
        raw_content: raw_content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(65.9), "01:05");
        assert_eq!(format_clock(3599.0), "59:59");
        assert_eq!(format_clock(3725.0), "01:02:05");
        assert_eq!(format_clock(-3.0), "00:00");
        assert_eq!(format_clock(f64::NAN), "00:00");
    }

    #[test]
    fn test_empty_input_has_no_segments() {
        let transcript = parse_transcript("", None);
        assert!(transcript.segments.is_empty());
        assert!(transcript.headers.is_empty());
        assert_eq!(transcript.title, DEFAULT_TITLE);

        let transcript = parse_transcript("  \n\t ", Some("Blank"));
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].speaker, FALLBACK_SPEAKER);
        assert_eq!(transcript.segments[0].text, "  \n\t ");
        assert_eq!(transcript.title, "Blank");
    }

    #[test]
    fn test_structured_input_kept_verbatim() {
        let raw = r#"[{"speaker":"A","timestamp":"00:05","text":"hi"}]"#;
        let transcript = parse_transcript(raw, Some("Interview 1"));
        assert_eq!(transcript.segments.len(), 1);
        let segment = &transcript.segments[0];
        assert_eq!(segment.speaker, "A");
        assert_eq!(segment.timestamp, "00:05");
        assert_eq!(segment.text, "hi");
        assert_eq!(transcript.raw_content, raw);
    }

    #[test]
    fn test_structured_array_inside_prose() {
        let raw = "Here is the transcript:\n[{\"role\":\"Kim\",\"time\":\"00:01\",\"content\":\"Hello\"},{\"text\":\"Hi\"}]\nThanks!";
        let transcript = parse_transcript(raw, None);
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].speaker, "Kim");
        assert_eq!(transcript.segments[1].speaker, "Speaker 2");
        assert_eq!(transcript.segments[1].timestamp, DEFAULT_TIMESTAMP);
    }

    #[test]
    fn test_malformed_json_falls_back_to_system_segment() {
        let raw = "[{speaker: 'A'";
        let transcript = parse_transcript(raw, None);
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].speaker, FALLBACK_SPEAKER);
        assert_eq!(transcript.segments[0].timestamp, DEFAULT_TIMESTAMP);
        assert_eq!(transcript.segments[0].text, raw);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = "김민수 0:05 안녕하세요\n이지은 0:10 네";
        let first = parse_transcript(raw, None);
        let second = parse_transcript(raw, None);
        assert_eq!(first.segments, second.segments);
    }

    #[test]
    fn test_serialized_shape_uses_raw_content_key() {
        let transcript = parse_transcript("Kim: hello", None);
        let value = serde_json::to_value(&transcript).unwrap();
        assert!(value.get("rawContent").is_some());
        assert!(value["segments"][0].get("id").is_some());
    }

    #[test]
    fn test_speakers_in_order() {
        let transcript = parse_transcript("A: one\nB: two\nA: three", None);
        assert_eq!(transcript.speakers(), vec!["A", "B"]);
    }
}
