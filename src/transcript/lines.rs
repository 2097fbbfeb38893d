use super::rules::{MetadataKind, ParsingRule};
use super::{TranscriptSegment, DEFAULT_TIMESTAMP, ORPHAN_SPEAKER};

/// Text accumulated for the speaker currently talking.
struct TurnBuffer {
    speaker: String,
    timestamp: String,
    lines: Vec<String>,
}

impl TurnBuffer {
    fn new(speaker: String, timestamp: String, first_line: String) -> Self {
        let lines = if first_line.is_empty() { Vec::new() } else { vec![first_line] };
        Self { speaker, timestamp, lines }
    }

    fn flush_into(self, segments: &mut Vec<TranscriptSegment>) {
        let text = self.lines.join("\n");
        if text.trim().is_empty() {
            return;
        }
        segments.push(TranscriptSegment::new(segments.len(), self.speaker, self.timestamp, text));
    }
}

/// Line-oriented pass: returns `(headers, segments)`.
///
/// Segments are only returned when at least one speaker line was recognized; text with no
/// speaker structure yields none and is left to the caller's whole-content fallback.
pub(crate) fn parse_lines(
    raw: &str,
    rules: &[ParsingRule],
) -> (Vec<String>, Vec<TranscriptSegment>) {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut headers = Vec::new();
    let mut segments = Vec::new();
    let mut current: Option<TurnBuffer> = None;
    let mut saw_speaker = false;

    for line in normalized.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(kind) = MetadataKind::classify(line) {
            log::trace!("Metadata line ({:?}): {}", kind, line);
            headers.push(line.to_string());
            continue;
        }

        if let Some(turn) = rules.iter().find_map(|rule| rule.try_match(line)) {
            saw_speaker = true;
            let previous_timestamp = current.as_ref().map(|buf| buf.timestamp.clone());
            if let Some(buf) = current.take() {
                buf.flush_into(&mut segments);
            }
            let timestamp = turn
                .timestamp
                .or(previous_timestamp)
                .unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string());
            current = Some(TurnBuffer::new(turn.speaker, timestamp, turn.text));
            continue;
        }

        match current.as_mut() {
            Some(buf) => buf.lines.push(line.to_string()),
            None => {
                // Preamble before any speaker: keep it as a header and open a synthetic
                // speaker bucket seeded with the same line.
                headers.push(line.to_string());
                current = Some(TurnBuffer::new(
                    ORPHAN_SPEAKER.to_string(),
                    DEFAULT_TIMESTAMP.to_string(),
                    line.to_string(),
                ));
            }
        }
    }

    if let Some(buf) = current.take() {
        buf.flush_into(&mut segments);
    }
    if !saw_speaker {
        segments.clear();
    }

    (headers, segments)
}
