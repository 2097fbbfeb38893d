use once_cell::sync::Lazy;
use regex::Regex;

/// Names at or above this length on a plain `Name:` line are read as prose, not a speaker.
pub const SIMPLE_NAME_MAX_CHARS: usize = 20;

// "김민수 0:05 안녕하세요": a name (optionally numbered), a time, then the text with no separator.
static IMMEDIATE_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>\p{L}[^\s:：\[\]()]*(?:\s\d{1,2})?)\s+(?P<ts>\d{1,2}:\d{2}(?::\d{2})?)\s+(?P<text>\S.*)$",
    )
    .unwrap()
});

// "Speaker 1 [00:05]: text", "Kim (1:02:03) - text", "참석자 1 00:00"
static BRACKETED_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>\p{L}[^:：\[\]()|]{0,39}?)\s*[|·\-–:：]?\s*(?:[\[(](?P<bts>\d{1,2}:\d{2}(?::\d{2})?)[\])]\s*[:：\-–]?|(?P<ts>\d{1,2}:\d{2}(?::\d{2})?)\s*(?:[:：\-–]|$))\s*(?P<text>.*)$",
    )
    .unwrap()
});

static SIMPLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>\p{L}[^:：]*?)\s*[:：]\s*(?P<text>.*)$").unwrap());

static DATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 2026년 3월 1일 (일) 오후 2:30
        r"^\d{4}\s*년\s*\d{1,2}\s*월\s*\d{1,2}\s*일(?:\s*\(?[월화수목금토일](?:요일)?\)?)?(?:\s*(?:오전|오후)?\s*\d{1,2}:\d{2}(?::\d{2})?)?$",
        // 2026-03-01, 2026.03.01. 14:30
        r"(?i)^\d{4}[./-]\s*\d{1,2}[./-]\s*\d{1,2}\.?(?:\s*\(?[월화수목금토일]\)?)?(?:\s+(?:오전|오후|am|pm)?\s*\d{1,2}:\d{2}(?::\d{2})?(?:\s*(?:am|pm))?)?$",
        // March 1, 2026 / Sun, Mar 1 2026 2:30 PM
        r"(?i)^(?:(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*,?\s+)?(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}(?:\s+\d{1,2}:\d{2}(?::\d{2})?(?:\s*(?:am|pm))?)?$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:\d+\s*(?:시간|hours?|hrs?|h)\s*)?(?:\d+\s*(?:분|minutes?|mins?|m)\s*)?(?:\d+\s*(?:초|seconds?|secs?|s))?$",
    )
    .unwrap()
});

static BARE_TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\[(]?\d{1,2}:\d{2}(?::\d{2})?[\])]?$").unwrap());

static RECORDING_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:새로운\s*)?(?:녹음|new recording|recording|voice memo|음성\s*메모)(?:\s*\d+)?$",
    )
    .unwrap()
});

/// Non-speech lines that go to the transcript headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Date,
    Duration,
    Timestamp,
    RecordingLabel,
}

impl MetadataKind {
    pub fn classify(line: &str) -> Option<MetadataKind> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if DATE_RES.iter().any(|re| re.is_match(line)) {
            Some(MetadataKind::Date)
        } else if DURATION_RE.is_match(line) {
            Some(MetadataKind::Duration)
        } else if BARE_TIMESTAMP_RE.is_match(line) {
            Some(MetadataKind::Timestamp)
        } else if RECORDING_LABEL_RE.is_match(line) {
            Some(MetadataKind::RecordingLabel)
        } else {
            None
        }
    }
}

/// A recognized speaker change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerTurn {
    pub speaker: String,
    /// `None` when the line names a speaker without a time; the parser reuses the last one.
    pub timestamp: Option<String>,
    pub text: String,
}

/// Speaker-line recognizers, tried in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingRule {
    ImmediateTimestamp,
    BracketedTimestamp,
    SimpleName { max_name_chars: usize },
}

impl ParsingRule {
    pub fn default_rules() -> Vec<ParsingRule> {
        vec![
            ParsingRule::ImmediateTimestamp,
            ParsingRule::BracketedTimestamp,
            ParsingRule::SimpleName {
                max_name_chars: SIMPLE_NAME_MAX_CHARS,
            },
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParsingRule::ImmediateTimestamp => "immediate-timestamp",
            ParsingRule::BracketedTimestamp => "bracketed-timestamp",
            ParsingRule::SimpleName { .. } => "simple-name",
        }
    }

    pub fn try_match(&self, line: &str) -> Option<SpeakerTurn> {
        let line = line.trim();
        match self {
            ParsingRule::ImmediateTimestamp => {
                let caps = IMMEDIATE_TIMESTAMP_RE.captures(line)?;
                turn(&caps["name"], Some(&caps["ts"]), &caps["text"])
            }
            ParsingRule::BracketedTimestamp => {
                let caps = BRACKETED_TIMESTAMP_RE.captures(line)?;
                let ts = caps.name("bts").or_else(|| caps.name("ts"))?.as_str();
                turn(&caps["name"], Some(ts), &caps["text"])
            }
            ParsingRule::SimpleName { max_name_chars } => {
                let caps = SIMPLE_NAME_RE.captures(line)?;
                let name = &caps["name"];
                let text = &caps["text"];
                // "https://..." is a URL, not speaker "https"
                if text.starts_with("//") {
                    return None;
                }
                // "저는 10:30 에" splits inside a clock time, not after a name
                if name.ends_with(|c: char| c.is_ascii_digit())
                    && text.starts_with(|c: char| c.is_ascii_digit())
                {
                    return None;
                }
                let speaker = clean_speaker_name(&caps["name"]);
                if speaker.chars().count() >= *max_name_chars {
                    return None;
                }
                turn(&speaker, None, text)
            }
        }
    }
}

fn turn(name: &str, timestamp: Option<&str>, text: &str) -> Option<SpeakerTurn> {
    let speaker = clean_speaker_name(name);
    if speaker.is_empty() {
        return None;
    }
    Some(SpeakerTurn {
        speaker,
        timestamp: timestamp.map(str::to_string),
        text: text.trim().to_string(),
    })
}

/// Trim a speaker name and strip trailing separators such as `:`, `)` or `-`.
pub fn clean_speaker_name(name: &str) -> String {
    name.trim()
        .trim_end_matches(|c: char| {
            c.is_whitespace()
                || matches!(c, ':' | '：' | '(' | ')' | '[' | ']' | '-' | '–' | '|' | '·')
        })
        .to_string()
}
