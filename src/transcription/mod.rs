pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod speakers;
pub mod whisper;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Diarizing multimodal model; handles uploads and every multi-speaker request.
    Gemini,
    /// Single-speaker speech-to-text.
    Whisper,
}

impl ProviderKind {
    pub fn api_key_name(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Whisper => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "Gemini"),
            ProviderKind::Whisper => write!(f, "Whisper"),
        }
    }
}

/// Wire shape of structured provider output: `{speaker, timestamp, text}` per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSegment {
    pub speaker: String,
    pub timestamp: String,
    pub text: String,
}

impl From<TranscriptSegment> for ProviderSegment {
    fn from(segment: TranscriptSegment) -> Self {
        Self {
            speaker: segment.speaker,
            timestamp: segment.timestamp,
            text: segment.text,
        }
    }
}

pub use gemini::{DiarizingProvider, GeminiProvider, ModelTier};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Strategy, StrategyContext};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use speakers::{count_distinct_speakers, merge_consecutive_speakers};
pub use whisper::{SingleSpeakerProvider, TimedSegment, WhisperProvider};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_key_names() {
        assert_eq!(ProviderKind::Gemini.api_key_name(), "GEMINI_API_KEY");
        assert_eq!(ProviderKind::Whisper.api_key_name(), "OPENAI_API_KEY");
        assert_eq!(ProviderKind::Whisper.to_string(), "Whisper");
    }

    #[test]
    fn test_provider_segment_drops_id() {
        let segment = TranscriptSegment::new(0, "Kim", "00:05", "hello");
        let json = serde_json::to_string(&ProviderSegment::from(segment)).unwrap();
        assert_eq!(json, r#"{"speaker":"Kim","timestamp":"00:05","text":"hello"}"#);
    }
}
