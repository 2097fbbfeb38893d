//! Interview transcription with speaker attribution.
//!
//! [`transcription::Orchestrator`] turns a recording into raw provider output;
//! [`transcript::parse_transcript`] turns any raw transcript text into a [`CanonicalTranscript`].

pub mod config;
pub mod error;
pub mod media;
pub mod transcript;
pub mod transcription;

pub use config::PipelineConfig;
pub use error::{StrategyFailure, TranscriptionError};
pub use media::{
    MediaReference, MediaSource, OutputMode, RawTranscriptionResult, TranscriptionRequest,
};
pub use transcript::{parse_transcript, CanonicalTranscript, TranscriptSegment};
pub use transcription::{Orchestrator, OrchestratorConfig, ProviderKind};
