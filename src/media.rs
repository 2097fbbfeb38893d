use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TranscriptionError;
use crate::transcript::{self, CanonicalTranscript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    LocalFile(PathBuf),
    Remote(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub source: MediaSource,
    pub mime_type: String,
}

impl MediaReference {
    pub fn local(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            source: MediaSource::LocalFile(path.into()),
            mime_type: mime_type.into(),
        }
    }

    pub fn remote(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            source: MediaSource::Remote(uri.into()),
            mime_type: mime_type.into(),
        }
    }

    /// Interpret a command-line argument as either a remote URI or a local path.
    pub fn from_arg(arg: &str, mime_type: impl Into<String>) -> Self {
        let lower = arg.to_ascii_lowercase();
        if ["http://", "https://", "gs://"].iter().any(|p| lower.starts_with(p)) {
            Self::remote(arg, mime_type)
        } else {
            Self::local(arg, mime_type)
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            MediaSource::LocalFile(path) => Some(path.as_path()),
            MediaSource::Remote(_) => None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.source {
            MediaSource::LocalFile(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("audio")
                .to_string(),
            MediaSource::Remote(uri) => uri.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub media: MediaReference,
    pub speaker_count: u32,
    pub interviewer_name_hint: String,
}

impl TranscriptionRequest {
    pub fn new(
        media: MediaReference,
        speaker_count: u32,
        interviewer_name_hint: impl Into<String>,
    ) -> Result<Self, TranscriptionError> {
        if speaker_count == 0 {
            return Err(TranscriptionError::InvalidRequest(
                "speaker count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            media,
            speaker_count,
            interviewer_name_hint: interviewer_name_hint.into(),
        })
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.speaker_count > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Json,
    Text,
}

/// Unparsed provider output, kept only until it is run through the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTranscriptionResult {
    pub raw: String,
    pub mode: OutputMode,
}

impl RawTranscriptionResult {
    pub fn json(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), mode: OutputMode::Json }
    }

    pub fn text(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), mode: OutputMode::Text }
    }

    pub fn into_transcript(self, title: Option<&str>) -> CanonicalTranscript {
        transcript::parse_transcript(&self.raw, title)
    }
}

/// Best-effort MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_arg_detects_remote() {
        let media = MediaReference::from_arg("https://storage.example.com/a.m4a", "audio/mp4");
        assert_eq!(
            media.source,
            MediaSource::Remote("https://storage.example.com/a.m4a".to_string())
        );
        assert!(media.local_path().is_none());

        let media = MediaReference::from_arg("/tmp/interview.m4a", "audio/mp4");
        assert_eq!(media.local_path(), Some(Path::new("/tmp/interview.m4a")));
        assert_eq!(media.display_name(), "interview.m4a");
    }

    #[test]
    fn test_zero_speakers_rejected() {
        let media = MediaReference::local("a.mp3", "audio/mpeg");
        assert!(matches!(
            TranscriptionRequest::new(media.clone(), 0, "Kim"),
            Err(TranscriptionError::InvalidRequest(_))
        ));
        let request = TranscriptionRequest::new(media, 2, "Kim").unwrap();
        assert!(request.is_multi_speaker());
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(guess_mime_type(Path::new("a.m4a")), "audio/mp4");
        assert_eq!(guess_mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_output_mode_serializes_lowercase() {
        let result = RawTranscriptionResult::text("Speaker 1 [00:01]: hi");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"mode\":\"text\""));
    }
}
