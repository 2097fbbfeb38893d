use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::multipart;
use serde::Deserialize;

use super::ProviderKind;
use crate::error::TranscriptionError;

pub const OPENAI_TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
/// The API rejects uploads above 25MB; stay under it.
pub const MAX_FILE_MB: f64 = 24.0;

const PROVIDER: ProviderKind = ProviderKind::Whisper;

/// One timed piece of single-speaker speech, offsets in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Speech-to-text provider that cannot tell speakers apart.
#[async_trait]
pub trait SingleSpeakerProvider: Send + Sync {
    fn max_file_bytes(&self) -> u64;

    /// Returns at least one segment, or an error.
    async fn transcribe_segments(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<Vec<TimedSegment>, TranscriptionError>;
}

// OpenAI Whisper API response structures
#[derive(Debug, Deserialize)]
struct WhisperApiResponse {
    #[serde(default)]
    segments: Vec<WhisperApiSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperApiSegment {
    start: f64,
    end: f64,
    text: String,
}

pub struct WhisperProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl WhisperProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300)) // 5 min timeout for large files
            .build()
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENAI_TRANSCRIPTIONS_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Size gate shared by the provider and the orchestrator.
pub fn check_file_size(path: &Path, max_bytes: u64) -> Result<u64, TranscriptionError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(TranscriptionError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            limit_mb: max_bytes as f64 / (1024.0 * 1024.0),
        });
    }
    Ok(size)
}

#[async_trait]
impl SingleSpeakerProvider for WhisperProvider {
    fn max_file_bytes(&self) -> u64 {
        (MAX_FILE_MB * 1024.0 * 1024.0) as u64
    }

    async fn transcribe_segments(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<Vec<TimedSegment>, TranscriptionError> {
        let file_size = check_file_size(path, self.max_file_bytes())?;
        info!("Whisper: transcribing audio ({:.1}MB)...", file_size as f64 / (1024.0 * 1024.0));

        let file_bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let file_part = multipart::Part::bytes(file_bytes)
            .file_name(file_name)
            .mime_str(mime_type)
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;

        let form = multipart::Form::new()
            .part("file", file_part)
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;

        if !response.status().is_success() {
            return Err(TranscriptionError::from_response(PROVIDER, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;
        let segments = parse_segments(&body)?;

        info!("Whisper: {} segments transcribed", segments.len());
        Ok(segments)
    }
}

fn parse_segments(body: &str) -> Result<Vec<TimedSegment>, TranscriptionError> {
    let api_response: WhisperApiResponse =
        serde_json::from_str(body).map_err(|e| TranscriptionError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;

    let segments: Vec<TimedSegment> = api_response
        .segments
        .into_iter()
        .map(|s| TimedSegment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
        })
        .filter(|s| !s.text.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(TranscriptionError::EmptyResult { provider: PROVIDER });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_segments_trims_and_drops_blank() {
        let body = r#"{"text":"hello there","segments":[
            {"id":0,"start":0.0,"end":2.4,"text":" hello"},
            {"id":1,"start":2.4,"end":3.0,"text":"  "},
            {"id":2,"start":63.2,"end":65.0,"text":" there"}
        ]}"#;
        let segments = parse_segments(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[1].start, 63.2);
    }

    #[test]
    fn test_parse_segments_rejects_empty_success() {
        let body = r#"{"text":"","segments":[]}"#;
        assert!(matches!(
            parse_segments(body),
            Err(TranscriptionError::EmptyResult { .. })
        ));
        assert!(matches!(
            parse_segments("{\"text\":"),
            Err(TranscriptionError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_check_file_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 2048]).unwrap();

        assert_eq!(check_file_size(file.path(), 4096).unwrap(), 2048);
        assert!(matches!(
            check_file_size(file.path(), 1024),
            Err(TranscriptionError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_file_never_reaches_the_api() {
        let provider = WhisperProvider::new("test_key")
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/unreachable");
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(provider.max_file_bytes() + 1).unwrap();

        let result = provider.transcribe_segments(file.path(), "audio/mpeg").await;
        assert!(matches!(result, Err(TranscriptionError::FileTooLarge { .. })));
    }
}
