use thiserror::Error;

use crate::transcription::ProviderKind;

/// One failed step of the strategy cascade, kept for the aggregated terminal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Invalid transcription request: {0}")]
    InvalidRequest(String),

    #[error(
        "{0} API key not configured. Set the {key} environment variable.",
        key = .0.api_key_name()
    )]
    MissingCredentials(ProviderKind),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Http {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned a malformed response: {detail}")]
    MalformedResponse {
        provider: ProviderKind,
        detail: String,
    },

    #[error("{provider} returned an empty result")]
    EmptyResult { provider: ProviderKind },

    #[error("{provider} blocked the request: {reason}")]
    Blocked {
        provider: ProviderKind,
        reason: String,
    },

    #[error("File processing failed for {name} (state: {state})")]
    FileProcessing { name: String, state: String },

    #[error("File processing for {name} did not finish within {waited_secs}s")]
    FileProcessingTimeout { name: String, waited_secs: u64 },

    #[error("File is {size_mb:.1}MB, above the {limit_mb:.1}MB limit")]
    FileTooLarge { size_mb: f64, limit_mb: f64 },

    #[error("Found {found} distinct speaker(s), expected {requested}")]
    InsufficientSpeakers { found: usize, requested: u32 },

    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("{operation} exhausted after {attempts} attempts: {last_error}")]
    ResourceExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("All transcription strategies failed: {}", format_failures(.failures))]
    AllStrategiesFailed { failures: Vec<StrategyFailure> },

    #[error("Failed to serialize segments: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TranscriptionError {
    /// Rate limits, unavailable or erroring servers, and truncated bodies are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            TranscriptionError::Api { status, .. } => matches!(status, 429 | 500 | 503),
            TranscriptionError::MalformedResponse { .. } => true,
            TranscriptionError::Http { source, .. } => source.is_body() || source.is_decode(),
            _ => false,
        }
    }

    /// Build an error from a non-success HTTP response, consuming its body.
    pub(crate) async fn from_response(provider: ProviderKind, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        TranscriptionError::Api { provider, status, body }
    }
}

fn format_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.strategy, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
