//! Strategy cascade for turning one media file into raw transcript text.
//!
//! ```text
//! local file ──▶ upload + poll ──▶ plan(request)
//!                                   │
//!        speakers > 1: structured-diarization ──(rejected/failed)──┐
//!        speakers = 1: single-speaker ─────────(skipped/failed)────┤
//!                                                                  ▼
//!                                                      delimited-fallback
//! ```
//!
//! A multi-speaker request never falls through to the single-speaker provider: it cannot
//! diarize and would attribute all speech to one person.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};

use super::gemini::{
    DiarizingProvider, FileRef, FileState, GeminiProvider, GenerationParams, ModelCache, ModelTier,
    StagedFile,
};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::speakers::{count_distinct_speakers, merge_consecutive_speakers};
use super::whisper::{check_file_size, SingleSpeakerProvider, WhisperProvider};
use super::{ProviderKind, ProviderSegment};
use crate::config::PipelineConfig;
use crate::error::{StrategyFailure, TranscriptionError};
use crate::media::{
    MediaReference, MediaSource, OutputMode, RawTranscriptionResult, TranscriptionRequest,
};
use crate::transcript::{format_clock, normalize_json_segments};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Label for every segment from the single-speaker provider.
pub const SINGLE_SPEAKER_LABEL: &str = "Speaker 1";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    /// `None` waits for the provider indefinitely.
    pub poll_timeout: Option<Duration>,
    pub tier: ModelTier,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: None,
            tier: ModelTier::Pro,
        }
    }
}

/// Everything a strategy needs for one request.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub request: TranscriptionRequest,
    pub file: FileRef,
}

impl StrategyContext {
    fn params(&self, output_mode: OutputMode, tier: ModelTier) -> GenerationParams {
        GenerationParams {
            speaker_count: self.request.speaker_count,
            interviewer_name_hint: self.request.interviewer_name_hint.clone(),
            output_mode,
            tier,
        }
    }
}

/// One named way of producing a transcript.
///
/// Returning [`TranscriptionError::Skipped`] means the strategy did not apply; any other error
/// is a failed attempt that is reported if every strategy fails.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(
        &self,
        ctx: &StrategyContext,
    ) -> Result<RawTranscriptionResult, TranscriptionError>;
}

/// Structured JSON from the primary provider, gated on the requested speaker count.
pub struct StructuredDiarization {
    provider: Arc<dyn DiarizingProvider>,
    retry: RetryPolicy,
    tier: ModelTier,
}

#[async_trait]
impl Strategy for StructuredDiarization {
    fn name(&self) -> &'static str {
        "structured-diarization"
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext,
    ) -> Result<RawTranscriptionResult, TranscriptionError> {
        let params = ctx.params(OutputMode::Json, self.tier);
        let raw = retry_with_backoff(&self.retry, "Gemini structured transcription", || {
            self.provider.generate(&ctx.file, &params)
        })
        .await?;

        let segments =
            normalize_json_segments(&raw).ok_or_else(|| TranscriptionError::MalformedResponse {
                provider: ProviderKind::Gemini,
                detail: "structured output contained no usable segments".to_string(),
            })?;
        let before = segments.len();
        let merged = merge_consecutive_speakers(segments);
        debug!("Merged {} provider segments into {} turns", before, merged.len());

        let provider_segments: Vec<ProviderSegment> =
            merged.into_iter().map(ProviderSegment::from).collect();
        let json = serde_json::to_string(&provider_segments)?;

        let found = count_distinct_speakers(&json);
        if found < ctx.request.speaker_count as usize {
            return Err(TranscriptionError::InsufficientSpeakers {
                found,
                requested: ctx.request.speaker_count,
            });
        }
        Ok(RawTranscriptionResult::json(json))
    }
}

/// Timed segments from the single-speaker provider, for local files within its size limit.
pub struct SingleSpeaker {
    provider: Option<Arc<dyn SingleSpeakerProvider>>,
    retry: RetryPolicy,
}

#[async_trait]
impl Strategy for SingleSpeaker {
    fn name(&self) -> &'static str {
        "single-speaker"
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext,
    ) -> Result<RawTranscriptionResult, TranscriptionError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| {
                TranscriptionError::Skipped("single-speaker provider not configured".to_string())
            })?;
        let path = ctx
            .request
            .media
            .local_path()
            .ok_or_else(|| TranscriptionError::Skipped("media is not a local file".to_string()))?;
        match check_file_size(path, provider.max_file_bytes()) {
            Ok(_) => {}
            Err(e @ TranscriptionError::FileTooLarge { .. }) => {
                return Err(TranscriptionError::Skipped(e.to_string()))
            }
            Err(e) => return Err(e),
        }

        let mime_type = ctx.request.media.mime_type.as_str();
        let segments = retry_with_backoff(&self.retry, "Whisper transcription", || {
            provider.transcribe_segments(path, mime_type)
        })
        .await?;

        let provider_segments: Vec<ProviderSegment> = segments
            .into_iter()
            .map(|s| ProviderSegment {
                speaker: SINGLE_SPEAKER_LABEL.to_string(),
                timestamp: format_clock(s.start),
                text: s.text,
            })
            .collect();
        if provider_segments.is_empty() {
            return Err(TranscriptionError::EmptyResult { provider: ProviderKind::Whisper });
        }
        Ok(RawTranscriptionResult::json(serde_json::to_string(&provider_segments)?))
    }
}

/// Delimited text from the primary provider; accepted even when speakers are missing.
pub struct DelimitedFallback {
    provider: Arc<dyn DiarizingProvider>,
    retry: RetryPolicy,
    tier: ModelTier,
}

#[async_trait]
impl Strategy for DelimitedFallback {
    fn name(&self) -> &'static str {
        "delimited-fallback"
    }

    async fn attempt(
        &self,
        ctx: &StrategyContext,
    ) -> Result<RawTranscriptionResult, TranscriptionError> {
        let params = ctx.params(OutputMode::Text, self.tier);
        let raw = retry_with_backoff(&self.retry, "Gemini text transcription", || {
            self.provider.generate(&ctx.file, &params)
        })
        .await?;

        if raw.trim().is_empty() {
            return Err(TranscriptionError::EmptyResult { provider: ProviderKind::Gemini });
        }

        let found = count_distinct_speakers(&raw);
        if found < ctx.request.speaker_count as usize {
            warn!(
                "Fallback transcript has {} distinct speaker(s), expected {}; keeping it",
                found, ctx.request.speaker_count
            );
        }
        Ok(RawTranscriptionResult::text(raw))
    }
}

/// Run strategies in order until one succeeds.
pub async fn run_strategies(
    strategies: &[Box<dyn Strategy>],
    ctx: &StrategyContext,
) -> Result<RawTranscriptionResult, TranscriptionError> {
    let mut failures = Vec::new();

    for strategy in strategies {
        info!("Transcription: trying {} strategy", strategy.name());
        match strategy.attempt(ctx).await {
            Ok(result) => {
                info!(
                    "Transcription: {} strategy succeeded ({} chars, {:?})",
                    strategy.name(),
                    result.raw.len(),
                    result.mode
                );
                return Ok(result);
            }
            Err(TranscriptionError::Skipped(reason)) => {
                info!("Transcription: {} strategy skipped: {}", strategy.name(), reason);
            }
            Err(e) => {
                warn!("Transcription: {} strategy failed: {}", strategy.name(), e);
                failures.push(StrategyFailure {
                    strategy: strategy.name().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Err(TranscriptionError::AllStrategiesFailed { failures })
}

pub struct Orchestrator {
    primary: Arc<dyn DiarizingProvider>,
    secondary: Option<Arc<dyn SingleSpeakerProvider>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<dyn DiarizingProvider>,
        secondary: Option<Arc<dyn SingleSpeakerProvider>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { primary, secondary, config }
    }

    /// Build the real providers from configuration. The primary key is required.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TranscriptionError> {
        let gemini_key = config
            .gemini_api_key
            .clone()
            .ok_or(TranscriptionError::MissingCredentials(ProviderKind::Gemini))?;
        let models = if config.bypass_model_cache {
            ModelCache::bypassed()
        } else {
            ModelCache::new()
        };
        let primary = GeminiProvider::new(gemini_key)?
            .with_model_override(config.primary_model.clone())
            .with_model_cache(models);

        let secondary: Option<Arc<dyn SingleSpeakerProvider>> = match &config.openai_api_key {
            Some(key) => Some(Arc::new(WhisperProvider::new(key.clone())?)),
            None => {
                info!(
                    "No {} configured; single-speaker transcription disabled",
                    ProviderKind::Whisper.api_key_name()
                );
                None
            }
        };

        Ok(Self::new(Arc::new(primary), secondary, config.orchestrator_config()))
    }

    /// Ordered strategies for a request.
    pub fn plan(&self, request: &TranscriptionRequest) -> Vec<Box<dyn Strategy>> {
        let first: Box<dyn Strategy> = if request.is_multi_speaker() {
            Box::new(StructuredDiarization {
                provider: Arc::clone(&self.primary),
                retry: self.config.retry.clone(),
                tier: self.config.tier,
            })
        } else {
            Box::new(SingleSpeaker {
                provider: self.secondary.clone(),
                retry: self.config.retry.clone(),
            })
        };
        let fallback: Box<dyn Strategy> = Box::new(DelimitedFallback {
            provider: Arc::clone(&self.primary),
            retry: self.config.retry.clone(),
            tier: self.config.tier,
        });
        vec![first, fallback]
    }

    /// Transcribe one request into raw JSON or delimited text.
    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<RawTranscriptionResult, TranscriptionError> {
        info!(
            "Transcription: {} ({} speaker(s), interviewer hint: {:?})",
            request.media.display_name(),
            request.speaker_count,
            request.interviewer_name_hint
        );

        let file = self.stage(&request.media).await?;
        let ctx = StrategyContext {
            request: request.clone(),
            file,
        };
        run_strategies(&self.plan(request), &ctx).await
    }

    /// Make the media addressable by the primary provider, uploading local files.
    pub async fn stage(&self, media: &MediaReference) -> Result<FileRef, TranscriptionError> {
        let path = match &media.source {
            MediaSource::Remote(uri) => {
                return Ok(FileRef {
                    uri: uri.clone(),
                    mime_type: media.mime_type.clone(),
                })
            }
            MediaSource::LocalFile(path) => path,
        };

        let display_name = media.display_name();
        let staged = retry_with_backoff(&self.config.retry, "Gemini file upload", || {
            self.primary.upload_file(path, &media.mime_type, &display_name)
        })
        .await?;
        let staged = self.wait_until_active(staged).await?;

        if staged.uri.is_empty() {
            return Err(TranscriptionError::MalformedResponse {
                provider: ProviderKind::Gemini,
                detail: format!("staged file {} has no URI", staged.name),
            });
        }
        let mime_type = if staged.mime_type.is_empty() {
            media.mime_type.clone()
        } else {
            staged.mime_type
        };
        Ok(FileRef { uri: staged.uri, mime_type })
    }

    async fn wait_until_active(
        &self,
        mut file: StagedFile,
    ) -> Result<StagedFile, TranscriptionError> {
        let started = Instant::now();
        loop {
            match file.state {
                FileState::Active => {
                    info!(
                        "Gemini: {} ready after {:.0}s",
                        file.name,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(file);
                }
                FileState::Failed => {
                    return Err(TranscriptionError::FileProcessing {
                        name: file.name,
                        state: "FAILED".to_string(),
                    });
                }
                FileState::Processing | FileState::Other(_) => {}
            }

            if let Some(limit) = self.config.poll_timeout {
                if started.elapsed() >= limit {
                    return Err(TranscriptionError::FileProcessingTimeout {
                        name: file.name,
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            debug!("Gemini: {} state {:?}, polling again", file.name, file.state);
            tokio::time::sleep(self.config.poll_interval).await;

            let name = file.name.clone();
            file = retry_with_backoff(&self.config.retry, "Gemini file status", || {
                self.primary.get_file(&name)
            })
            .await?;
        }
    }
}
