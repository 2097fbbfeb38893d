use std::cmp::Reverse;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::prompts::transcription_prompt;
use super::ProviderKind;
use crate::error::TranscriptionError;
use crate::media::OutputMode;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: ProviderKind = ProviderKind::Gemini;
const MAX_OUTPUT_TOKENS: u32 = 65536;
const STRUCTURED_TEMPERATURE: f64 = 0.1;
const TEXT_TEMPERATURE: f64 = 0.2;
const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
/// Model-name fragments that mark variants unsuitable for long-form transcription.
const EXCLUDED_MODEL_MARKERS: &[&str] = &[
    "exp",
    "preview",
    "tts",
    "image",
    "live",
    "lite",
    "thinking",
    "audio",
    "embedding",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    Pro,
    Flash,
}

impl ModelTier {
    fn keyword(&self) -> &'static str {
        match self {
            ModelTier::Pro => "pro",
            ModelTier::Flash => "flash",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ModelTier::Pro => "gemini-2.5-pro",
            ModelTier::Flash => "gemini-2.5-flash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
    Other(String),
}

impl FileState {
    fn parse(state: Option<&str>) -> Self {
        match state.unwrap_or("") {
            "PROCESSING" => FileState::Processing,
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            other => FileState::Other(other.to_string()),
        }
    }
}

/// A file held by the provider's file-staging service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// What a generation call points the model at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub speaker_count: u32,
    pub interviewer_name_hint: String,
    pub output_mode: OutputMode,
    pub tier: ModelTier,
}

/// Diarization-capable multimodal provider.
#[async_trait]
pub trait DiarizingProvider: Send + Sync {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<StagedFile, TranscriptionError>;

    async fn get_file(&self, name: &str) -> Result<StagedFile, TranscriptionError>;

    /// Returns the provider's raw text output; never an empty string.
    async fn generate(
        &self,
        file: &FileRef,
        params: &GenerationParams,
    ) -> Result<String, TranscriptionError>;
}

/// Best model identifier per quality tier, resolved at most once per tier.
#[derive(Debug, Default)]
pub struct ModelCache {
    pro: OnceCell<String>,
    flash: OnceCell<String>,
    bypass: bool,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that never stores, so every lookup resolves afresh.
    pub fn bypassed() -> Self {
        Self { bypass: true, ..Self::default() }
    }

    fn cell(&self, tier: ModelTier) -> &OnceCell<String> {
        match tier {
            ModelTier::Pro => &self.pro,
            ModelTier::Flash => &self.flash,
        }
    }

    pub fn get(&self, tier: ModelTier) -> Option<String> {
        if self.bypass {
            return None;
        }
        self.cell(tier).get().cloned()
    }

    /// Concurrent first lookups may both resolve; the first stored value wins.
    pub fn store(&self, tier: ModelTier, model: String) {
        if !self.bypass {
            let _ = self.cell(tier).set(model);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: Option<String>,
}

impl From<FileResource> for StagedFile {
    fn from(file: FileResource) -> Self {
        StagedFile {
            state: FileState::parse(file.state.as_deref()),
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Pick the highest-versioned stable model of a tier from a model listing.
pub fn pick_best_model(models: &[ModelInfo], tier: ModelTier) -> Option<String> {
    let tier_marker = format!("-{}", tier.keyword());
    models
        .iter()
        .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
        .map(|m| m.name.trim_start_matches("models/"))
        .filter(|name| name.starts_with("gemini-") && name.contains(&tier_marker))
        .filter(|name| !EXCLUDED_MODEL_MARKERS.iter().any(|marker| name.contains(marker)))
        .filter_map(|name| model_version(name).map(|version| (version, name)))
        .max_by_key(|(version, name)| (*version, Reverse(name.len())))
        .map(|(_, name)| name.to_string())
}

/// "gemini-2.5-pro-002" -> (2, 5)
fn model_version(name: &str) -> Option<(u32, u32)> {
    let version = name.strip_prefix("gemini-")?.split('-').next()?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map(|m| m.parse().ok()).unwrap_or(Some(0))?;
    Some((major, minor))
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_override: Option<String>,
    models: ModelCache,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600)) // 10 min for uploads and long generations
            .build()
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            model_override: None,
            models: ModelCache::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_model_cache(mut self, models: ModelCache) -> Self {
        self.models = models;
        self
    }

    /// Model used for a tier: the override, the cached choice, or a fresh lookup.
    pub async fn resolve_model(&self, tier: ModelTier) -> String {
        if let Some(model) = &self.model_override {
            return model.clone();
        }
        if let Some(model) = self.models.get(tier) {
            return model;
        }

        let model = match self.list_models().await {
            Ok(models) => pick_best_model(&models, tier).unwrap_or_else(|| {
                warn!("Gemini: no {:?} model in listing, using {}", tier, tier.default_model());
                tier.default_model().to_string()
            }),
            Err(e) => {
                warn!("Gemini: model listing failed ({}), using {}", e, tier.default_model());
                tier.default_model().to_string()
            }
        };
        info!("Gemini: using model {} for {:?} tier", model, tier);
        self.models.store(tier, model.clone());
        model
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, TranscriptionError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/v1beta/models", self.base_url))
                .query(&[("key", self.api_key.as_str()), ("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListModelsResponse = self.send_json(request).await?;
            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TranscriptionError> {
        let response = request
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
        serde_json::from_str(&body).map_err(|e| TranscriptionError::MalformedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })
    }

    fn generation_body(file: &FileRef, params: &GenerationParams) -> serde_json::Value {
        let mut generation_config = serde_json::json!({
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
        });
        match params.output_mode {
            OutputMode::Json => {
                generation_config["temperature"] = serde_json::json!(STRUCTURED_TEMPERATURE);
                generation_config["responseMimeType"] = serde_json::json!("application/json");
                generation_config["responseSchema"] = serde_json::json!({
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "speaker": {"type": "STRING"},
                            "timestamp": {"type": "STRING"},
                            "text": {"type": "STRING"}
                        },
                        "required": ["speaker", "timestamp", "text"]
                    }
                });
            }
            OutputMode::Text => {
                generation_config["temperature"] = serde_json::json!(TEXT_TEMPERATURE);
                generation_config["responseMimeType"] = serde_json::json!("text/plain");
            }
        }

        let safety_settings: Vec<serde_json::Value> = HARM_CATEGORIES
            .iter()
            .map(|category| serde_json::json!({"category": category, "threshold": "BLOCK_NONE"}))
            .collect();

        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"fileData": {"mimeType": file.mime_type, "fileUri": file.uri}},
                    {"text": transcription_prompt(params)}
                ]
            }],
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
        })
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, TranscriptionError> {
    if response.candidates.is_empty() {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(TranscriptionError::Blocked { provider: PROVIDER, reason });
        }
        return Err(TranscriptionError::EmptyResult { provider: PROVIDER });
    }

    let candidate = &response.candidates[0];
    let text: String = candidate
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "RECITATION")) => {
                Err(TranscriptionError::Blocked { provider: PROVIDER, reason: reason.to_string() })
            }
            _ => Err(TranscriptionError::EmptyResult { provider: PROVIDER }),
        };
    }

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        warn!("Gemini: output hit the token limit and may be truncated");
    }
    Ok(text)
}

#[async_trait]
impl DiarizingProvider for GeminiProvider {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<StagedFile, TranscriptionError> {
        let bytes = tokio::fs::read(path).await?;
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
        info!("Gemini: uploading {} ({:.1}MB)...", display_name, size_mb);

        // Step 1: open a resumable upload session
        let start_response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({"file": {"display_name": display_name}}))
            .send()
            .await
            .map_err(|source| TranscriptionError::Http { provider: PROVIDER, source })?;

        if !start_response.status().is_success() {
            return Err(TranscriptionError::from_response(PROVIDER, start_response).await);
        }

        let upload_url = start_response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TranscriptionError::MalformedResponse {
                provider: PROVIDER,
                detail: "upload session did not return an upload URL".to_string(),
            })?;

        // Step 2: send the bytes and finalize
        let request = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes);
        let uploaded: UploadResponse = self.send_json(request).await?;

        debug!("Gemini: uploaded as {} ({:?})", uploaded.file.name, uploaded.file.state);
        Ok(uploaded.file.into())
    }

    async fn get_file(&self, name: &str) -> Result<StagedFile, TranscriptionError> {
        let request = self
            .client
            .get(format!("{}/v1beta/{}", self.base_url, name))
            .query(&[("key", self.api_key.as_str())]);
        let file: FileResource = self.send_json(request).await?;
        Ok(file.into())
    }

    async fn generate(
        &self,
        file: &FileRef,
        params: &GenerationParams,
    ) -> Result<String, TranscriptionError> {
        let model = self.resolve_model(params.tier).await;
        let body = Self::generation_body(file, params);

        info!(
            "Gemini: requesting {:?} transcription from {} ({} speaker(s))",
            params.output_mode, model, params.speaker_count
        );

        let request = self
            .client
            .post(format!("{}/v1beta/models/{}:generateContent", self.base_url, model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response: GenerateResponse = self.send_json(request).await?;

        let text = extract_text(response)?;
        debug!("Gemini: received {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> ModelInfo {
        ModelInfo {
            name: format!("models/{}", name),
            supported_generation_methods: vec![
                "generateContent".to_string(),
                "countTokens".to_string(),
            ],
        }
    }

    #[test]
    fn test_pick_best_model_prefers_newest_stable() {
        let models = vec![
            model("gemini-1.5-pro"),
            model("gemini-2.5-pro"),
            model("gemini-2.5-pro-preview-06-05"),
            model("gemini-2.0-flash"),
            model("gemini-2.5-flash"),
            model("gemini-2.5-flash-lite"),
            model("gemini-3.0-pro-exp"),
        ];
        assert_eq!(pick_best_model(&models, ModelTier::Pro).as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(pick_best_model(&models, ModelTier::Flash).as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn test_pick_best_model_requires_generate_content() {
        let models = vec![ModelInfo {
            name: "models/gemini-2.5-pro".to_string(),
            supported_generation_methods: vec!["embedContent".to_string()],
        }];
        assert!(pick_best_model(&models, ModelTier::Pro).is_none());
    }

    #[test]
    fn test_model_version() {
        assert_eq!(model_version("gemini-2.5-pro"), Some((2, 5)));
        assert_eq!(model_version("gemini-2-flash"), Some((2, 0)));
        assert_eq!(model_version("gemma-3"), None);
    }

    #[test]
    fn test_model_cache_memoizes_first_value() {
        let cache = ModelCache::new();
        assert!(cache.get(ModelTier::Pro).is_none());
        cache.store(ModelTier::Pro, "gemini-2.5-pro".to_string());
        cache.store(ModelTier::Pro, "gemini-1.5-pro".to_string());
        assert_eq!(cache.get(ModelTier::Pro).as_deref(), Some("gemini-2.5-pro"));
        assert!(cache.get(ModelTier::Flash).is_none());
    }

    #[test]
    fn test_bypassed_cache_never_stores() {
        let cache = ModelCache::bypassed();
        cache.store(ModelTier::Pro, "gemini-2.5-pro".to_string());
        assert!(cache.get(ModelTier::Pro).is_none());
    }

    #[tokio::test]
    async fn test_override_skips_resolution() {
        let provider = GeminiProvider::new("test_key")
            .unwrap()
            .with_base_url("http://127.0.0.1:9")
            .with_model_override(Some("gemini-custom".to_string()));
        assert_eq!(provider.resolve_model(ModelTier::Pro).await, "gemini-custom");
    }

    #[test]
    fn test_structured_body_has_schema_and_safety() {
        let file = FileRef {
            uri: "https://generativelanguage.googleapis.com/v1beta/files/abc".to_string(),
            mime_type: "audio/mp4".to_string(),
        };
        let params = GenerationParams {
            speaker_count: 2,
            interviewer_name_hint: "Kim".to_string(),
            output_mode: OutputMode::Json,
            tier: ModelTier::Pro,
        };
        let body = GeminiProvider::generation_body(&file, &params);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), HARM_CATEGORIES.len());
        assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_NONE");
        assert_eq!(body["contents"][0]["parts"][0]["fileData"]["fileUri"], file.uri);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"speaker\":"},{"text":"\"A\"}]"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), r#"[{"speaker":"A"}]"#);
    }

    #[test]
    fn test_extract_text_reports_blocks_and_empties() {
        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap();
        assert!(matches!(extract_text(blocked), Err(TranscriptionError::Blocked { .. })));

        let json = r#"{"candidates":[{"content":{"parts":[{"text":"  "}]},"finishReason":"STOP"}]}"#;
        let empty: GenerateResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(extract_text(empty), Err(TranscriptionError::EmptyResult { .. })));
    }

    #[test]
    fn test_file_state_parse() {
        assert_eq!(FileState::parse(Some("ACTIVE")), FileState::Active);
        assert_eq!(FileState::parse(Some("FAILED")), FileState::Failed);
        assert_eq!(FileState::parse(None), FileState::Other(String::new()));
    }
}
