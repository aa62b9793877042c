//! HTTP client for the Gemini generative-language API.
//!
//! Auth uses the `x-goog-api-key` header on every request. Endpoints:
//! - `POST /v1beta/models/{model}:generateContent` for chat turns
//! - `POST /upload/v1beta/files` (multipart) for media upload
//! - `GET  /v1beta/{name}` for file state retrieval

use crate::{
    Content, FileHandle, GenerateReply, GenerateRequest, GenerationConfig, InferenceClient, Part,
    TokenUsage,
};
use async_trait::async_trait;
use medley_common::{ChatError, Config, Result};
use reqwest::multipart::{Form, Part as FormPart};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: CandidateContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i64>,
    candidates_token_count: Option<i64>,
    total_token_count: Option<i64>,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    file: UploadMetadataFile<'a>,
}

#[derive(Debug, Serialize)]
struct UploadMetadataFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: FileHandle,
}

// ══════════════════════════════════════════════════════════════════════════════
// CLIENT
// ══════════════════════════════════════════════════════════════════════════════

/// Gemini REST client.
pub struct GeminiClient {
    api_key: String,
    host: String,
    client: Client,
}

impl GeminiClient {
    /// Build a client from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.api_key.clone(),
            host: config.api_host.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn inference_err(message: impl Into<String>, status: Option<u16>) -> ChatError {
        ChatError::inference(message, status)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::inference_err(
            format!("API error ({}): {}", status.as_u16(), body),
            Some(status.as_u16()),
        ))
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateReply> {
        let system_instruction = request.system_instruction.as_ref().map(|sys| Content {
            role: None,
            parts: vec![Part::text(sys.clone())],
        });

        let payload = GenerateContentRequest {
            contents: request.contents,
            system_instruction,
            generation_config: request.generation_config,
        };

        let model_name = if request.model.starts_with("models/") {
            request.model.clone()
        } else {
            format!("models/{}", request.model)
        };

        let url = format!("{}/v1beta/{}:generateContent", self.host, model_name);

        tracing::debug!(model = %request.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::inference_err(format!("Request failed: {e}"), None))?;

        let response = Self::check_status(response).await?;

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Self::inference_err(format!("Failed to parse response: {e}"), None))?;

        // Check for API error in response body
        if let Some(err) = result.error {
            return Err(Self::inference_err(
                format!("API error: {}", err.message),
                None,
            ));
        }

        let candidate = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| Self::inference_err("No candidates in response", None))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = result.usage_metadata.map_or(TokenUsage::default(), |u| {
            TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            }
        });

        tracing::debug!(
            output_tokens = usage.output_tokens,
            finish_reason = ?candidate.finish_reason,
            "Generation complete"
        );

        Ok(GenerateReply {
            text,
            usage,
            finish_reason: candidate.finish_reason,
        })
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileHandle> {
        let url = format!("{}/upload/v1beta/files", self.host);

        let metadata = serde_json::to_string(&UploadMetadata {
            file: UploadMetadataFile { display_name },
        })?;

        let media_part = FormPart::bytes(bytes)
            .file_name(display_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| ChatError::Config(format!("Invalid MIME type '{mime_type}': {e}")))?;

        let form = Form::new()
            .part(
                "metadata",
                FormPart::text(metadata)
                    .mime_str("application/json")
                    .map_err(|e| Self::inference_err(format!("Metadata part: {e}"), None))?,
            )
            .part("file", media_part);

        tracing::info!(%display_name, %mime_type, "Uploading file");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::inference_err(format!("Upload failed: {e}"), None))?;

        let response = Self::check_status(response).await?;

        let result: UploadFileResponse = response
            .json()
            .await
            .map_err(|e| Self::inference_err(format!("Failed to parse upload response: {e}"), None))?;

        tracing::info!(name = %result.file.name, state = ?result.file.state, "File uploaded");

        Ok(result.file)
    }

    async fn get_file(&self, name: &str) -> Result<FileHandle> {
        // `name` already carries the `files/` prefix
        let url = format!("{}/v1beta/{}", self.host, name);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| Self::inference_err(format!("File lookup failed: {e}"), None))?;

        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| Self::inference_err(format!("Failed to parse file response: {e}"), None))
    }
}
