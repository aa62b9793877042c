//! Gemini REST client for the Medley workspace.
//!
//! Provides a trait-based interface to the generative-language API:
//! chat generation (`models/{model}:generateContent`), file upload
//! (`upload/v1beta/files`), and file state retrieval (`v1beta/files/{id}`)
//! with a cancellable readiness poll on top.
//!
//! The session layer talks to [`InferenceClient`] only, so tests can swap
//! the real HTTP client for a mock.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

mod client;
mod poll;

pub use client::GeminiClient;
pub use poll::{await_file_active, PollConfig};

use async_trait::async_trait;
use medley_common::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// Client Trait
// ============================================================================

/// Interface to the inference provider.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run one generation request and return the assistant reply.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateReply>;

    /// Upload raw bytes to the provider's file store.
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileHandle>;

    /// Fetch the current state of a previously uploaded file.
    ///
    /// `name` is the provider-assigned identifier (`files/...`).
    async fn get_file(&self, name: &str) -> Result<FileHandle>;
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A generation request at the domain level.
///
/// The client converts this into the provider wire format; callers never
/// build HTTP payloads directly.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model to use
    pub model: String,
    /// Conversation contents, in order
    pub contents: Vec<Content>,
    /// System instruction, if any
    pub system_instruction: Option<String>,
    /// Sampling and output controls, if any
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    /// Create a request with provider defaults for everything optional.
    pub fn new(model: impl Into<String>, contents: Vec<Content>) -> Self {
        Self {
            model: model.into(),
            contents,
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Attach a system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Attach sampling and output controls.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

/// Sampling and output controls sent with a generation request.
///
/// Every field is optional; unset fields fall back to the provider's model
/// defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
}

/// One entry in the `contents` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part::text(text)],
        }
    }

    /// An assistant (model) text message.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("model".into()),
            parts: vec![Part::text(text)],
        }
    }

    /// A user message referencing an uploaded file.
    pub fn user_file(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part::file(uri, mime_type)],
        }
    }
}

/// A message part: either inline text or a reference to an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    /// An inline text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_data: None,
        }
    }

    /// A part referencing a stored file by URI.
    pub fn file(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                file_uri: uri.into(),
                mime_type: mime_type.into(),
            }),
        }
    }
}

/// Reference to a file held in the provider's file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    pub mime_type: String,
}

/// Assistant reply plus usage accounting.
#[derive(Debug, Clone)]
pub struct GenerateReply {
    /// Response text
    pub text: String,
    /// Token usage reported by the provider
    pub usage: TokenUsage,
    /// Finish reason, when reported
    pub finish_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

// ============================================================================
// File Store Types
// ============================================================================

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    /// Still being processed; not yet usable in a request.
    #[serde(rename = "PROCESSING")]
    Pending,
    /// Ready to be referenced from generation requests.
    #[serde(rename = "ACTIVE")]
    Ready,
    /// Processing failed; the file will never become usable.
    #[serde(rename = "FAILED")]
    Failed,
    /// Any state this client does not know about.
    #[serde(other)]
    Unknown,
}

impl FileState {
    /// Whether the file can be referenced from a generation request.
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether the provider reported a terminal failure.
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// A file as reported by the provider's file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    /// Provider-assigned identifier (`files/...`)
    pub name: String,
    /// URI used to reference the file from generation requests
    #[serde(default)]
    pub uri: String,
    /// MIME type recorded at upload
    #[serde(default)]
    pub mime_type: String,
    /// Current processing state
    pub state: FileState,
}
