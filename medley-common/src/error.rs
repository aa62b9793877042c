//! Error types for the Medley workspace.

use thiserror::Error;

/// Result type alias using the Medley error type.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Unified error type for chat sessions and the provider client.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Configuration error (missing credential, bad value). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inference provider rejected or failed the request.
    #[error("Inference request failed: {message}")]
    Inference {
        message: String,
        status_code: Option<u16>,
    },

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uploaded media ended in the provider's failure state.
    #[error("Media processing failed: {0}")]
    MediaProcessingFailed(String),

    /// A media modality was used before any media was attached.
    #[error("No media attached: {0}")]
    MediaNotAttached(String),

    /// PDF text extraction or merging failed.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Readiness polling exceeded its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// Readiness polling was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ChatError>,
    },
}

impl ChatError {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build an inference error from a provider response.
    pub fn inference(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Inference {
            message: message.into(),
            status_code,
        }
    }

    /// Check if this is a fatal configuration error.
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a media processing failure.
    pub const fn is_media_failure(&self) -> bool {
        matches!(self, Self::MediaProcessingFailed(_))
    }

    /// Check if this error ended a poll early (deadline or cancellation).
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout | Self::Cancelled)
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<ChatError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ChatError::Config("no key".into()).is_config());
        assert!(ChatError::MediaProcessingFailed("FAILED".into()).is_media_failure());
        assert!(ChatError::Timeout.is_interrupted());
        assert!(ChatError::Cancelled.is_interrupted());
        assert!(!ChatError::inference("boom", Some(500)).is_config());
    }

    #[test]
    fn test_error_with_context() {
        let err = ChatError::inference("upstream 500", Some(500));
        let with_ctx = err.with_context("submitting turn");
        assert!(matches!(with_ctx, ChatError::WithContext { .. }));
        assert!(with_ctx.to_string().contains("submitting turn"));
    }

    #[test]
    fn test_inference_display_includes_message() {
        let err = ChatError::inference("model overloaded", Some(429));
        assert!(err.to_string().contains("model overloaded"));
    }
}
