//! Session types: modalities, turns, conversation handles.

mod manager;

pub use manager::SessionManager;

use medley_gemini::Content;

/// The input modality of a conversation.
///
/// Each modality owns at most one live conversation handle at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    /// Plain text chat
    Text,
    /// Chat grounded in one PDF document
    SinglePdf,
    /// Chat grounded in several PDFs, merged in input order
    MultiPdf,
    /// Chat about an uploaded image
    Image,
    /// Chat about an uploaded audio file
    Audio,
    /// Chat about an uploaded video file
    Video,
}

impl Modality {
    /// Whether a turn may only be submitted after media has been attached.
    pub const fn requires_media(self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Whether attached bytes are handled as PDF documents (extracted
    /// locally) rather than uploaded to the provider's file store.
    pub const fn is_document(self) -> bool {
        matches!(self, Self::SinglePdf | Self::MultiPdf)
    }

    /// Whether upload readiness must be polled before use.
    pub const fn needs_readiness_poll(self) -> bool {
        matches!(self, Self::Video)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::SinglePdf => "single-pdf",
            Self::MultiPdf => "multi-pdf",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// A single turn in a transcript. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }

    fn to_content(&self) -> Content {
        match self.speaker {
            Speaker::User => Content::user_text(self.content.clone()),
            Speaker::Assistant => Content::model_text(self.content.clone()),
        }
    }
}

/// Media context bound to a conversation handle.
#[derive(Debug, Clone)]
pub enum MediaAttachment {
    /// Locally extracted document text (PDF modalities).
    Document { text: String },
    /// Reference to a file in the provider's file store.
    File { uri: String, mime_type: String },
}

impl MediaAttachment {
    /// Render the attachment as the leading context entry of a request.
    fn to_context_content(&self) -> Content {
        match self {
            Self::Document { text } => {
                Content::user_text(format!("Document content:\n{text}"))
            }
            Self::File { uri, mime_type } => Content::user_file(uri.clone(), mime_type.clone()),
        }
    }
}

/// One ongoing multi-turn exchange with the inference provider.
///
/// Owned exclusively by the [`SessionManager`]; destroyed and recreated
/// whole on reset, never partially cleared.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    pub modality: Modality,
    pub transcript: Vec<Turn>,
    pub system_instruction: Option<String>,
    pub media: Option<MediaAttachment>,
}

impl ConversationHandle {
    fn new(modality: Modality) -> Self {
        // Only text chat carries a standing instruction; media modalities
        // rely on the attached context instead.
        let system_instruction = match modality {
            Modality::Text => Some(
                "You are a helpful assistant. Your answers need to be positive and accurate."
                    .to_string(),
            ),
            _ => None,
        };
        Self {
            modality,
            transcript: Vec::new(),
            system_instruction,
            media: None,
        }
    }

    /// Contents to send for one request, honoring the transcript policy.
    fn request_contents(
        &self,
        policy: medley_common::TranscriptPolicy,
        user_text: &str,
    ) -> Vec<Content> {
        let mut contents = Vec::new();
        if let Some(media) = &self.media {
            contents.push(media.to_context_content());
        }
        if policy == medley_common::TranscriptPolicy::Full {
            contents.extend(self.transcript.iter().map(Turn::to_content));
        }
        contents.push(Content::user_text(user_text));
        contents
    }
}
