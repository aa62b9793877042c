//! The session manager: one conversation handle per modality, turns routed
//! through the provider client.

use crate::pdf;
use crate::session::{ConversationHandle, MediaAttachment, Modality, Turn};
use medley_common::{ChatError, Config, Result, TranscriptPolicy};
use medley_gemini::{await_file_active, GenerateRequest, InferenceClient, PollConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Owns the keyed store of conversation handles for one user session.
///
/// Single-threaded from the caller's perspective: one outstanding turn at a
/// time, no handle shared across sessions.
pub struct SessionManager {
    client: Arc<dyn InferenceClient>,
    model: String,
    transcript_policy: TranscriptPolicy,
    resend_system_instruction: bool,
    poll: PollConfig,
    handles: HashMap<Modality, ConversationHandle>,
}

impl SessionManager {
    /// Create a manager for one session.
    pub fn new(client: Arc<dyn InferenceClient>, config: &Config) -> Self {
        Self {
            client,
            model: config.model.clone(),
            transcript_policy: config.transcript_policy,
            resend_system_instruction: config.resend_system_instruction,
            poll: PollConfig::from_config(config),
            handles: HashMap::new(),
        }
    }

    /// Fetch the handle for `modality`, creating it lazily.
    ///
    /// `reset` discards any existing handle first, clearing transcript and
    /// media together. Idempotent when `reset` is false.
    pub fn get_or_create(&mut self, modality: Modality, reset: bool) -> &ConversationHandle {
        if reset && self.handles.remove(&modality).is_some() {
            tracing::info!(modality = modality.as_str(), "Session reset");
        }
        self.handles
            .entry(modality)
            .or_insert_with(|| ConversationHandle::new(modality))
    }

    /// The live handle for `modality`, if one exists.
    pub fn handle(&self, modality: Modality) -> Option<&ConversationHandle> {
        self.handles.get(&modality)
    }

    /// Attach media to the handle for `modality`.
    ///
    /// PDF modalities extract text locally (callers merge multi-PDF input
    /// first, preserving order). Other media modalities upload to the
    /// provider's file store; video additionally waits for the file to
    /// leave the pending state, honoring `cancel` and the poll deadline.
    ///
    /// On any failure the handle keeps its previous attachment state, so a
    /// failed video upload never yields a usable handle.
    pub async fn attach_media(
        &mut self,
        modality: Modality,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
        cancel: &CancellationToken,
    ) -> Result<MediaAttachment> {
        if !modality.requires_media() {
            return Err(ChatError::InvalidInput(format!(
                "the '{}' modality takes no media attachment",
                modality.as_str()
            )));
        }

        let attachment = if modality.is_document() {
            let text = pdf::extract_text(&bytes)?;
            tracing::info!(
                modality = modality.as_str(),
                chars = text.len(),
                "Extracted document text"
            );
            MediaAttachment::Document { text }
        } else {
            let uploaded = self
                .client
                .upload_file(bytes, mime_type, display_name)
                .await?;
            let ready = if modality.needs_readiness_poll() {
                await_file_active(self.client.as_ref(), uploaded, &self.poll, cancel).await?
            } else {
                uploaded
            };
            MediaAttachment::File {
                uri: ready.uri,
                mime_type: ready.mime_type,
            }
        };

        let handle = self
            .handles
            .entry(modality)
            .or_insert_with(|| ConversationHandle::new(modality));
        handle.media = Some(attachment.clone());
        Ok(attachment)
    }

    /// Submit one user turn and return the assistant's reply text.
    ///
    /// Provider errors are returned to the caller, not retried, and leave
    /// the transcript untouched so user/assistant turns stay paired.
    pub async fn submit_turn(&mut self, modality: Modality, user_text: &str) -> Result<String> {
        let mut handle = self
            .handles
            .remove(&modality)
            .unwrap_or_else(|| ConversationHandle::new(modality));

        if modality.requires_media() && handle.media.is_none() {
            self.handles.insert(modality, handle);
            return Err(ChatError::MediaNotAttached(format!(
                "attach media before chatting in the '{}' modality",
                modality.as_str()
            )));
        }

        let contents = handle.request_contents(self.transcript_policy, user_text);
        let mut request = GenerateRequest::new(self.model.clone(), contents);
        if self.resend_system_instruction || handle.transcript.is_empty() {
            if let Some(instruction) = &handle.system_instruction {
                request = request.with_system_instruction(instruction.clone());
            }
        }

        let result = self.client.generate(request).await;
        match result {
            Ok(reply) => {
                tracing::debug!(
                    modality = modality.as_str(),
                    input_tokens = reply.usage.input_tokens,
                    output_tokens = reply.usage.output_tokens,
                    "Turn complete"
                );
                handle.transcript.push(Turn::user(user_text));
                handle.transcript.push(Turn::assistant(reply.text.clone()));
                self.handles.insert(modality, handle);
                Ok(reply.text)
            }
            Err(e) => {
                self.handles.insert(modality, handle);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Speaker;
    use async_trait::async_trait;
    use medley_gemini::{FileHandle, FileState, GenerateReply, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock provider client: records every generate request, replays
    /// scripted replies, and walks scripted file states.
    struct MockClient {
        requests: Mutex<Vec<GenerateRequest>>,
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        upload_state: FileState,
        file_states: Mutex<VecDeque<FileState>>,
        get_calls: AtomicUsize,
    }

    impl MockClient {
        fn replying(replies: &[&str]) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(
                    replies.iter().map(|r| Ok((*r).to_string())).collect(),
                ),
                upload_state: FileState::Ready,
                file_states: Mutex::new(VecDeque::new()),
                get_calls: AtomicUsize::new(0),
            }
        }

        fn failing_once_then(reply: &str) -> Self {
            let mut replies: VecDeque<std::result::Result<String, String>> = VecDeque::new();
            replies.push_back(Err("mock provider failure".into()));
            replies.push_back(Ok(reply.to_string()));
            Self {
                replies: Mutex::new(replies),
                ..Self::replying(&[])
            }
        }

        fn with_upload(mut self, upload_state: FileState, later: &[FileState]) -> Self {
            self.upload_state = upload_state;
            self.file_states = Mutex::new(later.iter().copied().collect());
            self
        }

        fn recorded(&self) -> Vec<GenerateRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for MockClient {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateReply> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(GenerateReply {
                    text,
                    usage: TokenUsage::default(),
                    finish_reason: Some("STOP".into()),
                }),
                Some(Err(message)) => Err(ChatError::inference(message, Some(500))),
                None => Ok(GenerateReply {
                    text: "ok".into(),
                    usage: TokenUsage::default(),
                    finish_reason: Some("STOP".into()),
                }),
            }
        }

        async fn upload_file(
            &self,
            _bytes: Vec<u8>,
            mime_type: &str,
            display_name: &str,
        ) -> Result<FileHandle> {
            Ok(FileHandle {
                name: format!("files/{display_name}"),
                uri: format!("https://files.example/{display_name}"),
                mime_type: mime_type.to_string(),
                state: self.upload_state,
            })
        }

        async fn get_file(&self, name: &str) -> Result<FileHandle> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.file_states.lock().unwrap();
            let state = if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                *states.front().unwrap_or(&FileState::Pending)
            };
            Ok(FileHandle {
                name: name.to_string(),
                uri: format!("https://files.example/{name}"),
                mime_type: "video/mp4".into(),
                state,
            })
        }
    }

    fn test_config() -> Config {
        Config {
            api_key: "test".into(),
            api_host: "https://example.invalid".into(),
            model: "gemini-1.5-flash".into(),
            // Zero interval keeps poll tests instant.
            poll_interval_secs: 0,
            poll_deadline_secs: 5,
            transcript_policy: TranscriptPolicy::Full,
            resend_system_instruction: false,
            log_level: "info".into(),
            log_format: "pretty".into(),
        }
    }

    fn manager_with(client: MockClient) -> (Arc<MockClient>, SessionManager) {
        let client = Arc::new(client);
        let manager = SessionManager::new(client.clone(), &test_config());
        (client, manager)
    }

    fn manager_with_policy(
        client: MockClient,
        policy: TranscriptPolicy,
        resend_system: bool,
    ) -> (Arc<MockClient>, SessionManager) {
        let mut config = test_config();
        config.transcript_policy = policy;
        config.resend_system_instruction = resend_system;
        let client = Arc::new(client);
        let manager = SessionManager::new(client.clone(), &config);
        (client, manager)
    }

    #[tokio::test]
    async fn reset_clears_transcript_and_media() {
        let (_, mut manager) = manager_with(MockClient::replying(&["hi"]));

        manager
            .attach_media(
                Modality::Image,
                vec![1, 2, 3],
                "image/png",
                "pic.png",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        manager.submit_turn(Modality::Image, "what is this?").await.unwrap();
        assert_eq!(manager.handle(Modality::Image).unwrap().transcript.len(), 2);

        let handle = manager.get_or_create(Modality::Image, true);
        assert!(handle.transcript.is_empty());
        assert!(handle.media.is_none());
    }

    #[tokio::test]
    async fn reset_clears_every_modality_independently() {
        let (_, mut manager) = manager_with(MockClient::replying(&["a", "b"]));

        manager.submit_turn(Modality::Text, "one").await.unwrap();
        manager.submit_turn(Modality::Text, "two").await.unwrap();
        assert_eq!(manager.handle(Modality::Text).unwrap().transcript.len(), 4);

        assert!(manager.get_or_create(Modality::Text, true).transcript.is_empty());
        // Creating without reset stays idempotent.
        assert!(manager.get_or_create(Modality::Text, false).transcript.is_empty());
    }

    #[tokio::test]
    async fn transcript_is_append_only_and_ordered() {
        let (_, mut manager) = manager_with(MockClient::replying(&["r1", "r2", "r3"]));

        for prompt in ["p1", "p2", "p3"] {
            manager.submit_turn(Modality::Text, prompt).await.unwrap();
        }

        let transcript = &manager.handle(Modality::Text).unwrap().transcript;
        assert_eq!(transcript.len(), 6);
        let flat: Vec<(Speaker, &str)> = transcript
            .iter()
            .map(|t| (t.speaker, t.content.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![
                (Speaker::User, "p1"),
                (Speaker::Assistant, "r1"),
                (Speaker::User, "p2"),
                (Speaker::Assistant, "r2"),
                (Speaker::User, "p3"),
                (Speaker::Assistant, "r3"),
            ]
        );
    }

    #[tokio::test]
    async fn inference_error_leaves_transcript_balanced() {
        let (_, mut manager) = manager_with(MockClient::failing_once_then("recovered"));

        let err = manager.submit_turn(Modality::Text, "boom").await.unwrap_err();
        assert!(matches!(err, ChatError::Inference { .. }));
        assert!(manager.handle(Modality::Text).unwrap().transcript.is_empty());

        let reply = manager.submit_turn(Modality::Text, "again").await.unwrap();
        assert_eq!(reply, "recovered");
        assert_eq!(manager.handle(Modality::Text).unwrap().transcript.len(), 2);
    }

    #[tokio::test]
    async fn full_policy_resends_history_latest_does_not() {
        let (client, mut manager) = manager_with(MockClient::replying(&["r1", "r2"]));
        manager.submit_turn(Modality::Text, "p1").await.unwrap();
        manager.submit_turn(Modality::Text, "p2").await.unwrap();
        let requests = client.recorded();
        assert_eq!(requests[0].contents.len(), 1);
        // prior user turn + prior reply + new turn
        assert_eq!(requests[1].contents.len(), 3);

        let (client, mut manager) = manager_with_policy(
            MockClient::replying(&["r1", "r2"]),
            TranscriptPolicy::Latest,
            false,
        );
        manager.submit_turn(Modality::Text, "p1").await.unwrap();
        manager.submit_turn(Modality::Text, "p2").await.unwrap();
        let requests = client.recorded();
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(requests[1].contents.len(), 1);
    }

    #[tokio::test]
    async fn system_instruction_sent_first_turn_only_by_default() {
        let (client, mut manager) = manager_with(MockClient::replying(&["r1", "r2"]));
        manager.submit_turn(Modality::Text, "p1").await.unwrap();
        manager.submit_turn(Modality::Text, "p2").await.unwrap();

        let requests = client.recorded();
        assert!(requests[0].system_instruction.is_some());
        assert!(requests[1].system_instruction.is_none());
    }

    #[tokio::test]
    async fn system_instruction_resent_when_configured() {
        let (client, mut manager) = manager_with_policy(
            MockClient::replying(&["r1", "r2"]),
            TranscriptPolicy::Full,
            true,
        );
        manager.submit_turn(Modality::Text, "p1").await.unwrap();
        manager.submit_turn(Modality::Text, "p2").await.unwrap();

        let requests = client.recorded();
        assert!(requests[0].system_instruction.is_some());
        assert!(requests[1].system_instruction.is_some());
    }

    #[tokio::test]
    async fn pdf_text_reaches_the_provider_context() {
        let (client, mut manager) = manager_with(MockClient::replying(&["It is 42."]));
        let pdf_bytes = pdf::fixture_pdf(&["Invoice #42"]);

        manager
            .attach_media(
                Modality::SinglePdf,
                pdf_bytes,
                "application/pdf",
                "invoice.pdf",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        manager
            .submit_turn(Modality::SinglePdf, "What is the invoice number?")
            .await
            .unwrap();

        let requests = client.recorded();
        assert_eq!(requests.len(), 1);
        let context_text = requests[0].contents[0].parts[0]
            .text
            .as_deref()
            .unwrap_or_default();
        assert!(
            context_text.contains("Invoice #42"),
            "context was: {context_text}"
        );
    }

    #[tokio::test]
    async fn media_modality_without_attachment_is_rejected() {
        let (client, mut manager) = manager_with(MockClient::replying(&[]));

        let err = manager.submit_turn(Modality::Audio, "hello?").await.unwrap_err();
        assert!(matches!(err, ChatError::MediaNotAttached(_)));
        assert!(client.recorded().is_empty());
    }

    #[tokio::test]
    async fn attaching_media_to_text_is_invalid() {
        let (_, mut manager) = manager_with(MockClient::replying(&[]));

        let err = manager
            .attach_media(
                Modality::Text,
                vec![0],
                "image/png",
                "pic.png",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn video_attach_polls_until_ready() {
        let (client, mut manager) = manager_with(MockClient::replying(&["a lake"]).with_upload(
            FileState::Pending,
            &[FileState::Pending, FileState::Ready],
        ));

        let attachment = manager
            .attach_media(
                Modality::Video,
                vec![0; 16],
                "video/mp4",
                "clip.mp4",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(client.get_calls.load(Ordering::SeqCst), 2);
        match attachment {
            MediaAttachment::File { mime_type, .. } => assert_eq!(mime_type, "video/mp4"),
            other => panic!("expected file attachment, got {other:?}"),
        }

        let reply = manager
            .submit_turn(Modality::Video, "what is shown?")
            .await
            .unwrap();
        assert_eq!(reply, "a lake");
        // media context file part + the user turn
        let request = &client.recorded()[0];
        assert_eq!(request.contents.len(), 2);
        assert!(request.contents[0].parts[0].file_data.is_some());
    }

    #[tokio::test]
    async fn failed_video_never_yields_a_usable_handle() {
        let (_, mut manager) = manager_with(
            MockClient::replying(&[]).with_upload(FileState::Pending, &[FileState::Failed]),
        );

        let err = manager
            .attach_media(
                Modality::Video,
                vec![0; 16],
                "video/mp4",
                "clip.mp4",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_media_failure());

        let err = manager.submit_turn(Modality::Video, "anything").await.unwrap_err();
        assert!(matches!(err, ChatError::MediaNotAttached(_)));
    }

    #[tokio::test]
    async fn cancelled_video_poll_surfaces_cancellation() {
        let (_, mut manager) = manager_with(
            MockClient::replying(&[]).with_upload(FileState::Pending, &[FileState::Pending]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .attach_media(Modality::Video, vec![0; 16], "video/mp4", "clip.mp4", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Cancelled));
    }
}
