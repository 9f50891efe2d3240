//! # Audio Reply Pipeline
//!
//! Turns one uploaded clip into a spoken reply within a conversation:
//!
//! 1. Validate the upload and conversation id
//! 2. Resolve the conversation (404 if unknown)
//! 3. Transcribe the clip
//! 4. Append the `user` turn
//! 5. Build the full `{role, content}` history, seed instruction included
//! 6. Generate a reply (placeholder when the model returns nothing)
//! 7. Append the `assistant` turn (real replies only)
//! 8. Synthesize speech (real replies only, best-effort)
//! 9. Delete the temporary upload
//!
//! Collaborators and the store are injected, so the pipeline never knows which
//! provider or storage backend it talks to.
//!
//! ## Cleanup:
//! The upload is deleted exactly once on every exit path, including the 4xx
//! validation exits.

use crate::audio::TempUpload;
use crate::conversation::{ConversationMessage, ConversationStore};
use crate::error::AppError;
use crate::providers::{AudioClip, DialogueModel, ProviderError, SpeechSynthesizer, Transcriber};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Reported as the reply when the dialogue model produced no content.
///
/// A model reply that is literally this text is treated the same way.
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response generated";

/// Failures of one pipeline run.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("No audio file provided")]
    MissingAudio,

    #[error("Conversation ID is required. Please pass it as a query parameter: /record?conversationId=YOUR_ID")]
    MissingConversationId,

    #[error("Conversation not found. Please start a new conversation.")]
    ConversationNotFound,

    #[error("{0}")]
    Transcription(#[source] ProviderError),

    #[error("{0}")]
    Dialogue(#[source] ProviderError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<ReplyError> for AppError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::MissingAudio | ReplyError::MissingConversationId => {
                AppError::BadRequest(err.to_string())
            }
            ReplyError::ConversationNotFound => AppError::NotFound(err.to_string()),
            ReplyError::Transcription(_) | ReplyError::Dialogue(_) | ReplyError::Io(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioReply {
    pub conversation_id: String,
    pub transcription: String,
    /// The generated reply, or [`NO_RESPONSE_PLACEHOLDER`]
    pub ai_response: String,
    /// Base64 (standard, padded) synthesized speech; `None` when synthesis was skipped or failed
    pub audio_base64: Option<String>,
}

/// Orchestrates store and collaborators for `/record`.
#[derive(Clone)]
pub struct AudioReplyPipeline {
    store: Arc<dyn ConversationStore>,
    transcriber: Arc<dyn Transcriber>,
    dialogue: Arc<dyn DialogueModel>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl std::fmt::Debug for AudioReplyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioReplyPipeline")
            .field("conversations", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl AudioReplyPipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        transcriber: Arc<dyn Transcriber>,
        dialogue: Arc<dyn DialogueModel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            store,
            transcriber,
            dialogue,
            synthesizer,
        }
    }

    /// Run the pipeline for one upload.
    ///
    /// ## Parameters:
    /// - **upload**: the temporary file, if the request carried one
    /// - **conversation_id**: already resolved from query (preferred) or body
    ///
    /// The upload is consumed and always deleted before this returns.
    pub async fn process(
        &self,
        upload: Option<TempUpload>,
        conversation_id: Option<String>,
    ) -> Result<AudioReply, ReplyError> {
        let Some(mut upload) = upload else {
            return Err(ReplyError::MissingAudio);
        };

        let result = self.run(&upload, conversation_id).await;

        if let Err(e) = upload.cleanup().await {
            match &result {
                // A failed delete after a successful reply is a server failure
                Ok(_) => {
                    error!(error = %e, "Failed to remove temporary upload");
                    return Err(ReplyError::Io(e));
                }
                Err(_) => warn!(error = %e, "Failed to remove temporary upload after error"),
            }
        }

        result
    }

    async fn run(
        &self,
        upload: &TempUpload,
        conversation_id: Option<String>,
    ) -> Result<AudioReply, ReplyError> {
        let conversation_id = conversation_id
            .filter(|id| !id.is_empty())
            .ok_or(ReplyError::MissingConversationId)?;

        if self.store.get(&conversation_id).is_none() {
            return Err(ReplyError::ConversationNotFound);
        }

        let started = Instant::now();

        let data = upload.read().await?;
        let clip = AudioClip::mp3(data, upload.original_name());
        let transcription = self
            .transcriber
            .transcribe(clip)
            .await
            .map_err(ReplyError::Transcription)?;
        debug!(
            conversation_id = %conversation_id,
            upload_bytes = upload.size_bytes(),
            chars = transcription.len(),
            "Audio transcribed"
        );

        if !self
            .store
            .append(&conversation_id, ConversationMessage::user(transcription.clone()))
        {
            return Err(ReplyError::ConversationNotFound);
        }

        let history = self
            .store
            .get(&conversation_id)
            .ok_or(ReplyError::ConversationNotFound)?
            .chat_history();

        let reply = self
            .dialogue
            .generate_reply(&history)
            .await
            .map_err(ReplyError::Dialogue)?
            .filter(|text| !text.is_empty() && text != NO_RESPONSE_PLACEHOLDER);

        let audio_base64 = match &reply {
            Some(text) => {
                self.store
                    .append(&conversation_id, ConversationMessage::assistant(text.clone()));
                self.synthesize_best_effort(&conversation_id, text).await
            }
            None => {
                warn!(conversation_id = %conversation_id, "Dialogue model returned no content");
                None
            }
        };

        info!(
            conversation_id = %conversation_id,
            history_len = history.len(),
            has_audio = audio_base64.is_some(),
            duration_ms = %started.elapsed().as_millis(),
            "Audio reply generated"
        );

        Ok(AudioReply {
            conversation_id,
            transcription,
            ai_response: reply.unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string()),
            audio_base64,
        })
    }

    /// Synthesis failures degrade the reply (no audio) instead of failing it.
    async fn synthesize_best_effort(&self, conversation_id: &str, text: &str) -> Option<String> {
        match self.synthesizer.synthesize(text).await {
            Ok(audio) => Some(STANDARD.encode(audio)),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Speech synthesis failed, replying without audio");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conversation::{ChatMessage, InMemoryConversationStore, Role};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted collaborator implementing all three provider traits.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub transcript: Option<String>,
        pub replies: Mutex<Vec<Option<String>>>,
        pub fail_transcription: bool,
        pub fail_dialogue: bool,
        pub fail_synthesis: bool,
        pub seen_histories: Mutex<Vec<Vec<ChatMessage>>>,
        pub synthesized: Mutex<Vec<String>>,
        /// Runs inside `transcribe`, before it returns
        pub on_transcribe: Option<Box<dyn Fn() + Send + Sync>>,
    }

    impl FakeProvider {
        pub(crate) fn replying(transcript: &str, reply: &str) -> Self {
            Self {
                transcript: Some(transcript.to_string()),
                replies: Mutex::new(vec![Some(reply.to_string())]),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeProvider {
        async fn transcribe(&self, audio: AudioClip) -> Result<String, ProviderError> {
            if self.fail_transcription {
                return Err(ProviderError::RequestFailed("transcription down".to_string()));
            }
            assert!(!audio.data.is_empty());
            if let Some(hook) = &self.on_transcribe {
                hook();
            }
            Ok(self.transcript.clone().unwrap_or_default())
        }
    }

    #[async_trait]
    impl DialogueModel for FakeProvider {
        async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<Option<String>, ProviderError> {
            self.seen_histories.lock().unwrap().push(messages.to_vec());
            if self.fail_dialogue {
                return Err(ProviderError::Api {
                    status: 500,
                    message: "model overloaded".to_string(),
                });
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                Ok(replies.remove(0))
            } else {
                Ok(replies.first().cloned().flatten())
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeProvider {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
            self.synthesized.lock().unwrap().push(text.to_string());
            if self.fail_synthesis {
                return Err(ProviderError::RequestFailed("tts down".to_string()));
            }
            Ok(b"fake audio".to_vec())
        }
    }

    fn pipeline(store: Arc<InMemoryConversationStore>, provider: Arc<FakeProvider>) -> AudioReplyPipeline {
        AudioReplyPipeline::new(store, provider.clone(), provider.clone(), provider)
    }

    fn upload_in(dir: &tempfile::TempDir) -> (TempUpload, PathBuf) {
        let path = dir.path().join(format!("{}-test.mp3", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"ID3 fake mp3").unwrap();
        (TempUpload::new(path.clone(), "test.mp3"), path)
    }

    fn setup(provider: FakeProvider) -> (Arc<InMemoryConversationStore>, Arc<FakeProvider>, AudioReplyPipeline, String) {
        let store = Arc::new(InMemoryConversationStore::new("Be a tutor"));
        let provider = Arc::new(provider);
        let pipeline = pipeline(store.clone(), provider.clone());
        let id = store.create(None);
        (store, provider, pipeline, id)
    }

    #[tokio::test]
    async fn test_missing_audio() {
        let (_, _, pipeline, id) = setup(FakeProvider::replying("hi", "hello there"));
        let err = pipeline.process(None, Some(id)).await.unwrap_err();

        assert!(matches!(err, ReplyError::MissingAudio));
        assert_eq!(err.to_string(), "No audio file provided");
    }

    #[tokio::test]
    async fn test_missing_conversation_id_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, pipeline, _) = setup(FakeProvider::replying("hi", "hello there"));

        for id in [None, Some(String::new())] {
            let (upload, path) = upload_in(&dir);
            let err = pipeline.process(Some(upload), id).await.unwrap_err();
            assert!(matches!(err, ReplyError::MissingConversationId));
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);
        let (store, provider, pipeline, _) = setup(FakeProvider::replying("hi", "hello there"));

        let err = pipeline
            .process(Some(upload), Some("unknown-id".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ReplyError::ConversationNotFound));
        assert!(matches!(AppError::from(err), AppError::NotFound(_)));
        assert!(!path.exists());
        assert!(provider.seen_histories.lock().unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_successful_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);
        let (store, provider, pipeline, id) = setup(FakeProvider::replying("hi", "hello there"));

        let reply = pipeline.process(Some(upload), Some(id.clone())).await.unwrap();

        assert_eq!(reply.conversation_id, id);
        assert_eq!(reply.transcription, "hi");
        assert_eq!(reply.ai_response, "hello there");
        assert_eq!(reply.audio_base64.as_deref(), Some(STANDARD.encode(b"fake audio").as_str()));
        assert!(!path.exists());

        let conversation = store.get(&id).unwrap();
        let turns: Vec<(Role, &str)> = conversation
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![(Role::System, "Be a tutor"), (Role::User, "hi"), (Role::Assistant, "hello there")]
        );

        // Seed included, new user turn sent once
        let histories = provider.seen_histories.lock().unwrap();
        assert_eq!(
            histories[0],
            vec![ChatMessage::new(Role::System, "Be a tutor"), ChatMessage::new(Role::User, "hi")]
        );
    }

    #[tokio::test]
    async fn test_synthesis_failure_degrades_response() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);
        let provider = FakeProvider {
            fail_synthesis: true,
            ..FakeProvider::replying("hi", "hello there")
        };
        let (store, _, pipeline, id) = setup(provider);

        let reply = pipeline.process(Some(upload), Some(id.clone())).await.unwrap();

        assert_eq!(reply.transcription, "hi");
        assert_eq!(reply.ai_response, "hello there");
        assert!(reply.audio_base64.is_none());
        assert_eq!(store.get(&id).unwrap().messages.len(), 3);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_reply_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, _) = upload_in(&dir);
        let provider = FakeProvider {
            transcript: Some("hi".to_string()),
            replies: Mutex::new(vec![None]),
            ..FakeProvider::default()
        };
        let (store, provider, pipeline, id) = setup(provider);

        let reply = pipeline.process(Some(upload), Some(id.clone())).await.unwrap();

        assert_eq!(reply.ai_response, NO_RESPONSE_PLACEHOLDER);
        assert!(reply.audio_base64.is_none());
        assert!(provider.synthesized.lock().unwrap().is_empty());

        let roles: Vec<Role> = store.get(&id).unwrap().messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[tokio::test]
    async fn test_empty_string_reply_is_treated_as_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, _) = upload_in(&dir);
        let provider = FakeProvider {
            transcript: Some("hi".to_string()),
            replies: Mutex::new(vec![Some(String::new())]),
            ..FakeProvider::default()
        };
        let (store, _, pipeline, id) = setup(provider);

        let reply = pipeline.process(Some(upload), Some(id.clone())).await.unwrap();

        assert_eq!(reply.ai_response, NO_RESPONSE_PLACEHOLDER);
        assert_eq!(store.get(&id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_placeholder_text_from_model_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, _) = upload_in(&dir);
        let (store, provider, pipeline, id) = setup(FakeProvider::replying("hi", NO_RESPONSE_PLACEHOLDER));

        let reply = pipeline.process(Some(upload), Some(id.clone())).await.unwrap();

        assert_eq!(reply.ai_response, NO_RESPONSE_PLACEHOLDER);
        assert!(reply.audio_base64.is_none());
        assert!(provider.synthesized.lock().unwrap().is_empty());
        assert_eq!(store.get(&id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_success_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);

        // Swap the clip for a non-empty directory once it has been read
        let swap_path = path.clone();
        let provider = FakeProvider {
            on_transcribe: Some(Box::new(move || {
                std::fs::remove_file(&swap_path).unwrap();
                std::fs::create_dir(&swap_path).unwrap();
                std::fs::write(swap_path.join("keep"), b"x").unwrap();
            })),
            ..FakeProvider::replying("hi", "hello there")
        };
        let (store, _, pipeline, id) = setup(provider);

        let err = pipeline.process(Some(upload), Some(id.clone())).await.unwrap_err();

        assert!(matches!(err, ReplyError::Io(_)));
        assert!(matches!(AppError::from(err), AppError::Internal(_)));
        // The turns were already recorded before cleanup ran
        assert_eq!(store.get(&id).unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_transcription_failure_is_internal_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);
        let provider = FakeProvider {
            fail_transcription: true,
            ..FakeProvider::default()
        };
        let (store, _, pipeline, id) = setup(provider);

        let err = pipeline.process(Some(upload), Some(id.clone())).await.unwrap_err();

        assert_eq!(err.to_string(), "Request failed: transcription down");
        assert!(matches!(AppError::from(err), AppError::Internal(_)));
        assert!(!path.exists());
        assert_eq!(store.get(&id).unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_dialogue_failure_keeps_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        let (upload, path) = upload_in(&dir);
        let provider = FakeProvider {
            transcript: Some("hi".to_string()),
            fail_dialogue: true,
            ..FakeProvider::default()
        };
        let (store, provider, pipeline, id) = setup(provider);

        let err = pipeline.process(Some(upload), Some(id.clone())).await.unwrap_err();

        assert!(matches!(err, ReplyError::Dialogue(_)));
        assert!(!path.exists());
        assert!(provider.synthesized.lock().unwrap().is_empty());
        // The user turn was appended before the dialogue call failed
        assert_eq!(store.get(&id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_turns_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            transcript: Some("again".to_string()),
            replies: Mutex::new(vec![
                Some("one".to_string()),
                None,
                Some("three".to_string()),
            ]),
            ..FakeProvider::default()
        };
        let (store, provider, pipeline, id) = setup(provider);

        for _ in 0..3 {
            let (upload, _) = upload_in(&dir);
            pipeline.process(Some(upload), Some(id.clone())).await.unwrap();
        }

        let turns: Vec<(Role, String)> = store
            .get(&id)
            .unwrap()
            .messages
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::System, "Be a tutor".to_string()),
                (Role::User, "again".to_string()),
                (Role::Assistant, "one".to_string()),
                (Role::User, "again".to_string()),
                (Role::User, "again".to_string()),
                (Role::Assistant, "three".to_string()),
            ]
        );

        // Third request saw everything before it, including the unanswered turn
        let histories = provider.seen_histories.lock().unwrap();
        assert_eq!(histories[2].len(), 5);
    }
}
