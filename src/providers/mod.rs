//! # AI Provider Collaborators
//!
//! The three external services the audio pipeline depends on, each behind its own trait:
//! - **Transcriber**: audio bytes → text
//! - **DialogueModel**: ordered role-tagged messages → reply text
//! - **SpeechSynthesizer**: reply text → audio bytes
//!
//! The pipeline holds them as `Arc<dyn Trait>`, so tests swap in fakes and a
//! different provider only needs new implementations. [`openai::OpenAiClient`]
//! implements all three against an OpenAI-compatible HTTP API.

pub mod openai;

use crate::conversation::ChatMessage;
use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiClient;

/// An uploaded audio clip ready to send to a transcription service.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Vec<u8>,
    /// Original file name; providers use the extension to detect the format
    pub file_name: String,
    pub mime_type: String,
}

impl AudioClip {
    pub fn mp3(data: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            data,
            file_name: file_name.into(),
            mime_type: "audio/mpeg".to_string(),
        }
    }
}

/// Errors raised by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No credential configured for the provider
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    /// Network-level failure talking to the provider
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider answered 2xx but the body was not what we expected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rejected locally before calling the provider
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::RequestFailed(err.to_string())
        }
    }
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: AudioClip) -> Result<String, ProviderError>;
}

/// Text generation over a conversation history.
#[async_trait]
pub trait DialogueModel: Send + Sync {
    /// Generate the next assistant turn.
    ///
    /// `Ok(None)` means the provider answered but produced no content.
    async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<Option<String>, ProviderError>;
}

/// Text-to-speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`, returning encoded audio (MP3 for the OpenAI adapter).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProviderError::MissingApiKey.to_string(),
            "OpenAI API key is not configured"
        );
        assert_eq!(
            ProviderError::Api {
                status: 429,
                message: "slow down".to_string()
            }
            .to_string(),
            "Provider returned HTTP 429: slow down"
        );
    }

    #[test]
    fn test_mp3_clip() {
        let clip = AudioClip::mp3(vec![1, 2, 3], "hello.mp3");
        assert_eq!(clip.mime_type, "audio/mpeg");
        assert_eq!(clip.file_name, "hello.mp3");
        assert_eq!(clip.data.len(), 3);
    }
}
