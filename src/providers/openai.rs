//! # OpenAI Provider
//!
//! One reqwest client implementing all three collaborator traits:
//! - `POST {base}/audio/transcriptions` (Whisper) for [`Transcriber`]
//! - `POST {base}/chat/completions` for [`DialogueModel`]
//! - `POST {base}/audio/speech` (TTS) for [`SpeechSynthesizer`]
//!
//! No retries. A missing API key fails every call with
//! [`ProviderError::MissingApiKey`] before any request is sent.

use super::{AudioClip, DialogueModel, ProviderError, SpeechSynthesizer, Transcriber};
use crate::config::ProviderConfig;
use crate::conversation::ChatMessage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP client for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiClient {
    /// Build the client from provider settings.
    ///
    /// Succeeds without an API key; calls will fail instead, so the server can still
    /// start and report the problem.
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = Self {
            client: builder.build()?,
            config,
        };
        debug!(
            base_url = %client.config.base_url,
            configured = client.is_configured(),
            "OpenAI client ready"
        );

        Ok(client)
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_api_key()
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ProviderError::MissingApiKey),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Turn a non-2xx response into `ProviderError::Api`, preferring the
    /// provider's own error message when the body parses.
    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|parsed| parsed.error.message)
            .unwrap_or(body);

        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl Transcriber for OpenAiClient {
    #[instrument(skip(self, audio), fields(audio_bytes = audio.data.len(), file = %audio.file_name))]
    async fn transcribe(&self, audio: AudioClip) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        if audio.data.is_empty() {
            return Err(ProviderError::InvalidInput("Audio data is empty".to_string()));
        }

        let part = Part::bytes(audio.data)
            .file_name(audio.file_name)
            .mime_str(&audio.mime_type)
            .map_err(|e| ProviderError::InvalidInput(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body: TranscriptionResponse = response.json().await?;
        debug!(text_len = body.text.len(), "Transcription received");
        Ok(body.text)
    }
}

#[async_trait]
impl DialogueModel for OpenAiClient {
    #[instrument(skip(self, messages), fields(messages = messages.len(), model = %self.config.chat_model))]
    async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<Option<String>, ProviderError> {
        let api_key = self.api_key()?;
        let request = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body: ChatCompletionResponse = response.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty());

        debug!(has_reply = reply.is_some(), "Chat completion received");
        Ok(reply)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    #[instrument(skip(self, text), fields(text_len = text.len(), voice = %self.config.voice))]
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let api_key = self.api_key()?;
        if text.is_empty() {
            return Err(ProviderError::InvalidInput("Text cannot be empty".to_string()));
        }

        let request = SpeechRequest {
            model: &self.config.speech_model,
            voice: &self.config.voice,
            input: text,
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let audio = response.bytes().await?;
        debug!(audio_bytes = audio.len(), "Speech synthesized");
        Ok(audio.to_vec())
    }
}
