//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special-case environment variables (HOST, PORT, OPENAI_API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_PROVIDER__CHAT_MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Why a double underscore:
//! Field names such as `chat_model` already contain underscores, so nested keys are
//! separated with `__` (e.g. `APP_UPLOAD__MAX_FILE_SIZE_BYTES=5242880`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Seed instruction used when a conversation is started without a custom context.
pub const DEFAULT_BASE_CONTEXT: &str = "Hi. I want to learn English could you be my teacher today. I want to talk with you on different themes, and you can improve my grammar and other things.";

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, provider, upload, conversation)
/// keeps each concern small and lets environment overrides target one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub upload: UploadConfig,
    pub conversation: ConversationConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External AI provider settings (OpenAI-compatible API).
///
/// ## Fields:
/// - `api_key`: Bearer token; `None` means the provider is not configured
/// - `base_url`: API root, without trailing slash
/// - `transcription_model` / `chat_model` / `speech_model`: model per collaborator
/// - `voice`: voice used for speech synthesis
/// - `timeout_secs`: optional HTTP timeout; unset means the client never gives up on its own
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: String,
    pub timeout_secs: Option<u64>,
}

// Hand-written so the key never lands in logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("transcription_model", &self.transcription_model)
            .field("chat_model", &self.chat_model)
            .field("speech_model", &self.speech_model)
            .field("voice", &self.voice)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Whether a non-empty API key is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }
}

/// Settings for uploaded audio files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory temporary uploads are written to
    pub dir: String,
    /// Largest accepted audio file, in bytes
    pub max_file_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Seed system instruction for conversations started without `baseContext`
    pub default_base_context: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            provider: ProviderConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                transcription_model: "whisper-1".to_string(),
                chat_model: "gpt-3.5-turbo".to_string(),
                speech_model: "tts-1".to_string(),
                voice: "nova".to_string(),
                timeout_secs: None,
            },
            upload: UploadConfig {
                dir: "uploads".to_string(),
                max_file_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            conversation: ConversationConfig {
                default_base_context: DEFAULT_BASE_CONTEXT.to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and OPENAI_API_KEY
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_PROVIDER__CHAT_MODEL=gpt-4o-mini`: Override chat model
    /// - `PORT=8080`: Special case for deployment platforms
    /// - `OPENAI_API_KEY=sk-...`: Provider credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms and the provider SDKs use these bare names
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("provider.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is NOT a validation error: the server still starts and
    /// reports the problem on `/test-openai` and on every provider call.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upload.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("Upload size limit must be greater than 0"));
        }

        if self.upload.dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.provider.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Provider base URL cannot be empty"));
        }

        let models = [
            ("transcription_model", &self.provider.transcription_model),
            ("chat_model", &self.provider.chat_model),
            ("speech_model", &self.provider.speech_model),
            ("voice", &self.provider.voice),
        ];
        for (name, value) in models {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("Provider {} cannot be empty", name));
            }
        }

        if self.conversation.default_base_context.trim().is_empty() {
            return Err(anyhow::anyhow!("Default base context cannot be empty"));
        }

        Ok(())
    }
}
