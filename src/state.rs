//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - the loaded configuration (read-only after startup)
//! - the conversation store and the provider collaborators, as trait objects
//! - the audio reply pipeline wired from those pieces
//! - request metrics collected by the middleware
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are the only mutable data owned directly by the state. They sit behind
//! `Arc<RwLock<_>>` so every clone of `AppState` (one per actix worker) updates the
//! same counters. The conversation store carries its own locking.

use crate::audio::UploadPolicy;
use crate::config::AppConfig;
use crate::conversation::{ConversationStore, InMemoryConversationStore};
use crate::pipeline::AudioReplyPipeline;
use crate::providers::{DialogueModel, OpenAiClient, SpeechSynthesizer, Transcriber};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed once the server is up
    pub config: Arc<AppConfig>,

    /// Every conversation the process knows about
    pub store: Arc<dyn ConversationStore>,

    /// Used directly by the `/test-openai` diagnostic
    pub dialogue: Arc<dyn DialogueModel>,

    /// `/record` orchestration
    pub pipeline: AudioReplyPipeline,

    /// Upload directory and limits for `/record`
    pub upload_policy: UploadPolicy,

    /// Performance metrics (updated by the metrics middleware on every request)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("upload_policy", &self.upload_policy)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Responses with a 4xx/5xx status
    pub error_count: u64,

    /// Key: endpoint name (e.g., "POST /record")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Wire the state from explicit collaborators.
    ///
    /// ## Parameters:
    /// - **store**: conversation storage backend
    /// - **transcriber / dialogue / synthesizer**: provider collaborators
    ///
    /// Tests use this with fakes; [`AppState::from_config`] uses the OpenAI client.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ConversationStore>,
        transcriber: Arc<dyn Transcriber>,
        dialogue: Arc<dyn DialogueModel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let pipeline = AudioReplyPipeline::new(
            Arc::clone(&store),
            transcriber,
            Arc::clone(&dialogue),
            synthesizer,
        );
        let upload_policy = UploadPolicy::from_config(&config.upload);

        Self {
            config: Arc::new(config),
            store,
            dialogue,
            pipeline,
            upload_policy,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Production wiring: in-memory store plus one OpenAI client for all three roles.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(
            config.conversation.default_base_context.clone(),
        ));
        let openai = Arc::new(OpenAiClient::new(config.provider.clone())?);

        Ok(Self::new(config, store, openai.clone(), openai.clone(), openai))
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record one finished request against its endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: The API endpoint (e.g., "GET /health", "POST /record")
    /// - **duration_ms**: How long the request took to process
    /// - **is_error**: Whether the response status was 4xx/5xx
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so the lock isn't held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
