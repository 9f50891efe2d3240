//! Liveness and diagnostic endpoints.

use crate::conversation::{ChatMessage, Role};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct HelloWorldResponse {
    pub message: String,
    pub timestamp: String,
}

/// Result of exercising the dialogue provider once.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiTestResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// `GET /`
pub async fn hello_world() -> HttpResponse {
    HttpResponse::Ok().json(HelloWorldResponse {
        message: "Hello World! Voice tutor backend is running!".to_string(),
        timestamp: crate::timestamp_now(),
    })
}

/// `GET /test-cors`
pub async fn test_cors() -> HttpResponse {
    HttpResponse::Ok().json(HelloWorldResponse {
        message: "CORS is working!".to_string(),
        timestamp: crate::timestamp_now(),
    })
}

/// `GET /test-openai`
///
/// Sends one fixed prompt to the dialogue provider.
/// - 400 when no API key is configured (nothing is sent)
/// - 500 when the provider call fails
pub async fn test_openai(state: web::Data<AppState>) -> HttpResponse {
    if !state.get_config().provider.has_api_key() {
        return HttpResponse::BadRequest().json(OpenAiTestResponse {
            success: false,
            message: "OpenAI API key not configured".to_string(),
            openai_response: None,
            error: Some("Set OPENAI_API_KEY in the environment or .env file".to_string()),
            timestamp: crate::timestamp_now(),
        });
    }

    let prompt = [ChatMessage::new(
        Role::User,
        "Say 'Hello from OpenAI!' in a friendly way.",
    )];

    match state.dialogue.generate_reply(&prompt).await {
        Ok(reply) => {
            info!("OpenAI connectivity test succeeded");
            HttpResponse::Ok().json(OpenAiTestResponse {
                success: true,
                message: "OpenAI connection successful".to_string(),
                openai_response: Some(reply.unwrap_or_default()),
                error: None,
                timestamp: crate::timestamp_now(),
            })
        }
        Err(e) => {
            error!(error = %e, "OpenAI connectivity test failed");
            HttpResponse::InternalServerError().json(OpenAiTestResponse {
                success: false,
                message: "OpenAI connection failed".to_string(),
                openai_response: None,
                error: Some(e.to_string()),
                timestamp: crate::timestamp_now(),
            })
        }
    }
}
