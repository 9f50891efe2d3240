//! # Conversation Lifecycle Handlers
//!
//! - `POST /conversations/start` - create a conversation seeded with a system instruction
//! - `GET /conversations` - list every conversation (debug/inspection)

use crate::conversation::ConversationSummary;
use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of `POST /conversations/start`. Every field is optional, and so is the body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub base_context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationResponse {
    pub success: bool,
    pub conversation_id: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsResponse {
    pub success: bool,
    pub total_conversations: usize,
    pub conversations: Vec<ConversationSummary>,
    pub timestamp: String,
}

/// Start a new conversation.
///
/// ## Request:
/// ```json
/// { "baseContext": "You are a patient Spanish tutor." }
/// ```
/// An empty body, `{}`, or a blank `baseContext` seeds the configured default instruction.
///
/// ## Response:
/// ```json
/// { "success": true, "conversationId": "5b1f…", "timestamp": "2025-01-01T12:00:00.000Z" }
/// ```
pub async fn start_conversation(
    state: web::Data<AppState>,
    body: Option<web::Json<StartConversationRequest>>,
) -> AppResult<HttpResponse> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let custom = request.base_context.as_deref();

    let conversation_id = state.store.create(custom);
    info!(
        conversation_id = %conversation_id,
        custom_context = custom.is_some_and(|c| !c.trim().is_empty()),
        "Conversation started"
    );

    Ok(HttpResponse::Ok().json(StartConversationResponse {
        success: true,
        conversation_id,
        timestamp: crate::timestamp_now(),
    }))
}

/// Debug listing of stored conversations, oldest first.
pub async fn list_conversations(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let conversations = state.store.list_summaries();

    Ok(HttpResponse::Ok().json(ListConversationsResponse {
        success: true,
        total_conversations: conversations.len(),
        conversations,
        timestamp: crate::timestamp_now(),
    }))
}
