//! Audio upload endpoint.
//!
//! `POST /record?conversationId=<id>` with multipart form data:
//! - `audio`: the MP3 clip (file field)
//! - `conversationId`: optional text field, used only when the query parameter is absent
//!
//! The multipart stream is written straight to a temporary file; everything after
//! that is the [`AudioReplyPipeline`](crate::pipeline::AudioReplyPipeline)'s job.

use crate::audio::{TempUpload, UploadPolicy};
use crate::error::{AppError, AppResult};
use crate::pipeline::{AudioReply, ReplyError};
use crate::state::AppState;
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

const AUDIO_FIELD: &str = "audio";
const CONVERSATION_ID_FIELD: &str = "conversationId";
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub conversation_id: Option<String>,
}

/// Successful `/record` response; `audioBuffer` is omitted when there is no audio.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProcessingResponse {
    pub success: bool,
    pub conversation_id: String,
    pub transcription: String,
    pub ai_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_buffer: Option<String>,
    pub timestamp: String,
}

impl From<AudioReply> for AudioProcessingResponse {
    fn from(reply: AudioReply) -> Self {
        Self {
            success: true,
            conversation_id: reply.conversation_id,
            transcription: reply.transcription,
            ai_response: reply.ai_response,
            audio_buffer: reply.audio_base64,
            timestamp: crate::timestamp_now(),
        }
    }
}

/// What the multipart body carried.
#[derive(Debug, Default)]
struct RecordForm {
    upload: Option<TempUpload>,
    conversation_id: Option<String>,
}

/// Transcribe an uploaded clip, reply to it, and speak the reply.
///
/// ## Response:
/// ```json
/// {
///   "success": true,
///   "conversationId": "5b1f…",
///   "transcription": "hi",
///   "aiResponse": "hello there",
///   "audioBuffer": "SUQzBAAAAAAA…",
///   "timestamp": "2025-01-01T12:00:00.000Z"
/// }
/// ```
pub async fn record_audio(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<RecordQuery>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let form = if is_multipart(&req) {
        read_form(payload, &state.upload_policy).await?
    } else {
        RecordForm::default()
    };

    // Query wins over the body field
    let conversation_id = non_empty(query.into_inner().conversation_id)
        .or_else(|| non_empty(form.conversation_id));

    match state.pipeline.process(form.upload, conversation_id).await {
        Ok(reply) => Ok(HttpResponse::Ok().json(AudioProcessingResponse::from(reply))),
        Err(e) => {
            if !matches!(
                e,
                ReplyError::MissingAudio | ReplyError::MissingConversationId | ReplyError::ConversationNotFound
            ) {
                error!(error = %e, "Error processing audio");
            }
            Err(e.into())
        }
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Walk the multipart stream, saving the audio file and collecting the id field.
///
/// A body that is only the closing boundary (an empty form) reads as no fields.
/// Any error drops the partially written upload, which deletes it.
async fn read_form(mut payload: Multipart, policy: &UploadPolicy) -> AppResult<RecordForm> {
    let mut form = RecordForm::default();
    let mut seen_field = false;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(MultipartError::Incomplete) if !seen_field => break,
            Err(e) => return Err(AppError::BadRequest(format!("Multipart error: {}", e))),
        };
        seen_field = true;

        let (name, file_name) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => (String::new(), None),
        };

        match (name.as_str(), file_name) {
            (AUDIO_FIELD, Some(file_name)) => {
                if form.upload.is_some() {
                    return Err(AppError::BadRequest("Only one audio file is allowed".to_string()));
                }
                let content_type = field.content_type().map(|mime| mime.essence_str().to_string());
                if !policy.accepts(content_type.as_deref(), &file_name) {
                    return Err(AppError::BadRequest("Only MP3 files are allowed".to_string()));
                }
                form.upload = Some(save_file(&mut field, policy, &file_name).await?);
            }
            (CONVERSATION_ID_FIELD, None) => {
                let bytes = read_text(&mut field).await?;
                let value = String::from_utf8(bytes)
                    .map_err(|_| AppError::ValidationError("conversationId must be valid UTF-8".to_string()))?;
                form.conversation_id = Some(value);
            }
            _ => drain(&mut field).await?,
        }
    }

    Ok(form)
}

async fn save_file(field: &mut Field, policy: &UploadPolicy, file_name: &str) -> AppResult<TempUpload> {
    policy.ensure_dir().await?;

    let mut upload = TempUpload::new(policy.temp_path(file_name), file_name);
    let mut file = tokio::fs::File::create(upload.path()).await?;
    let mut written = 0usize;

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
        written += chunk.len();
        if written > policy.max_file_size_bytes {
            return Err(AppError::BadRequest(format!(
                "File too large: exceeds maximum of {} bytes",
                policy.max_file_size_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    upload.set_size_bytes(written);
    debug!(path = %upload.path().display(), bytes = written, "Audio upload saved");
    Ok(upload)
}

async fn read_text(field: &mut Field) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::BadRequest("Form field too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn drain(field: &mut Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
    }
    Ok(())
}
