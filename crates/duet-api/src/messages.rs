use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use duet_types::api::{Claims, SendMessageRequest, TransitionResponse};
use duet_types::identity::{counterpart, split_conversation_id};
use duet_types::models::Identity;

use crate::error::{ChatError, reject};
use crate::state::AppState;

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let sender = Identity::new(claims.sub);
    let message = state
        .channel
        .send(&conversation_id, req.payload, &sender, req.created_at)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Full ordered history. Only the two participants may read it.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    if split_conversation_id(&conversation_id).is_none() {
        return Err(reject(ChatError::InvalidConversationId(conversation_id)));
    }
    if counterpart(&conversation_id, &claims.sub).is_none() {
        return Err(reject(ChatError::authorization(&claims.sub, &conversation_id)));
    }
    let messages = state.channel.history(&conversation_id).await.map_err(reject)?;
    Ok(Json(messages))
}

pub async fn mark_sent(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let changed = state
        .channel
        .mark_sent(&conversation_id, &message_id, &Identity::new(claims.sub))
        .await
        .map_err(reject)?;
    Ok(Json(TransitionResponse { changed }))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let changed = state
        .channel
        .mark_seen(&conversation_id, &message_id, &Identity::new(claims.sub))
        .await
        .map_err(reject)?;
    Ok(Json(TransitionResponse { changed }))
}
