use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use duet_media::SIGNED_URL_TTL;
use duet_media::path::{
    content_type_for, extension_for_mime, extension_of, normalize_object_path, object_path,
    parse_object_path,
};
use duet_types::api::{Claims, SignRequest, SignResponse, UploadResponse};
use duet_types::identity::counterpart;
use duet_types::models::MediaKind;

use crate::error::{ChatError, reject, reject_media};
use crate::state::AppState;
use crate::store::now;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub sig: String,
}

/// POST /conversations/{id}/media/{kind}: raw request body becomes a new
/// object under the caller's upload prefix.
pub async fn upload_media(
    State(state): State<AppState>,
    Path((conversation_id, kind)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let kind = MediaKind::parse(&kind).ok_or(StatusCode::BAD_REQUEST)?;
    if counterpart(&conversation_id, &claims.sub).is_none() {
        return Err(reject(ChatError::authorization(&claims.sub, &conversation_id)));
    }
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap_or_default()
        .trim();
    let path = object_path(&conversation_id, &claims.sub, kind, extension_for_mime(mime))
        .map_err(reject_media)?;
    let size = state.storage.put(&path, &body).await.map_err(reject_media)?;

    info!("{} uploaded {} ({} bytes)", claims.sub, path, size);
    Ok((StatusCode::CREATED, Json(UploadResponse { path, size })))
}

/// POST /signed-urls: a time-limited URL for an object of one of the
/// caller's conversations.
pub async fn sign_media(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SignRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let path = normalize_object_path(&req.path);
    let parts = parse_object_path(&path).map_err(reject_media)?;
    if counterpart(parts.conversation_id, &claims.sub).is_none() {
        return Err(reject(ChatError::authorization(&claims.sub, parts.conversation_id)));
    }

    let ttl = chrono::Duration::from_std(SIGNED_URL_TTL).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let signed = state
        .signer
        .sign_until(&path, now() + ttl)
        .map_err(reject_media)?;
    Ok(Json(SignResponse {
        url: signed.url,
        expires_at: signed.expires_at,
    }))
}

/// GET /media/{*path}?expires=&sig=: the signature is the authorization.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let kind = parse_object_path(&path).map_err(reject_media)?.kind;
    state
        .signer
        .verify(&path, query.expires, &query.sig, now())
        .map_err(reject_media)?;
    let data = state.storage.read(&path).await.map_err(reject_media)?;

    let content_type = content_type_for(&extension_of(&path), kind);
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        data,
    ))
}
