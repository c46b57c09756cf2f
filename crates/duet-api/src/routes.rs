use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{conversations, media, messages};

/// HTTP surface of the messaging core. Everything except signed media reads
/// requires a bearer identity token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/conversations", get(conversations::inbox))
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/sent",
            post(messages::mark_sent),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/seen",
            post(messages::mark_seen),
        )
        .route("/conversations/{conversation_id}/media/{kind}", post(media::upload_media))
        .route("/signed-urls", post(media::sign_media))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new().route("/media/{*path}", get(media::serve_media));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}
