use axum::{Extension, Json, extract::State, response::IntoResponse};

use duet_types::api::Claims;

use crate::state::AppState;

/// GET /conversations: the caller's inbox, most recent first.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    Json(state.channel.store().list_for(&claims.sub).await)
}
