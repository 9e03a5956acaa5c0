use axum::response::{IntoResponse, Json, Response};

/// Liveness probe. Requires auth (unlike `/rest/jobs/list`), so it also
/// doubles as "is my token still valid" for clients.
pub async fn ping() -> Response {
    Json(serde_json::json!({})).into_response()
}
