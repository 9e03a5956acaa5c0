use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use kiwibes_domain::Error;

use crate::api::err_response;
use crate::state::AppState;

pub async fn read(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.datastore.read(&key).await {
        Ok(value) => Json(serde_json::json!({ "value": value })).into_response(),
        Err(e) => err_response(e),
    }
}

#[derive(Deserialize)]
struct WriteForm {
    value: Option<String>,
}

pub async fn write(State(state): State<AppState>, Path(key): Path<String>, body: Bytes) -> Response {
    if body.is_empty() {
        return err_response(Error::EmptyRestRequest);
    }
    let text = String::from_utf8_lossy(&body);
    let form: WriteForm = match serde_urlencoded::from_str(&text) {
        Ok(f) => f,
        Err(_) => return err_response(Error::EmptyRestRequest),
    };
    let Some(value) = form.value else {
        return err_response(Error::EmptyRestRequest);
    };

    match state.datastore.write(key, value).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn clear(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.datastore.clear(&key).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn clear_all(State(state): State<AppState>) -> Response {
    let count = state.datastore.clear_all().await;
    Json(serde_json::json!({ "count": count })).into_response()
}

pub async fn keys(State(state): State<AppState>) -> Response {
    Json(state.datastore.keys().await).into_response()
}
