use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use kiwibes_domain::Error;

use crate::api::err_response;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Response {
    Json(state.catalog.list().await).into_response()
}

pub async fn scheduled(State(state): State<AppState>) -> Response {
    Json(state.catalog.scheduled().await).into_response()
}

pub async fn details(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.catalog.details(&name).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => err_response(e),
    }
}

#[derive(Deserialize, Default)]
struct JobForm {
    #[serde(default)]
    program: Vec<String>,
    #[serde(default)]
    schedule: String,
    #[serde(rename = "max-runtime", default)]
    max_runtime: u64,
}

/// Decode a job-definition form body. `program` may arrive as a
/// repeated `program=a&program=b` key, which `serde_urlencoded` already
/// collects into a `Vec<String>`, or as one field holding a
/// JSON-encoded array (SPEC_FULL §6) — detected and re-parsed here.
fn decode_job_form(body: &[u8]) -> Result<JobForm, Error> {
    if body.is_empty() {
        return Err(Error::EmptyRestRequest);
    }
    let text = String::from_utf8_lossy(body);
    let mut form: JobForm =
        serde_urlencoded::from_str(&text).map_err(|_| Error::EmptyRestRequest)?;

    if let [only] = form.program.as_slice() {
        let trimmed = only.trim_start();
        if trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(only) {
                form.program = parsed;
            }
        }
    }
    Ok(form)
}

pub async fn create(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Response {
    let form = match decode_job_form(&body) {
        Ok(f) => f,
        Err(e) => return err_response(e),
    };
    match state.catalog.create(name, form.program, form.schedule, form.max_runtime).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn edit(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let form = match decode_job_form(&body) {
        Ok(f) => f,
        Err(e) => return err_response(e),
    };
    match state
        .catalog
        .edit(&name, form.program, form.schedule, form.max_runtime)
        .await
    {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn start(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.executor.start(&name).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn stop(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.executor.stop(&name).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn delete(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.catalog.delete(&name).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}

pub async fn clear_pending(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.executor.clear_pending(&name).await {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => err_response(e),
    }
}
