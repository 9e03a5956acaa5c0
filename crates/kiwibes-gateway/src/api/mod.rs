pub mod data;
pub mod jobs;
pub mod ping;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use kiwibes_domain::{Error, ErrorBody};

use crate::state::AppState;

/// Cap on how much of a request body `require_auth` will buffer while
/// looking for a form-encoded `auth` field. Job/data payloads are tiny;
/// this only guards against a pathological caller.
const MAX_AUTH_BODY_BYTES: usize = 1024 * 1024;

/// Build the full REST router: public (unauthenticated) routes merged
/// with protected routes gated behind `require_auth`, plus a catch-all
/// fallback for unrecognized paths (SPEC_FULL §6).
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/rest/jobs/list", get(jobs::list))
        .route("/rest/jobs/scheduled", get(jobs::scheduled));

    let protected = Router::new()
        .route("/rest/ping", get(ping::ping))
        .route("/rest/job/details/:name", get(jobs::details))
        .route("/rest/job/create/:name", post(jobs::create))
        .route("/rest/job/edit/:name", post(jobs::edit))
        .route("/rest/job/start/:name", post(jobs::start))
        .route("/rest/job/stop/:name", post(jobs::stop))
        .route("/rest/job/delete/:name", post(jobs::delete))
        .route("/rest/job/clear_pending/:name", post(jobs::clear_pending))
        .route("/rest/data/read/:key", get(data::read))
        .route("/rest/data/write/:key", post(data::write))
        .route("/rest/data/clear/:key", post(data::clear))
        .route("/rest/data/clear_all", post(data::clear_all))
        .route("/rest/data/keys", get(data::keys))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .fallback(unrecognized_route)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize, Default)]
struct AuthParam {
    auth: Option<String>,
}

/// Pull `auth` out of a query string or form body using the same
/// decoder the handlers use for everything else, so `+`-as-space and
/// percent-escapes behave identically everywhere in the REST surface.
fn auth_param(encoded: &str) -> Option<String> {
    serde_urlencoded::from_str::<AuthParam>(encoded).ok().and_then(|p| p.auth)
}

/// Every protected route requires a valid `auth` request parameter
/// (SPEC_FULL §4.7, §6). The canonical client sends it in the query
/// string on `GET` routes but inside the form-encoded body on `POST`
/// routes (`auth=...&program=...`), so both locations are checked: the
/// query string first, then — only if absent there — the body, which is
/// buffered and reinserted so the downstream handler can still decode
/// its own fields from it. A missing or unknown token is reported as
/// `ERROR_AUTHENTICATION_FAIL` (404), not 401 — the server does not
/// distinguish "wrong token" from "route does not exist" to a caller
/// without one.
async fn require_auth(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let query_token = req.uri().query().and_then(auth_param);

    let (token, req) = match query_token {
        Some(t) => (Some(t), req),
        None => {
            let (parts, body) = req.into_parts();
            let bytes = match body::to_bytes(body, MAX_AUTH_BODY_BYTES).await {
                Ok(b) => b,
                Err(_) => return err_response(Error::EmptyRestRequest),
            };
            let token = auth_param(&String::from_utf8_lossy(&bytes));
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
    };

    let valid = token.as_deref().map(|t| state.auth.validate(t)).unwrap_or(false);
    if !valid {
        return err_response(Error::AuthenticationFail);
    }
    next.run(req).await
}

async fn unrecognized_route() -> Response {
    (StatusCode::NOT_FOUND, axum::response::Html("<p>ERROR</p>")).into_response()
}

/// Every handler's error path funnels through here, so the code/status
/// mapping in `kiwibes_domain::Error` is the single source of truth.
pub fn err_response(e: Error) -> Response {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from(&e))).into_response()
}
