//! The Terraform HTTP backend protocol adapter.
//!
//! One handler serves `/api/<name>` for every method the backend
//! protocol uses:
//!
//! | Method | Action                    | Side channel                     |
//! |--------|---------------------------|----------------------------------|
//! | GET    | fetch the live version    | none                             |
//! | POST   | store a new version       | `Content-MD5` header, `?ID=` id  |
//! | DELETE | clear the live pointer    | none                             |
//! | LOCK   | acquire the advisory lock | request body is the lock JSON    |
//! | UNLOCK | release the advisory lock | request body optional            |
//!
//! Responses are buffered so every reply can carry `Content-Length` and
//! `Content-MD5` over the exact bytes sent, empty bodies included.
//! Unknown methods yield an empty 500.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};
use tracing::{debug, info};

use stsv_core::StoreError;

use crate::server::AppState;

/// Header carrying the base64 MD5 digest of a request or response body.
const CONTENT_MD5: &str = "content-md5";

/// Map a datastore failure onto the wire status.
pub(crate) fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Locked | StoreError::Unlocked => StatusCode::CONFLICT,
        StoreError::InvalidPath | StoreError::InvalidHash => StatusCode::BAD_REQUEST,
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::NotChanged | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Requests to the bare `/api/` prefix carry no blob name; the path
/// mapper rejects the empty name, which surfaces as 400.
pub(crate) async fn handle_empty(
    state: State<AppState>,
    method: Method,
    query: Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, Path(String::new()), query, method, headers, body).await
}

/// Dispatch one `/api/<name>` request onto the datastore.
pub(crate) async fn handle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    info!(method = %method, %name, "api request");

    let mut buf = Vec::new();
    let result = match method {
        Method::GET => state.datastore.read(&name, &mut buf),
        Method::DELETE => state.datastore.delete(&name),
        Method::POST => {
            let expected = expected_md5(&headers);
            let lock_id = query.get("ID").map(String::as_str).unwrap_or("");
            state
                .datastore
                .write(&name, body.as_ref(), expected.as_deref(), lock_id)
                .map(|_| ())
        }
        _ => match method.as_str() {
            "LOCK" => state.datastore.lock(&name, &body),
            "UNLOCK" => state.datastore.unlock(&name, &body),
            other => {
                debug!(method = other, %name, "unknown method");
                return respond(StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
            }
        },
    };

    let status = match &result {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            debug!(%name, error = %e, "request failed");
            status_for(e)
        }
    };
    info!(
        method = %method,
        %name,
        status = status.as_u16(),
        elapsed = ?started.elapsed(),
        "api response"
    );
    respond(status, buf)
}

/// Decode the request `Content-MD5` header. Anything that is not valid
/// base64 is treated as if the header were absent, disabling the
/// integrity check; a valid digest is enforced by the datastore.
fn expected_md5(headers: &HeaderMap) -> Option<Vec<u8>> {
    headers
        .get(CONTENT_MD5)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| BASE64.decode(value).ok())
}

/// Build the buffered response with its integrity headers.
fn respond(status: StatusCode, body: Vec<u8>) -> Response {
    let digest = Md5::digest(&body);
    Response::builder()
        .status(status)
        .header(header::CONTENT_LENGTH, body.len())
        .header(CONTENT_MD5, BASE64.encode(digest))
        .body(Body::from(body))
        .expect("response parts are statically valid")
}
