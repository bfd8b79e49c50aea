//! Request routing and dispatch.
//!
//! One handler receives every inbound request, answers CORS preflights,
//! routes by path and method to the counter and guestbook services, and
//! converts any failure into a normalized error response. Every response,
//! success or error, carries the same permissive CORS headers because the
//! static front end calls these endpoints cross-origin.
//!
//! Every inbound request is assigned a monotonically increasing request ID
//! and wrapped in a [`tracing::Span`] carrying structured fields for
//! observability.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::guestbook::PostOutcome;
use crate::{counter, guestbook, ApiError, AppState, Result};

/// An alias to simplify the calls to `Box<dyn std::error::Error + Send + Sync>`.
type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased body used for every response this crate produces.
///
/// Uses a trait-object error type so that locally constructed bodies
/// (which are infallible) and any streaming body share one response type.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, StdError>;

/// Global monotonic counter for assigning unique request IDs.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Wraps a complete in-memory payload as a [`BoxBody`].
pub(crate) fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|never| -> StdError { match never {} })
        .boxed()
}

/// Attaches the permissive CORS headers every response must carry.
pub(crate) fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Content-Type"),
    );
}

/// Serializes `value` as a JSON response with CORS headers.
fn json_response(status: StatusCode, value: &impl Serialize) -> Result<Response<BoxBody>> {
    let body = serde_json::to_string(value)
        .map_err(|e| ApiError::Internal(format!("failed to serialize response: {e}")))?;

    let mut response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full(body))?;

    apply_cors(response.headers_mut());
    Ok(response)
}

/// Determines the client IP to hash for rate limiting.
///
/// Behind the edge, the connecting address belongs to the proxy; the
/// original caller arrives in `X-Forwarded-For`. The first entry of that
/// header wins, otherwise the socket peer address is used.
pub fn client_ip(headers: &HeaderMap, client_addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| client_addr.ip().to_string())
}

/// Returns `true` if the `Content-Length` header value exceeds the given
/// maximum body size in bytes.
///
/// Returns `false` if no `Content-Length` is present or the value is
/// unparseable (hyper handles malformed content-length at the protocol
/// level).
fn content_length_exceeds(headers: &HeaderMap, max_bytes: u64) -> bool {
    headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|val| val.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .is_some_and(|len| len > max_bytes)
}

/// Processes a single inbound request.
///
/// - `OPTIONS *` answers the CORS preflight with an empty 200.
/// - `GET /api/counter` delegates to [`counter::visit`].
/// - `GET /api/guestbook` delegates to [`guestbook::recent_entries`].
/// - `POST /api/guestbook` buffers the body (bounded by the configured
///   `max_body_size`) and delegates to [`guestbook::post_entry`].
/// - Anything else is a 404.
///
/// Errors bubble up to the caller, which renders them via
/// [`ApiError::into_response`]; only unexpected failures become 500s.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody>>
where
    B: hyper::body::Body<Data = Bytes> + Send,
    B::Error: Into<StdError>,
{
    let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let span = tracing::info_span!(
        "request",
        id = request_id,
        method = %method,
        path = %path,
        client = %client_addr,
    );

    async move {
        if method == Method::OPTIONS {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .body(full(""))?;
            apply_cors(response.headers_mut());
            return Ok(response);
        }

        let ip = client_ip(req.headers(), client_addr);

        match (&method, path.as_str()) {
            (&Method::GET, "/api/counter") => {
                let snapshot = counter::visit(&state, req.headers(), &ip).await?;
                json_response(StatusCode::OK, &snapshot)
            }
            (&Method::GET, "/api/guestbook") => {
                let entries = guestbook::recent_entries(&state).await?;
                json_response(StatusCode::OK, &entries)
            }
            (&Method::POST, "/api/guestbook") => {
                if content_length_exceeds(req.headers(), state.config.max_body_size) {
                    return Err(ApiError::BodyTooLarge(state.config.max_body_size));
                }

                let body = req
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| {
                        let e: StdError = e.into();
                        ApiError::Internal(format!("failed to read request body: {e}"))
                    })?
                    .to_bytes();

                match guestbook::post_entry(&state, &ip, &body).await? {
                    PostOutcome::Accepted(entry) => json_response(
                        StatusCode::OK,
                        &serde_json::json!({ "success": true, "entry": entry }),
                    ),
                    PostOutcome::Discarded => {
                        json_response(StatusCode::OK, &serde_json::json!({ "success": true }))
                    }
                }
            }
            _ => {
                debug!("no route matched");
                Err(ApiError::NotFound)
            }
        }
    }
    .instrument(span)
    .await
}
