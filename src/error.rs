//! Error types and HTTP status code mapping.

use hyper::{Response, StatusCode};
use std::fmt;

use crate::routes::{self, BoxBody};

/// Every failure the API can produce, each mapping to a specific HTTP status.
#[derive(Debug)]
pub enum ApiError {
    /// The configuration file could not be loaded or parsed.
    Config(String),
    /// The request body was not valid JSON.
    InvalidJson,
    /// A guestbook submission was missing its name or message.
    MissingFields,
    /// A guestbook field exceeded its length limit.
    FieldTooLong {
        /// Which field overflowed ("Name" or "Message").
        field: &'static str,
        /// The character limit for that field.
        limit: usize,
    },
    /// The declared request body size exceeds the configured cap.
    BodyTooLarge(u64),
    /// The caller posted to the guestbook again before the marker expired.
    RateLimited {
        /// Human-readable hint for when to try again.
        retry_after: &'static str,
    },
    /// No route matches the request path and method.
    NotFound,
    /// The concurrency limit was reached and the request was shed.
    ServiceUnavailable(usize),
    /// The underlying key-value or table store failed.
    Store(String),
    /// An internal error that does not fit other categories.
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::InvalidJson => write!(f, "Invalid JSON"),
            Self::MissingFields => write!(f, "Name and message are required"),
            Self::FieldTooLong { field, limit } => {
                write!(f, "{field} too long (max {limit} characters)")
            }
            Self::BodyTooLarge(limit) => {
                write!(f, "Request body too large (max {limit} bytes)")
            }
            Self::RateLimited { .. } => write!(f, "Please wait before posting again"),
            Self::NotFound => write!(f, "Not found"),
            Self::ServiceUnavailable(limit) => {
                write!(f, "server busy: {limit} requests already in flight")
            }
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Returns the HTTP status code corresponding to this error variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidJson | Self::MissingFields | Self::FieldTooLong { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Converts this error into the client-facing HTTP response.
    ///
    /// Unexpected failures (config, store, internal) are logged here and
    /// normalized to a generic body so no internal detail reaches the
    /// caller. The 404 path returns plain text; everything else is JSON
    /// with an `error` field. All responses carry CORS headers.
    pub fn into_response(self) -> Response<BoxBody> {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let mut response = match &self {
            Self::NotFound => Response::builder()
                .status(status)
                .header("content-type", "text/plain")
                .body(routes::full("Not found")),
            Self::RateLimited { retry_after } => {
                let body = serde_json::json!({
                    "error": self.to_string(),
                    "retryAfter": retry_after,
                });
                Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(routes::full(body.to_string()))
            }
            Self::Config(_) | Self::Store(_) | Self::Internal(_) => {
                let body = serde_json::json!({ "error": "Internal server error" });
                Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(routes::full(body.to_string()))
            }
            _ => {
                let body = serde_json::json!({ "error": self.to_string() });
                Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(routes::full(body.to_string()))
            }
        }
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(routes::full(""))
                .expect("building fallback response must not fail")
        });

        routes::apply_cors(response.headers_mut());
        response
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<hyper::http::Error> for ApiError {
    fn from(err: hyper::http::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
