//! Error types raised synchronously by the client.
//!
//! # Design
//! Everything that can go wrong once a request is in flight is delivered as
//! a `Failure` value through the request handle (see `outcome`). The errors
//! here cover the steps that run before the transport is touched: encoding
//! the request body and loading configuration.

use thiserror::Error;

use crate::http::RequestType;

/// Errors produced while encoding a request payload.
#[derive(Debug, Error)]
pub enum BodyError {
    /// A sequence has no field name to hang its `[index]` entries on.
    #[error("a top-level sequence cannot be serialized as form fields")]
    TopLevelSequence,

    /// Form encodings need named fields at the top level.
    #[error("a top-level scalar cannot be serialized as form fields")]
    TopLevelScalar,

    /// URL-encoded forms carry text only.
    #[error("field `{0}` holds a file, which a URL-encoded form cannot carry")]
    FileInForm(String),

    /// The payload variant has no encoding under the selected request type.
    #[error("a {payload} payload cannot be sent with request type {request_type:?}")]
    UnsupportedPayload {
        payload: &'static str,
        request_type: RequestType,
    },

    /// The JSON payload could not be serialized.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while loading `Defaults` from a file or string.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors returned by `HttpClient::request` before submission.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Body(#[from] BodyError),
}
