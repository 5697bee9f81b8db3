//! Callback-driven HTTP request lifecycle over a host-provided transport.
//!
//! # Overview
//! `HttpClient::request` turns a declarative `RequestConfig` into an
//! `HttpRequest`, starts it on a `Transport`, and immediately returns a
//! `RequestHandle`. The transport reports progress and exactly one terminal
//! event back; the handle classifies it into a `Success` or a `Failure` and
//! delivers it to the registered callbacks (or to `wait`).
//!
//! # Design
//! - The core never touches the network. Hosts implement `Transport` and
//!   `Exchange` (browser bindings, a blocking client on a worker thread,
//!   a scripted transport in tests).
//! - Failures are values, never panics: four kinds with stable codes
//!   (`CANCELED_ERROR`, `NETWORK_ERROR`, `HTTP_ERROR`, `UNKNOWN_ERROR`).
//! - Client-wide `Defaults` are injected and shared explicitly; each
//!   request snapshots them at submission.
//! - Form payloads are an explicit `FormValue` tree, so encoders never
//!   inspect types at runtime.

pub mod body;
pub mod classify;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod handle;
pub mod headers;
pub mod http;
pub mod outcome;
pub mod transport;

pub use body::{encode_form, encode_multipart, FilePart, FormFields, FormValue, MultipartForm, PartContent, Payload};
pub use client::HttpClient;
pub use config::{BasicAuth, Defaults, DefaultsFile, ErrorHook, RequestConfig, StatusValidator};
pub use download::{filename_from_disposition, DirectorySaver, FileSaver};
pub use error::{BodyError, ConfigError, RequestError};
pub use handle::RequestHandle;
pub use headers::merge_headers;
pub use http::{HttpMethod, HttpRequest, RequestBody, RequestType, ResponseType, TransportResponse};
pub use outcome::{
    ErrorKind, Failure, Outcome, Progress, ResponseData, Success, CANCELED_ERROR, HTTP_ERROR,
    NETWORK_ERROR, UNKNOWN_ERROR,
};
pub use transport::{Exchange, Transport, TransportEvents};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
