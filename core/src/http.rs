//! Plain-data transport types for the host-does-IO pattern.
//!
//! # Design
//! The core describes a request as an `HttpRequest` value and receives the
//! exchange result as a `TransportResponse`. It never performs network I/O
//! itself: a host-provided `Transport` executes the request and reports
//! events back. Bodies arrive as raw bytes and are decoded here, per the
//! declared response shape, so decoding stays deterministic and testable.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::body::MultipartForm;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    /// Upper-case method token as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a method token is not one of the supported verbs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// How a request payload is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    #[default]
    Raw,
    Json,
    Form,
    FormData,
}

/// The caller's declared expectation for decoding the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    #[default]
    Json,
    Blob,
    ArrayBuffer,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::Json => "json",
            ResponseType::Blob => "blob",
            ResponseType::ArrayBuffer => "arraybuffer",
        }
    }
}

/// Encoded request body handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    /// The transport sets the boundary-bearing Content-Type itself; see
    /// `MultipartForm::content_type`.
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Wire bytes of the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Text(text) => text.as_bytes().to_vec(),
            RequestBody::Multipart(form) => form.to_bytes(),
        }
    }

    /// Content type the transport must supply on its own, if any.
    pub fn implicit_content_type(&self) -> Option<String> {
        match self {
            RequestBody::Text(_) => None,
            RequestBody::Multipart(form) => Some(form.content_type()),
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `HttpClient::request`. The transport executes it and reports
/// progress and the terminal event through `TransportEvents`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// `None` disables the transport timeout.
    pub timeout: Option<Duration>,
    pub with_credentials: bool,
    pub response_type: ResponseType,
    pub report_download_progress: bool,
    pub report_upload_progress: bool,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            with_credentials: false,
            response_type: ResponseType::default(),
            report_download_progress: false,
            report_upload_progress: false,
        }
    }

    /// Add a request header. A repeated name (compared case-insensitively)
    /// is combined with the existing value as `"first, second"`.
    pub fn append_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::headers::find_header(&self.headers, name)
    }
}

/// What the transport observed once a response was fully received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// All response headers as a raw `name: value` block, CRLF separated.
    pub raw_headers: String,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, raw_headers: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            raw_headers: raw_headers.into(),
            body: body.into(),
        }
    }
}
