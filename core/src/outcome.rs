//! Result shapes delivered through a `RequestHandle`.
//!
//! # Design
//! Four failure kinds, each with a stable numeric code that callers may
//! persist or compare across hosts.
//! Timeouts and "200 with an empty JSON body" both land in `Unknown`.

use std::fmt;

use serde_json::Value;

use crate::http::ResponseType;

/// Numeric code of `ErrorKind::Canceled`.
pub const CANCELED_ERROR: i32 = -1;
/// Numeric code of `ErrorKind::Network`.
pub const NETWORK_ERROR: i32 = 0;
/// Numeric code of `ErrorKind::Http`.
pub const HTTP_ERROR: i32 = 1;
/// Numeric code of `ErrorKind::Unknown`.
pub const UNKNOWN_ERROR: i32 = 2;

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller aborted the request.
    Canceled,
    /// No HTTP exchange completed, including network failure while uploading.
    Network,
    /// A response arrived but failed status validation.
    Http,
    /// Timeout, or a valid status carrying an empty JSON body.
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Canceled => CANCELED_ERROR,
            ErrorKind::Network => NETWORK_ERROR,
            ErrorKind::Http => HTTP_ERROR,
            ErrorKind::Unknown => UNKNOWN_ERROR,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            CANCELED_ERROR => Some(ErrorKind::Canceled),
            NETWORK_ERROR => Some(ErrorKind::Network),
            HTTP_ERROR => Some(ErrorKind::Http),
            UNKNOWN_ERROR => Some(ErrorKind::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Canceled => "request canceled",
            ErrorKind::Network => "network error",
            ErrorKind::Http => "HTTP error",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// A response body decoded per the declared response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Text(String),
    /// `Value::Null` when the body was empty or not valid JSON.
    Json(Value),
    Bytes(Vec<u8>),
    /// The body was handed to the file saver; stands in for `true`.
    Downloaded,
}

impl ResponseData {
    pub fn decode(body: Vec<u8>, response_type: ResponseType) -> Self {
        match response_type {
            ResponseType::Text => match String::from_utf8(body) {
                Ok(text) => ResponseData::Text(text),
                Err(err) => ResponseData::Text(String::from_utf8_lossy(err.as_bytes()).into_owned()),
            },
            ResponseType::Json => {
                ResponseData::Json(serde_json::from_slice(&body).unwrap_or(Value::Null))
            }
            ResponseType::Blob | ResponseType::ArrayBuffer => ResponseData::Bytes(body),
        }
    }

    /// Empty text, no bytes, or a JSON
    /// `null`, `false`, `0` or `""`.
    pub fn is_empty(&self) -> bool {
        match self {
            ResponseData::Text(text) => text.is_empty(),
            ResponseData::Bytes(bytes) => bytes.is_empty(),
            ResponseData::Json(value) => is_empty_json(value),
            ResponseData::Downloaded => false,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A request that passed status validation.
/// `null`, `false`, `0` and `""` count as no value; arrays and objects
/// never do, even when empty.
pub(crate) fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    pub data: ResponseData,
    pub headers: Vec<(String, String)>,
    pub status: u16,
}

impl Success {
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::headers::find_header(&self.headers, name)
    }
}

/// A request that ended in one of the four failure kinds.
///
/// `status` is 0 when no response was ever received.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} (status {status})")]
pub struct Failure {
    pub kind: ErrorKind,
    pub status: u16,
    pub data: Option<ResponseData>,
    pub headers: Option<Vec<(String, String)>>,
}

impl Failure {
    pub fn new(kind: ErrorKind, status: u16) -> Self {
        Self {
            kind,
            status,
            data: None,
            headers: None,
        }
    }

    pub fn with_response(mut self, data: ResponseData, headers: Vec<(String, String)>) -> Self {
        self.data = Some(data);
        self.headers = Some(headers);
        self
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

/// The terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Success),
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success(s) => s.status,
            Outcome::Failure(f) => f.status,
        }
    }

    pub fn into_result(self) -> Result<Success, Failure> {
        match self {
            Outcome::Success(s) => Ok(s),
            Outcome::Failure(f) => Err(f),
        }
    }
}

/// Transfer progress reported before the terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Percent(u8),
    /// The total size is not known.
    Unknown,
}

impl Progress {
    pub fn from_counts(loaded: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => {
                let percent = (u128::from(loaded) * 100 / u128::from(total)).min(100);
                Progress::Percent(percent as u8)
            }
            _ => Progress::Unknown,
        }
    }

    /// Percentage, or -1 when unknown.
    pub fn as_sentinel(&self) -> i32 {
        match self {
            Progress::Percent(p) => i32::from(*p),
            Progress::Unknown => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorKind::Canceled.code(), -1);
        assert_eq!(ErrorKind::Network.code(), 0);
        assert_eq!(ErrorKind::Http.code(), 1);
        assert_eq!(ErrorKind::Unknown.code(), 2);
        assert_eq!(ErrorKind::from_code(1), Some(ErrorKind::Http));
        assert_eq!(ErrorKind::from_code(7), None);
    }

    #[test]
    fn invalid_json_decodes_to_null() {
        assert_eq!(ResponseData::decode(b"{oops".to_vec(), ResponseType::Json), ResponseData::Json(Value::Null));
        assert_eq!(ResponseData::decode(Vec::new(), ResponseType::Json), ResponseData::Json(Value::Null));
        assert_eq!(
            ResponseData::decode(br#"{"a":1}"#.to_vec(), ResponseType::Json),
            ResponseData::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn empty_json_values() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(ResponseData::Json(falsy.clone()).is_empty(), "{falsy}");
        }
        for truthy in [json!(true), json!(1), json!("0"), json!([]), json!({})] {
            assert!(!ResponseData::Json(truthy.clone()).is_empty(), "{truthy}");
        }
    }

    #[test]
    fn progress_percent_is_floored() {
        assert_eq!(Progress::from_counts(1, Some(3)), Progress::Percent(33));
        assert_eq!(Progress::from_counts(3, Some(3)), Progress::Percent(100));
        assert_eq!(Progress::from_counts(5, None).as_sentinel(), -1);
        assert_eq!(Progress::from_counts(5, Some(0)), Progress::Unknown);
    }

    #[test]
    fn failure_displays_kind_and_status() {
        assert_eq!(Failure::new(ErrorKind::Http, 404).to_string(), "HTTP error (status 404)");
    }
}
