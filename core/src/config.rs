//! Client-wide defaults and per-request options.
//!
//! # Design
//! `Defaults` is shared as `Arc<RwLock<Defaults>>` between the caller and
//! the `HttpClient`. Every request takes a snapshot at submission time, so
//! the last write before a call wins and in-flight requests are unaffected.
//! `RequestConfig` fields are all optional and fall back to that snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use crate::body::Payload;
use crate::error::ConfigError;
use crate::http::{RequestType, ResponseType};
use crate::outcome::Failure;

/// Default transport timeout: 270 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(270_000);

/// Default header carrying the CSRF token.
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF";

/// Decides whether a status code counts as success.
#[derive(Clone)]
pub struct StatusValidator(Arc<dyn Fn(u16) -> bool + Send + Sync>);

impl StatusValidator {
    pub fn new(f: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Accept any 2xx status.
    pub fn any_2xx() -> Self {
        Self::new(|status| (200..300).contains(&status))
    }

    pub fn is_valid(&self, status: u16) -> bool {
        (self.0)(status)
    }
}

impl Default for StatusValidator {
    /// Exactly 200.
    fn default() -> Self {
        Self::new(|status| status == 200)
    }
}

impl fmt::Debug for StatusValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusValidator(..)")
    }
}

/// Process-wide error observer, invoked for every failed request before
/// the request's own `on_error` callback.
#[derive(Clone)]
pub struct ErrorHook(Arc<dyn Fn(&Failure) + Send + Sync>);

impl ErrorHook {
    pub fn new(f: impl Fn(&Failure) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, failure: &Failure) {
        (self.0)(failure)
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHook(..)")
    }
}

/// Credentials for the `Basic` authorization scheme.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Basic <base64(username:password)>`
    pub fn header_value(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

/// Client-wide request defaults.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub validate_status: StatusValidator,
    pub timeout: Duration,
    pub basic_auth: Option<BasicAuth>,
    pub bearer_token: Option<String>,
    pub with_credentials: bool,
    pub request_type: RequestType,
    pub response_type: ResponseType,
    pub csrf_header: String,
    pub headers: Vec<(String, String)>,
    pub on_error: Option<ErrorHook>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            validate_status: StatusValidator::default(),
            timeout: DEFAULT_TIMEOUT,
            basic_auth: None,
            bearer_token: None,
            with_credentials: false,
            request_type: RequestType::Raw,
            response_type: ResponseType::Json,
            csrf_header: DEFAULT_CSRF_HEADER.to_string(),
            headers: vec![
                ("Accept".to_string(), "*/*".to_string()),
                ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
            ],
            on_error: None,
        }
    }
}

/// Serializable overlay for `Defaults`. Absent fields leave the current
/// value untouched; `headers` entries are merged by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DefaultsFile {
    pub timeout: Option<u64>,
    pub basic_auth: Option<BasicAuth>,
    pub bearer_auth_token: Option<String>,
    pub with_credentials: Option<bool>,
    pub request_type: Option<RequestType>,
    pub response_type: Option<ResponseType>,
    pub csrf_header: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl Defaults {
    /// Built-in defaults overlaid with a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: DefaultsFile = serde_json::from_str(json)?;
        let mut defaults = Self::default();
        defaults.apply(file);
        Ok(defaults)
    }

    /// Built-in defaults overlaid with a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn apply(&mut self, file: DefaultsFile) {
        if let Some(ms) = file.timeout {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(auth) = file.basic_auth {
            self.basic_auth = Some(auth);
        }
        if let Some(token) = file.bearer_auth_token {
            self.bearer_token = Some(token);
        }
        if let Some(flag) = file.with_credentials {
            self.with_credentials = flag;
        }
        if let Some(request_type) = file.request_type {
            self.request_type = request_type;
        }
        if let Some(response_type) = file.response_type {
            self.response_type = response_type;
        }
        if let Some(header) = file.csrf_header {
            self.csrf_header = header;
        }
        for (name, value) in file.headers {
            match self
                .headers
                .iter_mut()
                .find(|(existing, _)| existing.trim().eq_ignore_ascii_case(name.trim()))
            {
                Some((_, existing)) => *existing = value,
                None => self.headers.push((name, value)),
            }
        }
    }
}

/// Options for a single request. Unset fields fall back to `Defaults`.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub timeout: Option<Duration>,
    pub request_type: Option<RequestType>,
    pub response_type: Option<ResponseType>,
    pub with_credentials: Option<bool>,
    pub basic_auth: Option<BasicAuth>,
    pub bearer_token: Option<String>,
    pub csrf_header: Option<String>,
    pub csrf: Option<String>,
    /// Wire download progress and save a `blob` response through the
    /// file saver.
    pub download: bool,
    /// Wire upload progress and upload-phase network errors.
    pub upload: bool,
    pub headers: Vec<(String, String)>,
    pub body: Option<Payload>,
    pub validate_status: Option<StatusValidator>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn with_credentials(mut self, flag: bool) -> Self {
        self.with_credentials = Some(flag);
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(BasicAuth::new(username, password));
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn csrf(mut self, token: impl Into<String>) -> Self {
        self.csrf = Some(token.into());
        self
    }

    pub fn csrf_header(mut self, name: impl Into<String>) -> Self {
        self.csrf_header = Some(name.into());
        self
    }

    pub fn download(mut self, flag: bool) -> Self {
        self.download = flag;
        self
    }

    pub fn upload(mut self, flag: bool) -> Self {
        self.upload = flag;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn validate_status(mut self, validator: StatusValidator) -> Self {
        self.validate_status = Some(validator);
        self
    }
}
