//! Request submission and the convenience surface.
//!
//! # Design
//! `HttpClient` holds a transport, a file saver and shared `Defaults`. A
//! call to `request` resolves the per-request options against a snapshot of
//! the defaults, describes the exchange as an `HttpRequest`, hands it to the
//! transport together with the handle's event sink, and returns the
//! `RequestHandle` without waiting for anything. Body encoding errors are
//! reported before the transport is touched; every later outcome is
//! delivered through the handle.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::body::{encode_payload, FormFields, Payload};
use crate::classify::ClassifyContext;
use crate::config::{Defaults, RequestConfig};
use crate::download::{DirectorySaver, FileSaver};
use crate::error::{BodyError, RequestError};
use crate::handle::RequestHandle;
use crate::headers::merge_headers;
use crate::http::{HttpMethod, HttpRequest, RequestType, ResponseType};
use crate::transport::Transport;

/// Submits requests through a host-provided `Transport`.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    saver: Arc<dyn FileSaver>,
    defaults: Arc<RwLock<Defaults>>,
}

impl HttpClient {
    /// Client with built-in defaults that saves downloads into the current
    /// directory.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            saver: Arc::new(DirectorySaver::new(".")),
            defaults: Arc::new(RwLock::new(Defaults::default())),
        }
    }

    pub fn with_file_saver(mut self, saver: Arc<dyn FileSaver>) -> Self {
        self.saver = saver;
        self
    }

    pub fn with_defaults(self, defaults: Defaults) -> Self {
        self.with_shared_defaults(Arc::new(RwLock::new(defaults)))
    }

    /// Share one defaults object between several clients or with the caller.
    pub fn with_shared_defaults(mut self, defaults: Arc<RwLock<Defaults>>) -> Self {
        self.defaults = defaults;
        self
    }

    /// The live defaults. Writes apply to requests submitted afterwards.
    pub fn defaults(&self) -> Arc<RwLock<Defaults>> {
        Arc::clone(&self.defaults)
    }

    pub fn update_defaults(&self, f: impl FnOnce(&mut Defaults)) {
        let mut defaults = self.defaults.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut defaults);
    }

    fn snapshot_defaults(&self) -> Defaults {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Submit a request. Returns as soon as the transport has been started.
    pub fn request(
        &self,
        url: &str,
        method: HttpMethod,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        let defaults = self.snapshot_defaults();

        let request_type = config.request_type.unwrap_or(defaults.request_type);
        let response_type = config.response_type.unwrap_or(defaults.response_type);
        let basic_auth = config.basic_auth.or(defaults.basic_auth);
        let bearer_token = config.bearer_token.or(defaults.bearer_token);
        let csrf_header = config.csrf_header.unwrap_or(defaults.csrf_header);
        let timeout = config.timeout.unwrap_or(defaults.timeout);

        let mut request = HttpRequest::new(method, url);
        request.timeout = (!timeout.is_zero()).then_some(timeout);
        request.with_credentials = config.with_credentials.unwrap_or(defaults.with_credentials);
        request.response_type = response_type;
        request.report_download_progress = config.download;
        request.report_upload_progress = config.upload;

        if let Some(auth) = &basic_auth {
            request.append_header("Authorization", &auth.header_value());
        } else if let Some(token) = &bearer_token {
            request.append_header("Authorization", &format!("Bearer {token}"));
        }

        if let Some(csrf) = &config.csrf {
            request.append_header(&csrf_header, csrf);
        }

        for (name, value) in merge_headers(&config.headers, &defaults.headers) {
            request.append_header(&name, &value);
        }

        if let Some(payload) = &config.body {
            if let Some(encoded) = encode_payload(payload, request_type)? {
                if let Some(content_type) = encoded.content_type {
                    request.append_header("Content-Type", content_type);
                }
                request.body = Some(encoded.body);
            }
        }

        let handle = RequestHandle::new(
            ClassifyContext {
                url: url.to_string(),
                response_type,
                download: config.download,
                validate_status: config.validate_status.unwrap_or(defaults.validate_status),
                saver: Arc::clone(&self.saver),
            },
            defaults.on_error,
            config.download,
            config.upload,
        );

        tracing::debug!(
            %method,
            url,
            request_type = ?request_type,
            response_type = response_type.as_str(),
            download = config.download,
            upload = config.upload,
            "submitting request"
        );
        let exchange = self.transport.send(request, handle.events());
        handle.attach(exchange);
        Ok(handle)
    }

    pub fn get(&self, url: &str, config: RequestConfig) -> Result<RequestHandle, RequestError> {
        self.request(url, HttpMethod::Get, config)
    }

    /// GET with a `text` response shape.
    pub fn get_text(&self, url: &str, config: RequestConfig) -> Result<RequestHandle, RequestError> {
        self.request(url, HttpMethod::Get, config.response_type(ResponseType::Text))
    }

    pub fn del(&self, url: &str, config: RequestConfig) -> Result<RequestHandle, RequestError> {
        self.request(url, HttpMethod::Delete, config)
    }

    /// GET a `blob` and hand it to the file saver on success.
    pub fn download(&self, url: &str, config: RequestConfig) -> Result<RequestHandle, RequestError> {
        self.request(
            url,
            HttpMethod::Get,
            config.download(true).response_type(ResponseType::Blob),
        )
    }

    pub fn post_raw(
        &self,
        url: &str,
        data: impl Into<String>,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Post, Payload::Text(data.into()), RequestType::Raw, config)
    }

    pub fn post_form(
        &self,
        url: &str,
        data: FormFields,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Post, Payload::Fields(data), RequestType::Form, config)
    }

    pub fn post_form_data(
        &self,
        url: &str,
        data: FormFields,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Post, Payload::Fields(data), RequestType::FormData, config)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        data: &T,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Post, to_json(data)?, RequestType::Json, config)
    }

    pub fn put_raw(
        &self,
        url: &str,
        data: impl Into<String>,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Put, Payload::Text(data.into()), RequestType::Raw, config)
    }

    pub fn put_form(
        &self,
        url: &str,
        data: FormFields,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Put, Payload::Fields(data), RequestType::Form, config)
    }

    pub fn put_form_data(
        &self,
        url: &str,
        data: FormFields,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Put, Payload::Fields(data), RequestType::FormData, config)
    }

    pub fn put_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        data: &T,
        config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        self.send_with(url, HttpMethod::Put, to_json(data)?, RequestType::Json, config)
    }

    fn send_with(
        &self,
        url: &str,
        method: HttpMethod,
        body: Payload,
        request_type: RequestType,
        mut config: RequestConfig,
    ) -> Result<RequestHandle, RequestError> {
        config.body = Some(body);
        config.request_type = Some(request_type);
        self.request(url, method, config)
    }
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> Result<Payload, BodyError> {
    Ok(Payload::Json(serde_json::to_value(data)?))
}
