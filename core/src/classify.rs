//! Turns a transport's terminal event into an `Outcome`.

use std::sync::Arc;

use crate::config::StatusValidator;
use crate::download::{filename_from_disposition, FileSaver};
use crate::headers::{find_header, parse_response_headers};
use crate::http::{ResponseType, TransportResponse};
use crate::outcome::{ErrorKind, Failure, Outcome, ResponseData, Success};

/// The single event that ends a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Loaded(TransportResponse),
    /// No HTTP exchange completed. Carries the last known status.
    NetworkError(u16),
    TimedOut(u16),
    Aborted(u16),
}

/// Per-request inputs to classification, fixed at submission.
#[derive(Clone)]
pub struct ClassifyContext {
    pub url: String,
    pub response_type: ResponseType,
    pub download: bool,
    pub validate_status: StatusValidator,
    pub saver: Arc<dyn FileSaver>,
}

/// Classify a terminal event.
///
/// A loaded response that fails status validation is an `Http` failure
/// carrying the received body and headers. A valid `blob` response with
/// `download` set is handed to the file saver and reported as
/// `ResponseData::Downloaded`. A valid `json` response with an empty body
/// is an `Unknown` failure.
pub fn classify(event: TerminalEvent, ctx: &ClassifyContext) -> Outcome {
    let response = match event {
        TerminalEvent::Aborted(status) => return Outcome::Failure(Failure::new(ErrorKind::Canceled, status)),
        TerminalEvent::NetworkError(status) => return Outcome::Failure(Failure::new(ErrorKind::Network, status)),
        TerminalEvent::TimedOut(status) => return Outcome::Failure(Failure::new(ErrorKind::Unknown, status)),
        TerminalEvent::Loaded(response) => response,
    };

    let headers = parse_response_headers(&response.raw_headers);
    let status = response.status;

    if !ctx.validate_status.is_valid(status) {
        let data = ResponseData::decode(response.body, ctx.response_type);
        return Outcome::Failure(Failure::new(ErrorKind::Http, status).with_response(data, headers));
    }

    if ctx.download && ctx.response_type == ResponseType::Blob {
        let filename = filename_from_disposition(find_header(&headers, "content-disposition"), &ctx.url);
        tracing::debug!(url = %ctx.url, %filename, bytes = response.body.len(), "saving download");
        ctx.saver.save(&response.body, &filename);
        return Outcome::Success(Success {
            data: ResponseData::Downloaded,
            headers,
            status,
        });
    }

    let data = ResponseData::decode(response.body, ctx.response_type);
    if ctx.response_type == ResponseType::Json && data.is_empty() {
        return Outcome::Failure(Failure::new(ErrorKind::Unknown, status).with_response(data, headers));
    }

    Outcome::Success(Success { data, headers, status })
}
