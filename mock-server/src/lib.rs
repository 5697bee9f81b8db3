use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, Request},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

/// How long `/slow` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_millis(1500);

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/json", get(json_payload))
        .route("/text", get(text_payload))
        .route("/empty", get(empty_payload))
        .route("/status/{code}", any(status_payload))
        .route("/echo", any(echo))
        .route("/files/{name}", get(attachment))
        .route("/raw/{name}", get(raw_file))
        .route("/slow", get(slow))
        .layer(middleware::from_fn(log_request))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    tracing::info!(%method, %uri, status = response.status().as_u16(), "served");
    response
}

async fn json_payload() -> Json<serde_json::Value> {
    Json(json!({"message": "hello", "items": [1, 2, 3]}))
}

async fn text_payload() -> &'static str {
    "plain text"
}

async fn empty_payload() -> StatusCode {
    StatusCode::OK
}

async fn status_payload(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({"status": code}))).into_response()
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(Echo {
        method: method.as_str().to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn attachment(Path(name): Path<String>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        format!("contents of {name}"),
    )
}

async fn raw_file(Path(name): Path<String>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        format!("raw {name}"),
    )
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_DELAY).await;
    "finally"
}
