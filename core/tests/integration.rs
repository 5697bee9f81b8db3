//! Request lifecycle tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port and drives `HttpClient` through a
//! blocking ureq transport that runs each exchange on its own thread, so
//! every event reaches the handle asynchronously, the way a host event loop
//! would deliver it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use kn_http::{
    ErrorKind, Exchange, FileSaver, FormFields, FormValue, HttpClient, HttpMethod, HttpRequest,
    Outcome, RequestConfig, RequestHandle, ResponseData, Transport, TransportEvents,
    TransportResponse,
};
use mock_server::Echo;

// ---------------------------------------------------------------------------
// ureq transport
// ---------------------------------------------------------------------------

struct UreqTransport;

struct ThreadExchange {
    done: Arc<AtomicBool>,
    events: TransportEvents,
}

impl Exchange for ThreadExchange {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// ureq cannot interrupt a blocking call; the worker's late events are
    /// dropped by the handle.
    fn abort(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.events.aborted(0);
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest, events: TransportEvents) -> Box<dyn Exchange> {
        let done = Arc::new(AtomicBool::new(false));
        let exchange = ThreadExchange {
            done: done.clone(),
            events: events.clone(),
        };
        std::thread::spawn(move || {
            execute(request, &events);
            done.store(true, Ordering::SeqCst);
        });
        Box::new(exchange)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Execute an `HttpRequest` with ureq and report the result as events.
///
/// Disables ureq's status-code-as-error behavior so 4xx/5xx responses are
/// reported as loaded responses and classified by the core.
fn execute(request: HttpRequest, events: &TransportEvents) {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(request.timeout)
        .build()
        .new_agent();

    let mut headers = request.headers.clone();
    let body = request.body.as_ref().map(|b| {
        if let Some(content_type) = b.implicit_content_type() {
            headers.push(("Content-Type".to_string(), content_type));
        }
        b.to_bytes()
    });

    let url = request.url.as_str();
    let body_len = body.as_ref().map_or(0, Vec::len) as u64;
    events.upload_progress(0, Some(body_len));

    let result = match (request.method, body) {
        (HttpMethod::Get, _) => with_headers(agent.get(url), &headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(url), &headers).call(),
        (HttpMethod::Head, _) => with_headers(agent.head(url), &headers).call(),
        (HttpMethod::Options, _) => with_headers(agent.options(url), &headers).call(),
        (HttpMethod::Post, Some(body)) => with_headers(agent.post(url), &headers).send(&body[..]),
        (HttpMethod::Post, None) => with_headers(agent.post(url), &headers).send_empty(),
        (HttpMethod::Put, Some(body)) => with_headers(agent.put(url), &headers).send(&body[..]),
        (HttpMethod::Put, None) => with_headers(agent.put(url), &headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => with_headers(agent.patch(url), &headers).send(&body[..]),
        (HttpMethod::Patch, None) => with_headers(agent.patch(url), &headers).send_empty(),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(ureq::Error::Timeout(_)) => return events.timed_out(0),
        Err(_) => return events.network_error(0),
    };
    events.upload_progress(body_len, Some(body_len));

    let status = response.status().as_u16();
    let raw_headers = response
        .headers()
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\r\n");
    let body = match response.body_mut().read_to_vec() {
        Ok(body) => body,
        Err(ureq::Error::Timeout(_)) => return events.timed_out(status),
        Err(_) => return events.network_error(status),
    };
    events.download_progress(body.len() as u64, Some(body.len() as u64));
    events.loaded(TransportResponse::new(status, raw_headers, body));
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSaver {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FileSaver for RecordingSaver {
    fn save(&self, data: &[u8], filename: &str) {
        self.saved.lock().unwrap().push((filename.to_string(), data.to_vec()));
    }
}

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn setup() -> (HttpClient, Arc<RecordingSaver>, String) {
    let saver = Arc::new(RecordingSaver::default());
    let client = HttpClient::new(Arc::new(UreqTransport)).with_file_saver(saver.clone());
    (client, saver, start_server())
}

/// Block until the request ends and return its outcome.
fn finish(handle: &RequestHandle) -> Outcome {
    let (tx, rx) = mpsc::channel();
    handle.on_end(move |_| {
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(10)).expect("request did not finish");
    handle.outcome().expect("outcome recorded before on_end")
}

fn success(outcome: Outcome) -> kn_http::Success {
    match outcome {
        Outcome::Success(s) => s,
        Outcome::Failure(f) => panic!("expected success, got {f}"),
    }
}

fn failure(outcome: Outcome) -> kn_http::Failure {
    match outcome {
        Outcome::Failure(f) => f,
        Outcome::Success(s) => panic!("expected failure, got {s:?}"),
    }
}

fn echo_of(outcome: Outcome) -> Echo {
    let data = success(outcome).data;
    serde_json::from_value(data.as_json().expect("json body").clone()).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn get_json() {
    let (client, _, base) = setup();
    let handle = client.get(&format!("{base}/json"), RequestConfig::new()).unwrap();
    let s = success(finish(&handle));
    assert_eq!(s.status, 200);
    assert_eq!(s.data.as_json().unwrap()["message"], "hello");
    assert_eq!(s.header("Content-Type"), Some("application/json"));
}

#[test]
fn get_text() {
    let (client, _, base) = setup();
    let handle = client.get_text(&format!("{base}/text"), RequestConfig::new()).unwrap();
    assert_eq!(success(finish(&handle)).data, ResponseData::Text("plain text".to_string()));
}

#[test]
fn non_200_is_http_failure() {
    let (client, _, base) = setup();
    for code in [201u16, 404, 500] {
        let handle = client.get(&format!("{base}/status/{code}"), RequestConfig::new()).unwrap();
        let f = failure(finish(&handle));
        assert_eq!(f.kind, ErrorKind::Http);
        assert_eq!(f.status, code);
        assert_eq!(f.data.unwrap().as_json().unwrap()["status"], code);
        assert!(f.headers.is_some());
    }
}

#[test]
fn empty_json_body_is_unknown() {
    let (client, _, base) = setup();
    let handle = client.get(&format!("{base}/empty"), RequestConfig::new()).unwrap();
    let f = failure(finish(&handle));
    assert_eq!(f.kind, ErrorKind::Unknown);
    assert_eq!(f.status, 200);
}

#[test]
fn download_saves_attachment() {
    let (client, saver, base) = setup();
    let handle = client.download(&format!("{base}/files/report.pdf"), RequestConfig::new()).unwrap();
    assert_eq!(success(finish(&handle)).data, ResponseData::Downloaded);
    assert_eq!(
        *saver.saved.lock().unwrap(),
        vec![("report.pdf".to_string(), b"contents of report.pdf".to_vec())]
    );
}

#[test]
fn download_without_disposition_uses_url_name() {
    let (client, saver, base) = setup();
    let handle = client
        .download(&format!("{base}/raw/data.csv?v=3"), RequestConfig::new())
        .unwrap();
    assert_eq!(success(finish(&handle)).data, ResponseData::Downloaded);
    assert_eq!(saver.saved.lock().unwrap()[0].0, "data.csv");
}

#[test]
fn default_headers_auth_and_csrf_are_sent() {
    let (client, _, base) = setup();
    let config = RequestConfig::new()
        .basic_auth("user", "pass")
        .bearer_token("ignored")
        .csrf("t0k")
        .header("Accept", "application/json");
    let handle = client.get(&format!("{base}/echo"), config).unwrap();
    let echo = echo_of(finish(&handle));
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.headers["accept"], "application/json");
    assert_eq!(echo.headers["x-requested-with"], "XMLHttpRequest");
    assert_eq!(echo.headers["authorization"], "Basic dXNlcjpwYXNz");
    assert_eq!(echo.headers["x-csrf"], "t0k");
}

#[test]
fn post_form_is_url_encoded() {
    let (client, _, base) = setup();
    let fields = FormFields::new()
        .field("a", 1)
        .field(
            "b",
            FormValue::mapping([("c", FormValue::from(2)), ("d", FormValue::sequence([3, 4]))]),
        )
        .field("tags", FormValue::sequence(Vec::<String>::new()));
    let handle = client.post_form(&format!("{base}/echo"), fields, RequestConfig::new()).unwrap();
    let echo = echo_of(finish(&handle));
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.headers["content-type"], "application/x-www-form-urlencoded");
    assert_eq!(echo.body, "a=1&b[c]=2&b[d][0]=3&b[d][1]=4&tags=");
}

#[test]
fn put_json_sets_content_type() {
    let (client, _, base) = setup();
    let handle = client
        .put_json(&format!("{base}/echo"), &serde_json::json!({"name": "kettle"}), RequestConfig::new())
        .unwrap();
    let echo = echo_of(finish(&handle));
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.headers["content-type"], "application/json");
    assert_eq!(echo.body, r#"{"name":"kettle"}"#);
}

#[test]
fn post_form_data_is_multipart() {
    let (client, _, base) = setup();
    let fields = FormFields::new()
        .field("title", "notes")
        .field("tags", FormValue::sequence(Vec::<String>::new()))
        .field("doc", kn_http::FilePart::new("a.txt", "file body").with_content_type("text/plain"));
    let handle = client
        .post_form_data(&format!("{base}/echo"), fields, RequestConfig::new().upload(true))
        .unwrap();
    let echo = echo_of(finish(&handle));
    assert!(echo.headers["content-type"].starts_with("multipart/form-data; boundary="));
    assert!(echo.body.contains("name=\"title\"\r\n\r\nnotes\r\n"));
    assert!(echo.body.contains("name=\"tags\"\r\n\r\n\r\n"));
    assert!(echo.body.contains("name=\"doc\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nfile body\r\n"));
}

#[test]
fn delete_and_raw_put() {
    let (client, _, base) = setup();
    let handle = client.del(&format!("{base}/echo"), RequestConfig::new()).unwrap();
    assert_eq!(echo_of(finish(&handle)).method, "DELETE");

    let handle = client.put_raw(&format!("{base}/echo"), "<x/>", RequestConfig::new()).unwrap();
    let echo = echo_of(finish(&handle));
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.body, "<x/>");
}

#[test]
fn timeout_is_unknown() {
    let (client, _, base) = setup();
    let handle = client
        .get(&format!("{base}/slow"), RequestConfig::new().timeout(Duration::from_millis(200)))
        .unwrap();
    let f = failure(finish(&handle));
    assert_eq!(f.kind, ErrorKind::Unknown);
    assert_eq!(f.status, 0);
}

#[test]
fn refused_connection_is_network_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = HttpClient::new(Arc::new(UreqTransport));
    let handle = client
        .get(&format!("http://127.0.0.1:{port}/json"), RequestConfig::new())
        .unwrap();
    let f = failure(finish(&handle));
    assert_eq!(f.kind, ErrorKind::Network);
    assert_eq!(f.status, 0);
}

#[test]
fn abort_in_flight_is_canceled_once() {
    let (client, _, base) = setup();
    let ends = Arc::new(AtomicUsize::new(0));
    let counter = ends.clone();
    let handle = client.get(&format!("{base}/slow"), RequestConfig::new()).unwrap();
    handle.on_end(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    handle.abort();

    let f = failure(handle.outcome().expect("abort settles synchronously"));
    assert_eq!(f.kind, ErrorKind::Canceled);

    // The worker's late load must be dropped.
    std::thread::sleep(mock_server::SLOW_DELAY + Duration::from_millis(300));
    assert_eq!(ends.load(Ordering::SeqCst), 1);
    handle.abort();
    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wait_resolves_with_outcome() {
    let (client, _, base) = setup();
    let handle = client.request(&format!("{base}/json"), "get".parse().unwrap(), RequestConfig::new()).unwrap();
    let outcome = handle.wait().await;
    assert!(outcome.is_success());
    assert_eq!(outcome.status(), 200);
}
