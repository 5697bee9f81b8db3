//! Verify encoders and classification against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Each vector file lists inputs and the expected result. The vectors are
//! shared data so other hosts of the same request lifecycle can check
//! themselves against identical cases.

use std::sync::{Arc, Mutex};

use kn_http::classify::{classify, ClassifyContext, TerminalEvent};
use kn_http::{
    encode_form, filename_from_disposition, BodyError, ErrorKind, FileSaver, FormFields, Outcome,
    ResponseData, ResponseType, StatusValidator, TransportResponse,
};
use serde_json::Value;

fn cases<'a>(vectors: &'a Value, key: &str) -> &'a Vec<Value> {
    vectors[key].as_array().unwrap()
}

// ---------------------------------------------------------------------------
// Form encoding
// ---------------------------------------------------------------------------

#[test]
fn form_test_vectors() {
    let raw = include_str!("../../test-vectors/form.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in cases(&vectors, "cases") {
        let name = case["name"].as_str().unwrap();
        let fields = FormFields::try_from(case["fields"].clone()).unwrap();
        let encoded = encode_form(&fields).unwrap();
        assert_eq!(encoded, case["expected"].as_str().unwrap(), "{name}");
    }

    for case in cases(&vectors, "rejected") {
        let name = case["name"].as_str().unwrap();
        let err = FormFields::try_from(case["fields"].clone()).unwrap_err();
        match case["error"].as_str().unwrap() {
            "sequence" => assert!(matches!(err, BodyError::TopLevelSequence), "{name}: {err}"),
            "scalar" => assert!(matches!(err, BodyError::TopLevelScalar), "{name}: {err}"),
            other => panic!("unknown error kind: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Download filenames
// ---------------------------------------------------------------------------

#[test]
fn filename_test_vectors() {
    let raw = include_str!("../../test-vectors/filename.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in cases(&vectors, "cases") {
        let name = case["name"].as_str().unwrap();
        let resolved = filename_from_disposition(
            case["disposition"].as_str(),
            case["url"].as_str().unwrap(),
        );
        assert_eq!(resolved, case["expected"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSaver {
    saved: Mutex<Vec<String>>,
}

impl FileSaver for RecordingSaver {
    fn save(&self, _data: &[u8], filename: &str) {
        self.saved.lock().unwrap().push(filename.to_string());
    }
}

fn parse_event(event: &Value) -> TerminalEvent {
    let status = event["status"].as_u64().unwrap() as u16;
    match event["type"].as_str().unwrap() {
        "loaded" => TerminalEvent::Loaded(TransportResponse::new(
            status,
            event["headers"].as_str().unwrap(),
            event["body"].as_str().unwrap().as_bytes().to_vec(),
        )),
        "network_error" => TerminalEvent::NetworkError(status),
        "timed_out" => TerminalEvent::TimedOut(status),
        "aborted" => TerminalEvent::Aborted(status),
        other => panic!("unknown event type: {other}"),
    }
}

fn data_as_json(data: &ResponseData) -> Value {
    match data {
        ResponseData::Json(value) => value.clone(),
        ResponseData::Text(text) => Value::String(text.clone()),
        other => panic!("unexpected data in vector: {other:?}"),
    }
}

#[test]
fn classify_test_vectors() {
    let raw = include_str!("../../test-vectors/classify.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let saver = Arc::new(RecordingSaver::default());

    for case in cases(&vectors, "cases") {
        let name = case["name"].as_str().unwrap();
        let response_type: ResponseType =
            serde_json::from_value(case["response_type"].clone()).unwrap();
        let ctx = ClassifyContext {
            url: "https://h/api".to_string(),
            response_type,
            download: false,
            validate_status: StatusValidator::default(),
            saver: saver.clone(),
        };
        let expected = &case["expected"];
        let expected_status = expected["status"].as_u64().unwrap() as u16;

        match classify(parse_event(&case["event"]), &ctx) {
            Outcome::Success(success) => {
                assert!(expected["success"].as_bool().unwrap(), "{name}: unexpected success");
                assert_eq!(success.status, expected_status, "{name}: status");
                assert_eq!(data_as_json(&success.data), expected["data"], "{name}: data");
            }
            Outcome::Failure(failure) => {
                assert!(!expected["success"].as_bool().unwrap(), "{name}: unexpected {failure}");
                let code = expected["code"].as_i64().unwrap() as i32;
                assert_eq!(failure.code(), code, "{name}: code");
                assert_eq!(Some(failure.kind), ErrorKind::from_code(code), "{name}: kind");
                assert_eq!(failure.status, expected_status, "{name}: status");
                if let Some(data) = expected.get("data") {
                    let actual = failure.data.as_ref().map(data_as_json);
                    assert_eq!(actual.as_ref(), Some(data), "{name}: data");
                }
            }
        }
    }
    assert!(saver.saved.lock().unwrap().is_empty());
}
