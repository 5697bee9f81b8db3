//! Request body encoders: URL-encoded form, multipart form, raw and JSON.
//!
//! # Design
//! Form payloads are an explicit tree of `FormValue` nodes instead of
//! dynamically inspected objects. The top level is always a `FormFields`
//! mapping, so a nameless sequence cannot reach the encoders. Nested
//! entries get bracketed names, `parent[key]` for mappings and
//! `parent[index]` for sequences, recursively.

use serde_json::Value;
use uuid::Uuid;

use crate::error::BodyError;
use crate::http::{RequestBody, RequestType};
use crate::outcome::is_empty_json;

/// A file appended to a multipart body as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One node of a form payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    /// Serializes as an empty value.
    Null,
    Scalar(String),
    Sequence(Vec<FormValue>),
    Mapping(Vec<(String, FormValue)>),
    File(FilePart),
}

impl FormValue {
    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FormValue>,
    {
        FormValue::Sequence(items.into_iter().map(Into::into).collect())
    }

    pub fn mapping<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FormValue>,
    {
        FormValue::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Scalar(value)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<i32> for FormValue {
    fn from(value: i32) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<u64> for FormValue {
    fn from(value: u64) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<f64> for FormValue {
    fn from(value: f64) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

impl From<FilePart> for FormValue {
    fn from(value: FilePart) -> Self {
        FormValue::File(value)
    }
}

impl<T: Into<FormValue>> From<Option<T>> for FormValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FormValue::Null, Into::into)
    }
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FormValue::Null,
            Value::Bool(b) => FormValue::Scalar(b.to_string()),
            Value::Number(n) => FormValue::Scalar(n.to_string()),
            Value::String(s) => FormValue::Scalar(s),
            Value::Array(items) => FormValue::sequence(items),
            Value::Object(map) => FormValue::mapping(map),
        }
    }
}

/// Named top-level fields of a form payload, in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormFields(Vec<(String, FormValue)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field and return `self` for chaining.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FormValue>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FormValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<FormValue>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FormFields(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl TryFrom<Value> for FormFields {
    type Error = BodyError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Array(_) => Err(BodyError::TopLevelSequence),
            _ => Err(BodyError::TopLevelScalar),
        }
    }
}

/// Serialize fields to an `application/x-www-form-urlencoded` string.
///
/// Values are percent-encoded; compound names are emitted as-is. An empty
/// sequence or mapping under a name yields `name=`.
pub fn encode_form(fields: &FormFields) -> Result<String, BodyError> {
    let mut pairs = Vec::new();
    for (name, value) in fields.iter() {
        push_form_pairs(name, value, &mut pairs)?;
    }
    Ok(pairs.join("&"))
}

fn push_form_pairs(name: &str, value: &FormValue, out: &mut Vec<String>) -> Result<(), BodyError> {
    match value {
        FormValue::Null => out.push(format!("{name}=")),
        FormValue::Scalar(s) => out.push(format!("{name}={}", encode_component(s))),
        FormValue::Sequence(items) if items.is_empty() => out.push(format!("{name}=")),
        FormValue::Mapping(entries) if entries.is_empty() => out.push(format!("{name}=")),
        FormValue::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                push_form_pairs(&format!("{name}[{index}]"), item, out)?;
            }
        }
        FormValue::Mapping(entries) => {
            for (key, item) in entries {
                push_form_pairs(&format!("{name}[{key}]"), item, out)?;
            }
        }
        FormValue::File(_) => return Err(BodyError::FileInForm(name.to_string())),
    }
    Ok(())
}

/// Percent-encode a form value, leaving the URI component marks
/// `! ' ( ) *` literal alongside `A-Z a-z 0-9 - _ . ~`.
fn encode_component(value: &str) -> String {
    const MARKS: [(&str, &str); 5] = [
        ("%21", "!"),
        ("%27", "'"),
        ("%28", "("),
        ("%29", ")"),
        ("%2A", "*"),
    ];
    // `%` itself is always emitted as `%25`, so these triplets cannot come
    // from escaped input.
    MARKS
        .iter()
        .fold(urlencoding::encode(value).into_owned(), |acc, &(escaped, mark)| {
            acc.replace(escaped, mark)
        })
}

/// Content of a single multipart part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    Text(String),
    File(FilePart),
}

/// A flattened multipart form: ordered `(name, content)` parts plus the
/// boundary used when rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<(String, PartContent)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(format!("----KnHttpBoundary{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, content: PartContent) {
        self.parts.push((name.into(), content));
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[(String, PartContent)] {
        &self.parts
    }

    /// Text value of the first part named `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|(n, content)| match content {
            PartContent::Text(text) if n == name => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Render the `multipart/form-data` wire body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, content) in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match content {
                PartContent::Text(text) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_part_name(name)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(text.as_bytes());
                }
                PartContent::File(file) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape_part_name(name),
                            escape_part_name(&file.filename)
                        )
                        .as_bytes(),
                    );
                    let content_type = file
                        .content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    out.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    out.extend_from_slice(&file.data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_part_name(name: &str) -> String {
    name.replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Flatten fields into a multipart form.
///
/// Naming follows `encode_form`; an empty sequence or mapping yields a part
/// with empty content and files are appended untouched.
pub fn encode_multipart(fields: &FormFields) -> MultipartForm {
    let mut form = MultipartForm::new();
    for (name, value) in fields.iter() {
        push_parts(name, value, &mut form);
    }
    form
}

fn push_parts(name: &str, value: &FormValue, form: &mut MultipartForm) {
    match value {
        FormValue::Null => form.append(name, PartContent::Text(String::new())),
        FormValue::Scalar(s) => form.append(name, PartContent::Text(s.clone())),
        FormValue::File(file) => form.append(name, PartContent::File(file.clone())),
        FormValue::Sequence(items) if items.is_empty() => {
            form.append(name, PartContent::Text(String::new()))
        }
        FormValue::Mapping(entries) if entries.is_empty() => {
            form.append(name, PartContent::Text(String::new()))
        }
        FormValue::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                push_parts(&format!("{name}[{index}]"), item, form);
            }
        }
        FormValue::Mapping(entries) => {
            for (key, item) in entries {
                push_parts(&format!("{name}[{key}]"), item, form);
            }
        }
    }
}

/// A request payload before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
    Fields(FormFields),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Json(_) => "JSON",
            Payload::Fields(_) => "form fields",
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<FormFields> for Payload {
    fn from(value: FormFields) -> Self {
        Payload::Fields(value)
    }
}

/// Wire body plus the Content-Type the client must set for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    pub body: RequestBody,
    pub content_type: Option<&'static str>,
}

/// Encode `payload` for `request_type`.
///
/// Returns `Ok(None)` for an empty payload (empty text, or a JSON `null`,
/// `false`, `0` or `""`), which is sent as no body.
pub fn encode_payload(
    payload: &Payload,
    request_type: RequestType,
) -> Result<Option<EncodedBody>, BodyError> {
    let empty = match payload {
        Payload::Text(text) => text.is_empty(),
        Payload::Json(value) => is_empty_json(value),
        Payload::Fields(_) => false,
    };
    if empty {
        return Ok(None);
    }
    let unsupported = || BodyError::UnsupportedPayload {
        payload: payload.kind(),
        request_type,
    };
    let encoded = match (request_type, payload) {
        (RequestType::Raw, Payload::Text(text)) => EncodedBody {
            body: RequestBody::Text(text.clone()),
            content_type: None,
        },
        (RequestType::Raw, Payload::Json(Value::String(text))) => EncodedBody {
            body: RequestBody::Text(text.clone()),
            content_type: None,
        },
        (RequestType::Raw, Payload::Json(value)) => EncodedBody {
            body: RequestBody::Text(value.to_string()),
            content_type: None,
        },
        (RequestType::Json, Payload::Text(text)) => EncodedBody {
            body: RequestBody::Text(serde_json::to_string(text)?),
            content_type: Some("application/json"),
        },
        (RequestType::Json, Payload::Json(value)) => EncodedBody {
            body: RequestBody::Text(serde_json::to_string(value)?),
            content_type: Some("application/json"),
        },
        (RequestType::Form, Payload::Fields(fields)) => EncodedBody {
            body: RequestBody::Text(encode_form(fields)?),
            content_type: Some("application/x-www-form-urlencoded"),
        },
        (RequestType::Form, Payload::Json(value)) => EncodedBody {
            body: RequestBody::Text(encode_form(&FormFields::try_from(value.clone())?)?),
            content_type: Some("application/x-www-form-urlencoded"),
        },
        (RequestType::FormData, Payload::Fields(fields)) => EncodedBody {
            body: RequestBody::Multipart(encode_multipart(fields)),
            content_type: None,
        },
        (RequestType::FormData, Payload::Json(value)) => EncodedBody {
            body: RequestBody::Multipart(encode_multipart(&FormFields::try_from(value.clone())?)),
            content_type: None,
        },
        (RequestType::Raw | RequestType::Json, Payload::Fields(_))
        | (RequestType::Form | RequestType::FormData, Payload::Text(_)) => return Err(unsupported()),
    };
    Ok(Some(encoded))
}
