use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::request::{forwarded_client_ip, negotiate, split_host, Request, RequestBody, X_FORWARDED_FOR, X_REAL_IP};

const DEFAULT_REMOTE_ADDR: &str = "127.0.0.1";

/// Body arranged on a [`MockRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockBody {
    /// JSON text, parsed when the handler deserializes it
    Raw(String),
    /// Already-built JSON value
    Value(Value),
}

/// In-memory request double for handler tests
///
/// Arrange inputs with the `set_*` methods, run the handler against
/// `&mut dyn Request`, then inspect the captured response.
#[derive(Debug)]
pub struct MockRequest {
    method: String,
    path: String,
    remote_addr: String,
    url_params: HashMap<String, String>,
    request_headers: HeaderMap,
    response_headers: HeaderMap,
    body: Option<MockBody>,
    context: HashMap<String, Value>,
    session: HashMap<String, Value>,
    session_saved: bool,
    status: Option<StatusCode>,
    response: Vec<u8>,
}

impl Default for MockRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRequest {
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            remote_addr: DEFAULT_REMOTE_ADDR.to_string(),
            url_params: HashMap::new(),
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            body: None,
            context: HashMap::new(),
            session: HashMap::new(),
            session_saved: false,
            status: None,
            response: Vec::new(),
        }
    }

    /// Use `data` as the request body
    pub fn set_request_data<T: Serialize>(&mut self, data: &T) -> serde_json::Result<()> {
        self.body = Some(MockBody::Value(serde_json::to_value(data)?));
        Ok(())
    }

    /// Use raw text as the request body, for malformed-input cases
    pub fn set_raw_body(&mut self, body: impl Into<String>) {
        self.body = Some(MockBody::Raw(body.into()));
    }

    pub fn set_url_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.url_params.insert(key.into(), value.into());
    }

    pub fn set_request_header(&mut self, key: &str, value: &str) {
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.request_headers.insert(name, value);
            }
            _ => tracing::warn!("Invalid request header '{}'", key),
        }
    }

    pub fn set_remote_addr(&mut self, addr: impl Into<String>) {
        self.remote_addr = addr.into();
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Seed a session value as if it came from the client's cookie
    pub fn set_session_value(&mut self, key: impl Into<String>, value: Value) {
        self.session.insert(key.into(), value);
    }

    /// Captured response body, empty if nothing was sent
    pub fn json_response(&self) -> &[u8] {
        &self.response
    }

    pub fn response_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.response)
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn response_header(&self, key: &str) -> Option<&str> {
        self.response_headers.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn session_saved(&self) -> bool {
        self.session_saved
    }
}

impl Request for MockRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn url_param(&self, key: &str) -> &str {
        self.url_params.get(key).map(String::as_str).unwrap_or("")
    }

    fn header(&self, key: &str) -> &str {
        self.request_headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    fn set_header(&mut self, key: &str, value: &str) {
        if self.status.is_some() {
            tracing::warn!("Header '{}' set after the response was sent; ignored", key);
            return;
        }
        match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.response_headers.insert(name, value);
            }
            _ => tracing::warn!("Invalid response header '{}'", key),
        }
    }

    fn context_data(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    fn set_context_data(&mut self, key: &str, value: Value) {
        self.context.insert(key.to_string(), value);
    }

    fn session_data(&self, key: &str) -> Option<&Value> {
        self.session.get(key)
    }

    fn set_session_data(&mut self, key: &str, value: Value) {
        self.session.insert(key.to_string(), value);
    }

    fn save_session(&mut self) {
        if self.status.is_some() {
            tracing::warn!("Session saved after the response was sent; changes are lost");
            return;
        }
        self.session_saved = true;
    }

    fn client_ip(&self) -> String {
        // A bare host passes through; the double has no transport port
        forwarded_client_ip(self.header(X_FORWARDED_FOR), self.header(X_REAL_IP))
            .or_else(|| split_host(&self.remote_addr).map(str::to_string))
            .unwrap_or_else(|| self.remote_addr.clone())
    }

    fn request_body(&self) -> Result<RequestBody<'_>, ApiError> {
        let body = self.body.as_ref().map(|body| match body {
            MockBody::Raw(text) => RequestBody::Json(text.as_bytes()),
            MockBody::Value(value) => RequestBody::Value(value),
        });
        negotiate(self.header("content-type"), body)
    }

    fn write_json(&mut self, status: StatusCode, body: Vec<u8>) {
        if self.status.is_some() {
            tracing::warn!("Response already sent; dropping second body");
            return;
        }
        self.response_headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.status = Some(status);
        self.response = body;
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }
}
