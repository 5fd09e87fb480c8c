//! Capability-oriented request wrapper.
//!
//! Handlers are written against `&mut dyn Request`, so the same handler runs
//! on a live axum request ([`HttpRequest`]) or on the in-memory double
//! ([`crate::testing::MockRequest`]).

mod live;

pub use live::HttpRequest;

use axum::http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{
    ApiError, ParamError, ResponseError, ERR_INTERNAL_SERVER_ERROR, ERR_JSON_PARSE_FAILED,
    ERR_UNSUPPORTED_CONTENT_TYPE,
};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Request body after content negotiation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestBody<'a> {
    /// Raw JSON text as received
    Json(&'a [u8]),
    /// Already-decoded value, used by the test double
    Value(&'a Value),
}

/// Operations every Helios request exposes to handlers
pub trait Request: Send {
    fn method(&self) -> &str;

    fn path(&self) -> &str;

    /// Path or query parameter, empty when absent
    fn url_param(&self, key: &str) -> &str;

    /// Request header (case-insensitive), empty when absent
    fn header(&self, key: &str) -> &str;

    /// Set a response header, replacing any previous value
    fn set_header(&mut self, key: &str, value: &str);

    fn context_data(&self, key: &str) -> Option<&Value>;

    fn set_context_data(&mut self, key: &str, value: Value);

    fn session_data(&self, key: &str) -> Option<&Value>;

    fn set_session_data(&mut self, key: &str, value: Value);

    /// Persist session values; writes made without saving are lost
    fn save_session(&mut self);

    fn client_ip(&self) -> String;

    /// Negotiate the body content type; only JSON is accepted
    fn request_body(&self) -> Result<RequestBody<'_>, ApiError>;

    /// Write `Content-Type: application/json`, the status and the body
    fn write_json(&mut self, status: StatusCode, body: Vec<u8>);

    /// Status of the response written so far
    fn status(&self) -> Option<StatusCode>;
}

/// Typed helpers available on every [`Request`]
pub trait RequestExt: Request {
    /// Parse a URL parameter as a 32-bit unsigned integer
    fn url_param_uint(&self, key: &str) -> Result<u32, ParamError> {
        parse_uint_param(key, self.url_param(key))
    }

    /// Decode the negotiated body into `T`
    fn deserialize_request_data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let decoded = match self.request_body()? {
            RequestBody::Json(bytes) => serde_json::from_slice(bytes),
            RequestBody::Value(value) => T::deserialize(value),
        };
        decoded.map_err(|e| {
            tracing::debug!("Request body rejected: {}", e);
            ERR_JSON_PARSE_FAILED
        })
    }

    /// Serialize `output` and send it with `status`.
    ///
    /// A value that cannot be serialized turns into a 500 response.
    fn send_json<T: Serialize + ?Sized>(&mut self, output: &T, status: StatusCode) {
        match serde_json::to_vec(output) {
            Ok(body) => self.write_json(status, body),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                let body = ERR_INTERNAL_SERVER_ERROR.message().to_string().into_bytes();
                self.write_json(ERR_INTERNAL_SERVER_ERROR.status_code(), body);
            }
        }
    }

    fn send_error(&mut self, err: &dyn ResponseError) {
        self.send_json(&err.message(), err.status_code());
    }

    fn context<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.context_data(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    fn set_context<T: Serialize>(&mut self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_context_data(key, value);
        Ok(())
    }

    fn session<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.session_data(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    fn set_session<T: Serialize>(&mut self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_session_data(key, value);
        Ok(())
    }
}

impl<R: Request + ?Sized> RequestExt for R {}

fn parse_uint_param(key: &str, raw: &str) -> Result<u32, ParamError> {
    if raw.is_empty() {
        return Err(ParamError::Missing { key: key.to_string() });
    }
    // u32::from_str accepts a leading '+', plain digits only here
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParamError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        });
    }
    raw.parse::<u32>().map_err(|_| ParamError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Empty or `application/json` (parameters ignored)
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    media_type.is_empty() || media_type.eq_ignore_ascii_case("application/json")
}

pub(crate) fn negotiate<'a>(
    content_type: &str,
    body: Option<RequestBody<'a>>,
) -> Result<RequestBody<'a>, ApiError> {
    if !is_json_content_type(content_type) {
        return Err(ERR_UNSUPPORTED_CONTENT_TYPE);
    }
    // A missing body reads as empty JSON text, which fails to parse
    Ok(body.unwrap_or(RequestBody::Json(&[])))
}

/// First `X-Forwarded-For` entry, then `X-Real-Ip`, both trimmed
pub(crate) fn forwarded_client_ip(forwarded_for: &str, real_ip: &str) -> Option<String> {
    let first = forwarded_for.split(',').next().unwrap_or("").trim();
    if !first.is_empty() {
        return Some(first.to_string());
    }
    let real_ip = real_ip.trim();
    if !real_ip.is_empty() {
        return Some(real_ip.to_string());
    }
    None
}

/// Host part of a `host:port` or `[host]:port` address
pub(crate) fn split_host(addr: &str) -> Option<&str> {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return tail.starts_with(':').then_some(host);
    }
    let (host, _port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some(host)
}
