// HTTP API Error Types
use std::borrow::Cow;
use std::collections::BTreeMap;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors that know how to render themselves as an HTTP response body
pub trait ResponseError: std::error::Error + Send + Sync {
    /// JSON body to send to the client
    fn message(&self) -> Value;

    /// HTTP status code to send with the body
    fn status_code(&self) -> StatusCode;
}

/// HTTP API error with a fixed status code, a machine-readable code and a
/// client-friendly message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status_code: StatusCode,
    code: Cow<'static, str>,
    message: Cow<'static, str>,
}

/// General error sent when something unexpected happens on the server
pub const ERR_INTERNAL_SERVER_ERROR: ApiError = ApiError::from_static(
    StatusCode::INTERNAL_SERVER_ERROR,
    "internal_server_error",
    "Error occurred while processing the request",
);

/// Returned when the request declares a content type other than JSON
pub const ERR_UNSUPPORTED_CONTENT_TYPE: ApiError = ApiError::from_static(
    StatusCode::UNSUPPORTED_MEDIA_TYPE,
    "unsupported_content_type",
    "Currently, we are accepting application/json only",
);

/// Returned when the request body is not valid JSON for the target shape
pub const ERR_JSON_PARSE_FAILED: ApiError = ApiError::from_static(
    StatusCode::BAD_REQUEST,
    "json_parse_failed",
    "Failed to parse the request body as JSON",
);

/// Returned when the declared body length exceeds the configured limit
pub const ERR_REQUEST_TOO_LARGE: ApiError = ApiError::from_static(
    StatusCode::PAYLOAD_TOO_LARGE,
    "request_too_large",
    "Request body exceeds the allowed size",
);

/// Returned when the transport fails while the body is being buffered
pub const ERR_UNREADABLE_BODY: ApiError = ApiError::from_static(
    StatusCode::BAD_REQUEST,
    "unreadable_body",
    "Failed to read the request body",
);

impl ApiError {
    pub const fn from_static(
        status_code: StatusCode,
        code: &'static str,
        message: &'static str,
    ) -> Self {
        Self {
            status_code,
            code: Cow::Borrowed(code),
            message: Cow::Borrowed(message),
        }
    }

    pub fn new(
        status_code: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn text(&self) -> &str {
        &self.message
    }
}

// Static constructor methods for the common cases
impl ApiError {
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn internal_server_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error", message)
    }

    pub fn service_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }
}

impl ResponseError for ApiError {
    fn message(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
        })
    }

    fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

/// Validation errors for a single field.
///
/// Forms with list or sub-form inputs report errors with the same shape as
/// the input, so the variants nest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Atomic(Vec<String>),
    Array(Vec<FieldError>),
    Nested(BTreeMap<String, FieldError>),
}

impl Default for FieldError {
    fn default() -> Self {
        FieldError::Atomic(Vec::new())
    }
}

impl FieldError {
    /// True when at least one message exists anywhere below this node
    pub fn is_error(&self) -> bool {
        match self {
            FieldError::Atomic(messages) => !messages.is_empty(),
            FieldError::Array(items) => items.iter().any(FieldError::is_error),
            FieldError::Nested(fields) => fields.values().any(FieldError::is_error),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldError::Atomic(messages) => {
                Value::Array(messages.iter().cloned().map(Value::String).collect())
            }
            FieldError::Array(items) => Value::Array(items.iter().map(FieldError::to_json).collect()),
            FieldError::Nested(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, err)| (name.clone(), err.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Vec<String>> for FieldError {
    fn from(messages: Vec<String>) -> Self {
        FieldError::Atomic(messages)
    }
}

const FORM_ERROR_CODE: &str = "form_error";
const NON_FIELD_ERROR_KEY: &str = "_error";

/// Accumulates validation errors while a form is being checked
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("form validation failed")]
pub struct FormError {
    code: Option<String>,
    field_errors: BTreeMap<String, FieldError>,
    non_field_errors: Vec<String>,
}

impl FormError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or(FORM_ERROR_CODE)
    }

    /// Append a message to a field, creating the field if needed
    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        if field == NON_FIELD_ERROR_KEY {
            self.non_field_errors.push(message.into());
            return;
        }
        match self.field_errors.entry(field).or_default() {
            FieldError::Atomic(messages) => messages.push(message.into()),
            _ => {
                tracing::warn!("form field holds a structured error; dropping flat message");
            }
        }
    }

    /// Mark a field as validated so it is reported even without messages
    pub fn declare_field(&mut self, field: impl Into<String>) {
        let field = field.into();
        if field != NON_FIELD_ERROR_KEY {
            self.field_errors.entry(field).or_default();
        }
    }

    /// `_error` is the non-field list; only flat messages can go there
    pub fn set_field_error(&mut self, field: impl Into<String>, error: FieldError) {
        let field = field.into();
        if field != NON_FIELD_ERROR_KEY {
            self.field_errors.insert(field, error);
            return;
        }
        match error {
            FieldError::Atomic(messages) => self.non_field_errors.extend(messages),
            _ => tracing::warn!("structured error cannot replace the non-field list; dropped"),
        }
    }

    pub fn add_non_field_error(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    pub fn field_error(&self, field: &str) -> Option<&FieldError> {
        self.field_errors.get(field)
    }

    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }

    pub fn is_error(&self) -> bool {
        !self.non_field_errors.is_empty() || self.field_errors.values().any(FieldError::is_error)
    }
}

impl ResponseError for FormError {
    fn message(&self) -> Value {
        let mut fields = Map::new();
        fields.insert(
            NON_FIELD_ERROR_KEY.to_string(),
            Value::Array(self.non_field_errors.iter().cloned().map(Value::String).collect()),
        );
        for (name, err) in &self.field_errors {
            fields.insert(name.clone(), err.to_json());
        }

        json!({
            "code": self.code(),
            "message": fields,
        })
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

/// Failure to read a URL parameter as an unsigned integer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("URL parameter '{key}' is missing")]
    Missing { key: String },

    #[error("URL parameter '{key}' is not a valid unsigned integer: {value}")]
    Invalid { key: String, value: String },
}

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_url_param", err.to_string())
    }
}

impl From<crate::database::DatabaseError> for ApiError {
    fn from(err: crate::database::DatabaseError) -> Self {
        match err {
            crate::database::DatabaseError::NotOpen => {
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                // Log the real error but return generic message
                tracing::error!("Database error: {}", other);
                ERR_INTERNAL_SERVER_ERROR
            }
        }
    }
}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(ResponseError::message(&self))).into_response()
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(ResponseError::message(&self))).into_response()
    }
}
