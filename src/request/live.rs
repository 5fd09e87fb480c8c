use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequestParts, RawPathParams};
use axum::http::{self, header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use http_body_util::LengthLimitError;
use serde_json::Value;

use super::{forwarded_client_ip, negotiate, split_host, Request, RequestBody, X_FORWARDED_FOR, X_REAL_IP};
use crate::error::{ApiError, ERR_REQUEST_TOO_LARGE, ERR_UNREADABLE_BODY};
use crate::session::{Session, SessionStore};

/// Response accumulated by the handler, turned into an axum response after
/// the chain returns
#[derive(Debug, Default)]
struct PendingResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Live request backed by an axum request
///
/// - `parts` is the request head (method, uri, headers, extensions)
/// - `body` is the buffered request body
/// - `session` is loaded from the cookie when the request is built
/// - `context` holds per-request values set by middleware and handlers
/// - `url_params` merges query parameters and router path parameters
pub struct HttpRequest {
    parts: http::request::Parts,
    body: Bytes,
    remote_addr: String,
    url_params: HashMap<String, String>,
    context: HashMap<String, Value>,
    session: Session,
    sessions: Arc<SessionStore>,
    response: PendingResponse,
}

impl HttpRequest {
    /// Wrap a request head and an already-buffered body
    pub fn new(parts: http::request::Parts, body: Bytes, sessions: Arc<SessionStore>) -> Self {
        let url_params = query_params(parts.uri.query());
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let session = sessions.load(&parts.headers);

        Self {
            parts,
            body,
            remote_addr,
            url_params,
            context: HashMap::new(),
            session,
            sessions,
            response: PendingResponse::default(),
        }
    }

    /// Build from the raw transport request: router path params, remote
    /// address and buffered body
    pub async fn from_transport(
        request: axum::extract::Request,
        sessions: Arc<SessionStore>,
        body_limit: usize,
    ) -> Result<Self, ApiError> {
        let (mut parts, body) = request.into_parts();

        let declared_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_length.is_some_and(|len| len > body_limit) {
            return Err(ERR_REQUEST_TOO_LARGE);
        }

        let path_params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();

        let body = axum::body::to_bytes(body, body_limit).await.map_err(|e| {
            if exceeds_length_limit(&e) {
                return ERR_REQUEST_TOO_LARGE;
            }
            tracing::warn!("Failed to buffer request body: {}", e);
            ERR_UNREADABLE_BODY
        })?;

        let mut request = Self::new(parts, body, sessions);
        if let Some(path_params) = path_params {
            request.set_url_params(path_params.iter());
        }
        Ok(request)
    }

    /// Path parameters win over query parameters of the same name
    pub fn set_url_params<'a>(&mut self, params: impl IntoIterator<Item = (&'a str, &'a str)>) {
        for (key, value) in params {
            self.url_params.insert(key.to_string(), value.to_string());
        }
    }

    pub fn set_remote_addr(&mut self, addr: impl Into<String>) {
        self.remote_addr = addr.into();
    }

    pub fn current_session(&self) -> &Session {
        &self.session
    }

    fn is_sent(&self) -> bool {
        self.response.status.is_some()
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.response.body));
        *response.status_mut() = self.response.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.response.headers;
        response
    }
}

impl Request for HttpRequest {
    fn method(&self) -> &str {
        self.parts.method.as_str()
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }

    fn url_param(&self, key: &str) -> &str {
        self.url_params.get(key).map(String::as_str).unwrap_or("")
    }

    fn header(&self, key: &str) -> &str {
        self.parts
            .headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    fn set_header(&mut self, key: &str, value: &str) {
        if self.is_sent() {
            tracing::warn!("Header '{}' set after the response was sent; ignored", key);
            return;
        }
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!("Invalid response header name '{}'", key);
                return;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.response.headers.insert(name, value);
            }
            Err(_) => tracing::warn!("Invalid value for response header '{}'", key),
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
        self.session.insert(key, value);
    }

    fn save_session(&mut self) {
        if self.is_sent() {
            tracing::warn!("Session saved after the response was sent; changes are lost");
            return;
        }
        match self.sessions.save(&self.session) {
            Ok(cookie) => {
                // Latest save replaces an earlier session cookie, other cookies stay
                let prefix = format!("{}=", self.sessions.cookie_name());
                let kept: Vec<HeaderValue> = self
                    .response
                    .headers
                    .get_all(header::SET_COOKIE)
                    .iter()
                    .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
                    .cloned()
                    .collect();
                self.response.headers.remove(header::SET_COOKIE);
                for value in kept {
                    self.response.headers.append(header::SET_COOKIE, value);
                }
                self.response.headers.append(header::SET_COOKIE, cookie);
            }
            Err(e) => tracing::error!("Failed to save session: {}", e),
        }
    }

    fn client_ip(&self) -> String {
        if let Some(ip) = forwarded_client_ip(self.header(X_FORWARDED_FOR), self.header(X_REAL_IP)) {
            return ip;
        }
        split_host(&self.remote_addr)
            .map(str::to_string)
            .unwrap_or_default()
    }

    fn request_body(&self) -> Result<RequestBody<'_>, ApiError> {
        negotiate(
            self.header(header::CONTENT_TYPE.as_str()),
            Some(RequestBody::Json(&self.body)),
        )
    }

    fn write_json(&mut self, status: StatusCode, body: Vec<u8>) {
        if self.is_sent() {
            tracing::warn!("Response already sent; dropping second body");
            return;
        }
        self.response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.response.status = Some(status);
        self.response.body = body;
    }

    fn status(&self) -> Option<StatusCode> {
        self.response.status
    }
}

/// True when buffering stopped because the body outgrew the limit
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::{ERR_JSON_PARSE_FAILED, ERR_UNSUPPORTED_CONTENT_TYPE};
    use crate::request::RequestExt;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct SampleRequest {
        #[serde(default)]
        a: String,
        #[serde(default)]
        b: i64,
        #[serde(default)]
        c: bool,
        #[serde(default)]
        d: String,
        #[serde(default)]
        e: i64,
        #[serde(default)]
        f: bool,
    }

    fn sessions() -> Arc<SessionStore> {
        Arc::new(
            SessionStore::new(&SessionConfig {
                secret: "test".to_string(),
                cookie_name: "sid".to_string(),
                max_age_secs: 60,
                secure: false,
            })
            .unwrap(),
        )
    }

    fn build(builder: http::request::Builder, body: &str) -> HttpRequest {
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        HttpRequest::new(parts, Bytes::from(body.to_string()), sessions())
    }

    fn post_json(content_type: &str, body: &str) -> HttpRequest {
        build(
            http::Request::builder()
                .method("POST")
                .uri("/def")
                .header("Content-Type", content_type),
            body,
        )
    }

    #[test]
    fn headers_are_case_insensitive_and_response_headers_replace() {
        let mut req = build(http::Request::builder().uri("/def").header("header-a", "a"), "");

        assert_eq!(req.header("header-b"), "");
        assert_eq!(req.header("header-a"), "a");
        assert_eq!(req.header("HEADER-A"), "a");

        req.set_header("header-x", "x");
        req.set_header("header-x", "y");
        let response = req.into_response();
        assert_eq!(response.headers().get("header-x").unwrap(), "y");
        assert!(response.headers().get("header-y").is_none());
    }

    #[test]
    fn url_params_merge_path_over_query() {
        let mut req = build(http::Request::builder().uri("/def?id=9&q=hello%20world"), "");
        req.set_url_params([("id", "3"), ("abc", "def"), ("long", "123456789012345678901234567890")]);

        assert_eq!(req.url_param("id"), "3");
        assert_eq!(req.url_param("q"), "hello world");
        assert_eq!(req.url_param("missing"), "");
        assert_eq!(req.url_param_uint("id"), Ok(3));
        assert!(req.url_param_uint("id2").is_err());
        assert!(req.url_param_uint("abc").is_err());
        assert!(req.url_param_uint("long").is_err());
    }

    #[test]
    fn context_data_last_write_wins() {
        let mut req = build(http::Request::builder(), "");
        req.set_context_data("abc", json!("random_context_data"));
        req.set_context_data("def", json!("def"));
        req.set_context_data("def", json!("ghi"));

        assert_eq!(req.context_data("abc"), Some(&json!("random_context_data")));
        assert_eq!(req.context::<String>("def").as_deref(), Some("ghi"));
        assert_eq!(req.context_data("ghi"), None);
        assert_eq!(req.context::<u32>("abc"), None);
    }

    #[test]
    fn json_body_deserializes_with_defaults() {
        let req = post_json("application/json", r#"{"a":"abcde","b":2,"c":true}"#);
        let data: SampleRequest = req.deserialize_request_data().unwrap();

        assert_eq!(
            data,
            SampleRequest {
                a: "abcde".to_string(),
                b: 2,
                c: true,
                ..SampleRequest::default()
            }
        );
    }

    #[test]
    fn missing_content_type_is_treated_as_json() {
        let req = build(http::Request::builder().method("POST"), r#"{"a":"x"}"#);
        let data: SampleRequest = req.deserialize_request_data().unwrap();
        assert_eq!(data.a, "x");
    }

    #[test]
    fn round_trip_through_serialization() {
        let original = SampleRequest {
            a: "abc".to_string(),
            b: -4,
            c: true,
            d: "d".to_string(),
            e: 7,
            f: true,
        };
        let body = serde_json::to_string(&original).unwrap();
        let req = post_json("application/json; charset=utf-8", &body);
        assert_eq!(req.deserialize_request_data::<SampleRequest>(), Ok(original));
    }

    #[test]
    fn poorly_encoded_json_fails_to_parse() {
        let req = post_json("application/json", r#"{"a":"abcde","b":2,"c":true"#);
        assert_eq!(
            req.deserialize_request_data::<SampleRequest>(),
            Err(ERR_JSON_PARSE_FAILED)
        );

        let empty = post_json("application/json", "");
        assert_eq!(
            empty.deserialize_request_data::<SampleRequest>(),
            Err(ERR_JSON_PARSE_FAILED)
        );
    }

    #[test]
    fn form_and_multipart_bodies_are_unsupported() {
        let form = post_json("application/x-www-form-urlencoded", "a=abcde&b=2&c=true");
        assert_eq!(
            form.deserialize_request_data::<SampleRequest>(),
            Err(ERR_UNSUPPORTED_CONTENT_TYPE)
        );

        let multipart = post_json("multipart/form-data", "--boundary\r\n\r\nabcde\r\n--boundary--");
        assert_eq!(
            multipart.deserialize_request_data::<SampleRequest>(),
            Err(ERR_UNSUPPORTED_CONTENT_TYPE)
        );
    }

    #[test]
    fn client_ip_precedence() {
        let mut xff = build(
            http::Request::builder()
                .header("X-Forwarded-For", "1.2.3.4, 5.6.7.8")
                .header("X-Real-Ip", "11.22.33.44"),
            "",
        );
        xff.set_remote_addr("55.66.77.88:12345");
        assert_eq!(xff.client_ip(), "1.2.3.4");

        let mut xri = build(
            http::Request::builder()
                .header("X-Forwarded-For", "")
                .header("X-Real-Ip", "11.22.33.44"),
            "",
        );
        xri.set_remote_addr("55.66.77.88:12345");
        assert_eq!(xri.client_ip(), "11.22.33.44");

        let mut remote = build(
            http::Request::builder()
                .header("X-Forwarded-For", "")
                .header("X-Real-Ip", ""),
            "",
        );
        remote.set_remote_addr("55.66.77.88:12345");
        assert_eq!(remote.client_ip(), "55.66.77.88");

        remote.set_remote_addr("55.66.77.88");
        assert_eq!(remote.client_ip(), "");
    }

    #[test]
    fn remote_addr_comes_from_connect_info() {
        let addr: SocketAddr = "10.0.0.7:4000".parse().unwrap();
        let req = build(http::Request::builder().extension(ConnectInfo(addr)), "");
        assert_eq!(req.client_ip(), "10.0.0.7");
    }

    #[tokio::test]
    async fn send_json_writes_content_type_status_and_body() {
        let mut req = build(http::Request::builder().uri("/def"), "");
        let mut output = std::collections::BTreeMap::new();
        output.insert("abc", 2);
        output.insert("def", 3);
        req.send_json(&output, StatusCode::CREATED);

        // Nothing may change once the response is sent
        req.set_header("x-late", "1");
        req.send_json(&json!({"other": true}), StatusCode::OK);

        let response = req.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().get("x-late").is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"abc":2,"def":3}"#);
    }

    #[tokio::test]
    async fn unserializable_output_becomes_internal_error() {
        let mut req = build(http::Request::builder(), "");
        let mut output = HashMap::new();
        output.insert((1, 2), "tuple keys are not valid JSON object keys");
        req.send_json(&output, StatusCode::OK);

        let response = req.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "internal_server_error");
    }

    #[test]
    fn unsent_request_defaults_to_empty_ok() {
        let response = build(http::Request::builder(), "").into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn saved_session_is_visible_on_next_request() {
        let store = sessions();
        let (parts, ()) = http::Request::builder().body(()).unwrap().into_parts();
        let mut first = HttpRequest::new(parts, Bytes::new(), store.clone());
        assert!(first.current_session().is_new());
        first.set_session_data("abc", json!(4));
        first.set_session_data("abc", json!(5));
        first.set_session_data("def", json!(true));
        first.save_session();

        let response = first.into_response();
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();

        let (parts, ()) = http::Request::builder()
            .header(header::COOKIE, pair)
            .body(())
            .unwrap()
            .into_parts();
        let second = HttpRequest::new(parts, Bytes::new(), store);
        assert_eq!(second.session_data("abc"), Some(&json!(5)));
        assert_eq!(second.session::<bool>("def"), Some(true));
        assert_eq!(second.session_data("ghi"), None);
    }

    #[test]
    fn repeated_save_keeps_one_session_cookie() {
        let store = sessions();
        let (parts, ()) = http::Request::builder().body(()).unwrap().into_parts();
        let mut req = HttpRequest::new(parts, Bytes::new(), store.clone());
        req.response
            .headers
            .append(header::SET_COOKIE, HeaderValue::from_static("theme=dark; Path=/"));

        req.set_session_data("step", json!(1));
        req.save_session();
        req.set_session_data("step", json!(2));
        req.save_session();

        let response = req.into_response();
        let cookies: Vec<&str> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.contains(&"theme=dark; Path=/"));

        let session_cookie = cookies.iter().find(|c| c.starts_with("sid=")).unwrap();
        let pair = session_cookie.split(';').next().unwrap();
        let (parts, ()) = http::Request::builder()
            .header(header::COOKIE, pair)
            .body(())
            .unwrap()
            .into_parts();
        let next = HttpRequest::new(parts, Bytes::new(), store);
        assert_eq!(next.session_data("step"), Some(&json!(2)));
    }

    #[test]
    fn unsaved_session_emits_no_cookie() {
        let mut req = build(http::Request::builder(), "");
        req.set_session_data("abc", json!(1));
        req.send_json(&json!({}), StatusCode::OK);
        req.save_session();

        assert!(req.into_response().headers().get(header::SET_COOKIE).is_none());
    }
}
