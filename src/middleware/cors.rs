use std::collections::HashSet;
use std::sync::Arc;

use super::{Handler, Middleware};

const ORIGIN: &str = "origin";
const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "access-control-allow-origin";
const WILDCARD: &str = "*";

#[derive(Debug)]
enum AllowedOrigins {
    Any,
    List(HashSet<String>),
}

impl AllowedOrigins {
    fn permits(&self, origin: &str) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => origins.contains(origin),
        }
    }
}

/// Echo the request `Origin` in `Access-Control-Allow-Origin` when allowed
///
/// An entry of `"*"` allows every origin. A disallowed origin gets an empty
/// header value. The wrapped handler always runs.
pub fn cors<I, S>(origins: I) -> Middleware
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let origins: HashSet<String> = origins.into_iter().map(Into::into).collect();
    let allowed = Arc::new(if origins.contains(WILDCARD) {
        AllowedOrigins::Any
    } else {
        AllowedOrigins::List(origins)
    });

    Middleware::new(move |next| {
        let allowed = allowed.clone();
        Handler::new(move |req| {
            let allowed = allowed.clone();
            let next = next.clone();
            Box::pin(async move {
                let origin = req.header(ORIGIN);
                let value = if allowed.permits(origin) {
                    origin.to_string()
                } else {
                    String::new()
                };
                req.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, &value);
                next.call(req).await;
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::chain;
    use crate::request::Request;
    use crate::testing::MockRequest;
    use serde_json::json;

    async fn run(origins: &[&str], origin: Option<&str>) -> MockRequest {
        let handler = chain(
            Handler::from_sync(|req| req.set_context_data("called", json!(true))),
            &[cors(origins.iter().copied())],
        );
        let mut req = MockRequest::new();
        if let Some(origin) = origin {
            req.set_request_header("Origin", origin);
        }
        handler.call(&mut req).await;
        assert_eq!(req.context_data("called"), Some(&json!(true)));
        req
    }

    #[tokio::test]
    async fn listed_origin_is_echoed() {
        let req = run(&["http://abc.com"], Some("http://abc.com")).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some("http://abc.com"));
    }

    #[tokio::test]
    async fn unlisted_origin_gets_empty_header() {
        let req = run(&["http://abc.com"], Some("http://def.com")).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));

        let req = run(&["http://abc.com"], None).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));
    }

    #[tokio::test]
    async fn wildcard_echoes_any_origin() {
        let req = run(&["*"], Some("http://def.com")).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some("http://def.com"));

        let req = run(&["http://abc.com", "*"], Some("http://xyz.org")).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some("http://xyz.org"));
    }

    #[tokio::test]
    async fn empty_list_allows_nothing() {
        let req = run(&[], Some("http://abc.com")).await;
        assert_eq!(req.response_header(ACCESS_CONTROL_ALLOW_ORIGIN), Some(""));
    }
}
