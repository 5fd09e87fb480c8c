use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::{Handler, Middleware};

/// Context key holding the id of the current request
pub const REQUEST_ID_KEY: &str = "request_id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag each request with a fresh id and log it once the handler returns
pub fn request_logger() -> Middleware {
    Middleware::new(|next| {
        Handler::new(move |req| {
            let next = next.clone();
            Box::pin(async move {
                let started = Instant::now();
                let request_id = Uuid::new_v4().to_string();
                req.set_context_data(REQUEST_ID_KEY, Value::String(request_id.clone()));
                req.set_header(REQUEST_ID_HEADER, &request_id);

                next.call(req).await;

                let status = req.status().map(|s| s.as_u16()).unwrap_or(200);
                tracing::info!(
                    request_id = %request_id,
                    method = %req.method(),
                    path = %req.path(),
                    client_ip = %req.client_ip(),
                    status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::chain;
    use crate::request::RequestExt;
    use crate::testing::MockRequest;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn request_id_is_exposed_to_handler_and_client() {
        let handler = chain(
            Handler::from_sync(|req| {
                let id: Option<String> = req.context(REQUEST_ID_KEY);
                req.send_json(&serde_json::json!({ "request_id": id }), StatusCode::OK);
            }),
            &[request_logger()],
        );

        let mut req = MockRequest::new();
        handler.call(&mut req).await;

        let header = req.response_header(REQUEST_ID_HEADER).unwrap().to_string();
        assert!(Uuid::parse_str(&header).is_ok());
        let body: Value = req.response_json().unwrap();
        assert_eq!(body["request_id"], header.as_str());
    }

    #[tokio::test]
    async fn each_request_gets_its_own_id() {
        let handler = chain(Handler::from_sync(|_req| {}), &[request_logger()]);

        let mut first = MockRequest::new();
        let mut second = MockRequest::new();
        handler.call(&mut first).await;
        handler.call(&mut second).await;

        assert_ne!(
            first.response_header(REQUEST_ID_HEADER),
            second.response_header(REQUEST_ID_HEADER)
        );
    }
}
