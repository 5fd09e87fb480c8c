use axum::http::StatusCode;
use serde_json::json;
use sqlx::SqlitePool;

use helios::database::DatabaseManager;
use helios::{Handler, RequestExt};

/// GET /health - 200 when the database answers, 503 otherwise
pub fn check(pool: SqlitePool) -> Handler {
    Handler::new(move |req| {
        let pool = pool.clone();
        Box::pin(async move {
            let now = chrono::Utc::now();

            match DatabaseManager::health_check(&pool).await {
                Ok(()) => req.send_json(
                    &json!({
                        "status": "ok",
                        "timestamp": now,
                        "database": "ok"
                    }),
                    StatusCode::OK,
                ),
                Err(e) => {
                    tracing::warn!("Health check failed: {}", e);
                    req.send_json(
                        &json!({
                            "status": "degraded",
                            "timestamp": now,
                            "database": "unavailable"
                        }),
                        StatusCode::SERVICE_UNAVAILABLE,
                    )
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios::testing::MockRequest;
    use serde_json::Value;

    #[tokio::test]
    async fn reports_ok_while_pool_is_open() {
        let pool = DatabaseManager::open_in_memory().await.unwrap();
        let mut req = MockRequest::new();
        check(pool.clone()).call(&mut req).await;

        assert_eq!(req.status_code(), Some(StatusCode::OK));
        let body: Value = req.response_json().unwrap();
        assert_eq!(body["status"], "ok");
        pool.close().await;
    }

    #[tokio::test]
    async fn reports_degraded_after_close() {
        let pool = DatabaseManager::open_in_memory().await.unwrap();
        pool.close().await;

        let mut req = MockRequest::new();
        check(pool).call(&mut req).await;
        assert_eq!(req.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
