#![allow(dead_code)]

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::task::JoinHandle;

use helios::{Helios, HeliosConfig};

/// Router served on an ephemeral local port for the lifetime of the value
pub struct TestServer {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(router: Router) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr().context("listener has no local address")?;

        let handle = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                eprintln!("test server stopped: {}", e);
            }
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn test_app() -> Result<Helios> {
    Helios::new(HeliosConfig::for_tests()).context("failed to build test app")
}

pub fn test_app_with(configure: impl FnOnce(&mut HeliosConfig)) -> Result<Helios> {
    let mut config = HeliosConfig::for_tests();
    configure(&mut config);
    Helios::new(config).context("failed to build test app")
}

/// `name=value` part of a `Set-Cookie` header
pub fn cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}
