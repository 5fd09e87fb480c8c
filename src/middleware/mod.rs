//! Handler composition.
//!
//! A [`Middleware`] takes the next [`Handler`] and returns a new one that
//! runs code around it. [`chain`] folds a list of middleware over a terminal
//! handler once, at registration time, so `m1` in `[m1, m2, m3]` runs first.

pub mod cors;
pub mod logging;

pub use cors::cors;
pub use logging::{request_logger, REQUEST_ID_HEADER, REQUEST_ID_KEY};

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;

use crate::request::{HttpRequest, Request};
use crate::session::SessionStore;

type HandlerFn = dyn for<'a> Fn(&'a mut dyn Request) -> BoxFuture<'a, ()> + Send + Sync;

/// Request-processing function that writes its result through the request
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap an async handler: `Handler::new(|req| Box::pin(async move { ... }))`
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut dyn Request) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a handler that never awaits
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Request) + Send + Sync + 'static,
    {
        Self::new(move |req| {
            f(req);
            Box::pin(std::future::ready(()))
        })
    }

    pub fn call<'a>(&self, req: &'a mut dyn Request) -> BoxFuture<'a, ()> {
        (self.0)(req)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// Decorator that wraps a handler with cross-cutting behavior
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Handler) -> Handler + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn wrap(&self, next: Handler) -> Handler {
        (self.0)(next)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Compose `middlewares` around `handler`, first entry outermost
pub fn chain(handler: Handler, middlewares: &[Middleware]) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware.wrap(next))
}

/// Tower service that runs a composed handler for each transport request
///
/// Mount it with `axum::routing::get_service(endpoint)` and friends.
#[derive(Clone, Debug)]
pub struct Endpoint {
    handler: Handler,
    sessions: Arc<SessionStore>,
    body_limit: usize,
}

impl Endpoint {
    pub fn new(handler: Handler, sessions: Arc<SessionStore>, body_limit: usize) -> Self {
        Self {
            handler,
            sessions,
            body_limit,
        }
    }
}

impl tower::Service<axum::extract::Request> for Endpoint {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: axum::extract::Request) -> Self::Future {
        let handler = self.handler.clone();
        let sessions = self.sessions.clone();
        let body_limit = self.body_limit;

        Box::pin(async move {
            let mut req = match HttpRequest::from_transport(request, sessions, body_limit).await {
                Ok(req) => req,
                Err(err) => return Ok(err.into_response()),
            };
            handler.call(&mut req).await;
            Ok(req.into_response())
        })
    }
}
