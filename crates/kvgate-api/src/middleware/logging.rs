//! Request logging middleware.
//!
//! Every request runs inside an `http_request` span carrying the request ID,
//! method and path, so events emitted by handlers, the access layer and the
//! batch engine are correlated with the request that caused them.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument};

use super::request_id::RequestId;

/// Layer that logs HTTP requests and responses.
#[derive(Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Service that logs request/response details.
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();

        let span = info_span!(
            target: "kvgate::http",
            "http_request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                info!(target: "kvgate::http", "request started");

                let response = inner.call(request).await?;
                let duration_ms = start.elapsed().as_millis() as u64;
                let status = response.status();

                if status.is_server_error() {
                    warn!(
                        target: "kvgate::http",
                        status = status.as_u16(),
                        duration_ms,
                        "request failed"
                    );
                } else {
                    info!(
                        target: "kvgate::http",
                        status = status.as_u16(),
                        duration_ms,
                        "request completed"
                    );
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}
