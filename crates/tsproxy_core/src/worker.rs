use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{Instrument, debug, warn};

use crate::DATA_API_PATH;
use crate::handler::DataApiHandler;
use crate::responses::{ProxyBody, not_found};

/// Per-connection settings shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct ConnLimits {
    /// Header read deadline, also applied to the request body.
    pub read_timeout: Duration,
    /// Upper bound for producing one response.
    pub write_timeout: Duration,
}

/// Dispatches by path. Only `/dataapi` exists.
pub async fn route<B>(handler: &DataApiHandler, req: Request<B>) -> Response<ProxyBody>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    if req.uri().path() == DATA_API_PATH {
        return handler.handle(req).await;
    }

    debug!(
        target: "tsproxy::worker",
        method = %req.method(),
        path = %req.uri().path(),
        "No route for path"
    );
    not_found()
}

/// Serves one accepted connection until the client goes away, the
/// connection errors out, or a graceful shutdown drains it.
///
/// The permit is held for the lifetime of the connection.
pub(crate) fn spawn_connection(
    stream: TcpStream,
    addr: SocketAddr,
    permit: OwnedSemaphorePermit,
    handler: Arc<DataApiHandler>,
    limits: ConnLimits,
    graceful: &GracefulShutdown,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move {
            match tokio::time::timeout(limits.write_timeout, route(&handler, req)).await {
                Ok(resp) => Ok(resp),
                Err(elapsed) => {
                    warn!(
                        target: "tsproxy::worker",
                        client_addr = %addr,
                        timeout_secs = limits.write_timeout.as_secs(),
                        "Request exceeded write timeout, closing connection"
                    );
                    Err(elapsed)
                }
            }
        }
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(limits.read_timeout);

    let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), service));

    let span = tracing::info_span!("worker_connection", client_addr = %addr);
    tokio::spawn(
        async move {
            let _permit = permit;
            debug!(target: "tsproxy::worker", "Worker spawned for incoming connection");

            match conn.await {
                Ok(()) => debug!(target: "tsproxy::worker", "Connection closed"),
                Err(e) => debug!(
                    target: "tsproxy::worker",
                    error = %e,
                    "Connection ended with an error"
                ),
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use super::route;
    use crate::handler::DataApiHandler;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Method, Request, StatusCode};
    use http_body_util::Full;
    use std::sync::Arc;
    use std::time::Duration;
    use tsproxy_upstream::{Forward, UpstreamError, UpstreamResponse};

    struct Never;

    #[async_trait]
    impl Forward for Never {
        async fn forward(&self, _body: Bytes) -> Result<UpstreamResponse, UpstreamError> {
            panic!("upstream must not be called");
        }
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let handler = DataApiHandler::new(None, Arc::new(Never), Duration::from_secs(1));
        for path in ["/", "/dataapi/", "/health", "/dataapix"] {
            let req = Request::builder()
                .method(Method::POST)
                .uri(path)
                .body(Full::new(Bytes::from_static(b"{}")))
                .expect("request");
            let resp = route(&handler, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        }
    }
}
