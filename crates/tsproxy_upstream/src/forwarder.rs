use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, instrument, warn};
use tsproxy_config::UpstreamConfig;

use crate::UpstreamError;

/// Raw upstream answer, relayed to the client untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Seam between the request handler and the upstream API.
#[async_trait]
pub trait Forward: Send + Sync {
    /// Sends `body` upstream. `Err` only for transport-level failures;
    /// any HTTP status from upstream is an `Ok`.
    async fn forward(&self, body: Bytes) -> Result<UpstreamResponse, UpstreamError>;
}

/// Plain-HTTP forwarder with a pooled hyper client.
pub struct HttpForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    url: Uri,
    timeout: Duration,
    user_agent: HeaderValue,
}

impl HttpForwarder {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Self::with_settings(
            cfg.url(),
            Duration::from_secs(cfg.timeout_secs()),
            cfg.user_agent(),
        )
    }

    pub fn with_settings(
        url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, UpstreamError> {
        let invalid = |reason: String| UpstreamError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// upstreams are supported".into()));
        }
        if uri.host().is_none() {
            return Err(invalid("missing host".into()));
        }
        let user_agent =
            HeaderValue::from_str(user_agent).map_err(|e| invalid(format!("user agent: {e}")))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            url: uri,
            timeout,
            user_agent,
        })
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    #[instrument(skip(self, body), fields(upstream = %self.url, request_size = body.len()))]
    async fn forward(&self, body: Bytes) -> Result<UpstreamResponse, UpstreamError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.user_agent.clone())
            .body(Full::new(body))?;

        // The deadline covers connect, send and reading the whole body.
        let exchange = async {
            let resp = self.client.request(req).await?;
            let status = resp.status();
            let body = resp.into_body().collect().await?.to_bytes();
            Ok::<_, UpstreamError>(UpstreamResponse { status, body })
        };

        let resp = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(res) => res?,
            Err(_) => return Err(UpstreamError::Timeout(self.timeout)),
        };

        if resp.status != StatusCode::OK {
            warn!(
                target: "tsproxy::upstream",
                status_code = resp.status.as_u16(),
                response = %String::from_utf8_lossy(&resp.body),
                "Upstream returned non-200 status"
            );
        } else {
            debug!(
                target: "tsproxy::upstream",
                response_size = resp.body.len(),
                "Upstream responded"
            );
        }

        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::{Forward, HttpForwarder};
    use crate::UpstreamError;
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Echo server: replies with the request body, 400 when the request
    /// does not look like a forwarded data API call.
    async fn spawn_echo(delay: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| async move {
                        tokio::time::sleep(delay).await;
                        let well_formed = req.method() == http::Method::POST
                            && req.headers().get("content-type").map(|v| v.as_bytes())
                                == Some(b"application/json".as_slice())
                            && req.headers().get("user-agent").map(|v| v.as_bytes())
                                == Some(b"tsproxy-test".as_slice());
                        let body = req.into_body().collect().await.expect("body").to_bytes();
                        let status = if well_formed {
                            StatusCode::OK
                        } else {
                            StatusCode::BAD_REQUEST
                        };
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(body))
                                .expect("response"),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    fn forwarder(addr: SocketAddr, timeout: Duration) -> HttpForwarder {
        HttpForwarder::with_settings(&format!("http://{addr}/dataapi"), timeout, "tsproxy-test")
            .expect("forwarder")
    }

    #[tokio::test]
    async fn relays_body_and_status() {
        let addr = spawn_echo(Duration::ZERO).await;
        let fwd = forwarder(addr, Duration::from_secs(5));

        let payload = Bytes::from_static(br#"{"api_name":"daily","token":"t"}"#);
        let resp = fwd.forward(payload.clone()).await.expect("forward");
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, payload);
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let addr = spawn_echo(Duration::from_millis(500)).await;
        let fwd = forwarder(addr, Duration::from_millis(50));

        let err = fwd.forward(Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let fwd = forwarder(addr, Duration::from_secs(5));
        let err = fwd.forward(Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Send(_)));
    }

    #[test]
    fn rejects_non_http_urls() {
        for url in ["https://api.example.com/dataapi", "api.example.com", "not a url"] {
            assert!(
                HttpForwarder::with_settings(url, Duration::from_secs(1), "ua").is_err(),
                "{url} should be rejected"
            );
        }
    }
}
