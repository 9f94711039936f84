use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body;
use tracing::{debug, error, info, warn};
use tsproxy_cache::{CacheKey, CachePolicy, CacheStore, Cacheability};
use tsproxy_upstream::Forward;

use crate::responses::{ProxyBody, envelope, relay};

/// Handles `POST /dataapi`.
///
/// Flow: method check → read body → fingerprint → cache lookup →
/// forward on miss → store if upstream signalled success → relay.
/// The cache is optional; with `None` no store call is ever made.
pub struct DataApiHandler {
    cache: Option<Arc<CacheStore>>,
    upstream: Arc<dyn Forward>,
    read_timeout: Duration,
}

impl DataApiHandler {
    pub fn new(
        cache: Option<Arc<CacheStore>>,
        upstream: Arc<dyn Forward>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            upstream,
            read_timeout,
        }
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();

        // 1) POST only
        if req.method() != Method::POST {
            warn!(target: "tsproxy::handler", method = %req.method(), "Unsupported HTTP method");
            return envelope(StatusCode::METHOD_NOT_ALLOWED, "only POST is supported");
        }

        // 2) read the whole body
        let payload = match tokio::time::timeout(self.read_timeout, req.into_body().collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                error!(target: "tsproxy::handler", error = %e, "Failed to read request body");
                return envelope(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                error!(
                    target: "tsproxy::handler",
                    timeout_secs = self.read_timeout.as_secs(),
                    "Timed out reading request body"
                );
                return envelope(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        // 3) + 4) fingerprint and lookup
        let cache = self.cache.as_deref();
        let key = cache.map(|_| CacheKey::from_payload(&payload));

        if let (Some(cache), Some(key)) = (cache, key.as_ref())
            && let Some(entry) = cache.get(key).await
        {
            let status =
                StatusCode::from_u16(entry.status_code).unwrap_or(StatusCode::OK);
            info!(
                target: "tsproxy::handler",
                cache_key = %key,
                status_code = status.as_u16(),
                "Serving cached response"
            );
            let resp = relay(status, Bytes::from(entry.response_body));
            log_completion(started, true, Some(key));
            return resp;
        }

        // 5) forward
        debug!(
            target: "tsproxy::handler",
            body = %String::from_utf8_lossy(&payload),
            "Forwarding request upstream"
        );
        let upstream = match self.upstream.forward(payload.clone()).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(target: "tsproxy::handler", error = %e, "Upstream request failed");
                return envelope(StatusCode::INTERNAL_SERVER_ERROR, "upstream request failed");
            }
        };

        // 6) cache semantic success only
        let verdict = CachePolicy::evaluate(upstream.status, &upstream.body);
        match &verdict {
            Cacheability::Cacheable => {
                debug!(target: "tsproxy::handler", "Upstream succeeded, response is cacheable");
            }
            Cacheability::Rejected { code, msg } => {
                warn!(
                    target: "tsproxy::handler",
                    code,
                    msg = %msg,
                    "Upstream returned a business error, not caching"
                );
            }
            Cacheability::Unparseable(reason) => {
                error!(
                    target: "tsproxy::handler",
                    error = %reason,
                    "Failed to parse upstream response, not caching"
                );
            }
            Cacheability::Status(_) | Cacheability::EmptyBody => {}
        }

        if verdict.is_cacheable()
            && let (Some(cache), Some(key)) = (cache, key.as_ref())
        {
            match cache
                .set(key, &payload, &upstream.body, upstream.status.as_u16())
                .await
            {
                Ok(()) => debug!(target: "tsproxy::handler", cache_key = %key, "Response cached"),
                // the client still gets its answer
                Err(e) => error!(
                    target: "tsproxy::handler",
                    cache_key = %key,
                    error = %e,
                    "Failed to cache response"
                ),
            }
        }

        // 7) relay
        let resp = relay(upstream.status, upstream.body);
        log_completion(started, false, key.as_ref());
        resp
    }
}

fn log_completion(started: Instant, from_cache: bool, key: Option<&CacheKey>) {
    info!(
        target: "tsproxy::handler",
        duration_ms = started.elapsed().as_millis() as u64,
        from_cache,
        cache_key = key.map(CacheKey::as_str).unwrap_or(""),
        "Request completed"
    );
}

#[cfg(test)]
mod tests {
    use super::DataApiHandler;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Method, Request, StatusCode};
    use http_body_util::{BodyExt, Full};
    use hyper::body::{Body, Frame};
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tsproxy_cache::{CacheKey, CacheStore};
    use tsproxy_upstream::{Forward, UpstreamError, UpstreamResponse};

    /// Canned upstream that counts calls.
    struct FakeUpstream {
        status: StatusCode,
        body: &'static [u8],
        reachable: bool,
        calls: AtomicUsize,
    }

    impl FakeUpstream {
        fn answering(status: StatusCode, body: &'static [u8]) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                reachable: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                status: StatusCode::OK,
                body: b"",
                reachable: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Forward for FakeUpstream {
        async fn forward(&self, _body: Bytes) -> Result<UpstreamResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.reachable {
                return Err(UpstreamError::Timeout(Duration::from_secs(30)));
            }
            Ok(UpstreamResponse {
                status: self.status,
                body: Bytes::from_static(self.body),
            })
        }
    }

    fn store(dir: &tempfile::TempDir) -> Arc<CacheStore> {
        Arc::new(
            CacheStore::open(dir.path().join("db"), Duration::from_secs(86_400))
                .expect("open store"),
        )
    }

    fn post(body: &'static [u8]) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/dataapi")
            .body(Full::new(Bytes::from_static(body)))
            .expect("request")
    }

    /// Body whose first read fails, like a client resetting mid-upload.
    struct BrokenBody;

    impl Body for BrokenBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))))
        }
    }

    /// Body that never yields a frame.
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Pending
        }
    }

    fn post_with<B>(body: B) -> Request<B> {
        Request::builder()
            .method(Method::POST)
            .uri("/dataapi")
            .body(body)
            .expect("request")
    }

    async fn send<B>(handler: &DataApiHandler, req: Request<B>) -> (StatusCode, Bytes)
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let resp = handler.handle(req).await;
        let status = resp.status();
        let body = resp.into_body().collect().await.expect("body").to_bytes();
        (status, body)
    }

    const PAYLOAD: &[u8] = br#"{"api_name":"x"}"#;

    #[tokio::test]
    async fn success_is_cached_and_replayed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0,"data":{}}"#);
        let handler = DataApiHandler::new(Some(cache.clone()), upstream.clone(), Duration::from_secs(5));

        let (status, body) = send(&handler, post(PAYLOAD)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#"{"code":0,"data":{}}"#);
        assert_eq!(upstream.calls(), 1);

        let (status, body) = send(&handler, post(PAYLOAD)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#"{"code":0,"data":{}}"#);
        assert_eq!(upstream.calls(), 1, "second request must be served from cache");

        let entry = cache
            .get(&CacheKey::from_payload(PAYLOAD))
            .await
            .expect("entry stored");
        assert_eq!(entry.request_body, PAYLOAD);
    }

    #[tokio::test]
    async fn business_error_is_relayed_but_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream =
            FakeUpstream::answering(StatusCode::OK, br#"{"code":40001,"msg":"token invalid"}"#);
        let handler = DataApiHandler::new(Some(cache.clone()), upstream.clone(), Duration::from_secs(5));

        for expected_calls in 1..=2 {
            let (status, body) = send(&handler, post(PAYLOAD)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(&body[..], br#"{"code":40001,"msg":"token invalid"}"#);
            assert_eq!(upstream.calls(), expected_calls);
        }
        assert!(cache.get(&CacheKey::from_payload(PAYLOAD)).await.is_none());
    }

    #[tokio::test]
    async fn upstream_status_is_preserved_and_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream = FakeUpstream::answering(StatusCode::SERVICE_UNAVAILABLE, br#"{"code":0}"#);
        let handler = DataApiHandler::new(Some(cache.clone()), upstream.clone(), Duration::from_secs(5));

        let (status, body) = send(&handler, post(PAYLOAD)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&body[..], br#"{"code":0}"#);
        assert!(cache.get(&CacheKey::from_payload(PAYLOAD)).await.is_none());
    }

    #[tokio::test]
    async fn wrong_method_gets_405_envelope() {
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0}"#);
        let handler = DataApiHandler::new(None, upstream.clone(), Duration::from_secs(5));

        let req = Request::builder()
            .method(Method::GET)
            .uri("/dataapi")
            .body(Full::new(Bytes::new()))
            .expect("request");
        let (status, body) = send(&handler, req).await;

        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["code"], 405);
        assert!(value["msg"].is_string());
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn failed_body_read_gets_400_envelope() {
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0}"#);
        let handler = DataApiHandler::new(None, upstream.clone(), Duration::from_secs(5));

        let (status, body) = send(&handler, post_with(BrokenBody)).await;

        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["code"], 400);
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn stalled_body_times_out_with_400_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0}"#);
        let handler =
            DataApiHandler::new(Some(cache.clone()), upstream.clone(), Duration::from_millis(50));

        let (status, body) = tokio::time::timeout(
            Duration::from_secs(2),
            send(&handler, post_with(StalledBody)),
        )
        .await
        .expect("handler ignored its read timeout");

        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["code"], 400);
        assert_eq!(upstream.calls(), 0);
        assert_eq!(cache.stats().await.expect("stats").entries, 0);
    }

    #[tokio::test]
    async fn unreachable_upstream_gets_500_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream = FakeUpstream::unreachable();
        let handler = DataApiHandler::new(Some(cache.clone()), upstream.clone(), Duration::from_secs(5));

        let (status, body) = send(&handler, post(PAYLOAD)).await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["code"], 500);
        assert_eq!(cache.stats().await.expect("stats").entries, 0);
    }

    #[tokio::test]
    async fn disabled_cache_always_forwards() {
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0,"data":{}}"#);
        let handler = DataApiHandler::new(None, upstream.clone(), Duration::from_secs(5));
        assert!(!handler.caching_enabled());

        for expected_calls in 1..=3 {
            let (status, _) = send(&handler, post(PAYLOAD)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(upstream.calls(), expected_calls);
        }
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_fail_the_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        cache.close().await.expect("close");
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0,"data":{}}"#);
        let handler = DataApiHandler::new(Some(cache), upstream.clone(), Duration::from_secs(5));

        for expected_calls in 1..=2 {
            let (status, body) = send(&handler, post(PAYLOAD)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(&body[..], br#"{"code":0,"data":{}}"#);
            assert_eq!(upstream.calls(), expected_calls);
        }
    }

    #[tokio::test]
    async fn different_bytes_are_different_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = store(&dir);
        let upstream = FakeUpstream::answering(StatusCode::OK, br#"{"code":0}"#);
        let handler = DataApiHandler::new(Some(cache), upstream.clone(), Duration::from_secs(5));

        send(&handler, post(br#"{"a":1,"b":2}"#)).await;
        send(&handler, post(br#"{"b":2,"a":1}"#)).await;
        assert_eq!(upstream.calls(), 2);
    }
}
