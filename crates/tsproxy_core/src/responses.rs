use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use tsproxy_cache::ApiEnvelope;

pub type ProxyBody = Full<Bytes>;

/// Relays an upstream (or cached) answer: status and body verbatim.
pub fn relay(status: StatusCode, body: Bytes) -> Response<ProxyBody> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Proxy-originated failure.
///
/// The transport status is always 200; the real status travels as the
/// envelope `code`. Existing clients inspect the envelope, not the status.
pub fn envelope(code: StatusCode, msg: &str) -> Response<ProxyBody> {
    let body = serde_json::to_vec(&ApiEnvelope::new(i64::from(code.as_u16()), msg))
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(br#"{"code":500,"msg":"internal error"}"#));
    relay(StatusCode::OK, body)
}

pub fn not_found() -> Response<ProxyBody> {
    let mut resp = Response::new(Full::new(Bytes::from_static(b"404 Not Found\n")));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
