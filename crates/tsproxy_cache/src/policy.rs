use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};

/// The `{code, msg}` shape shared by upstream business responses and
/// proxy-generated errors. Missing or `null` fields read as `0` / `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApiEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ApiEnvelope {
    pub fn new(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

/// Outcome of inspecting an upstream response for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cacheability {
    Cacheable,
    /// Upstream transport status was not 200.
    Status(StatusCode),
    EmptyBody,
    /// Body is not a `{code, msg}` envelope.
    Unparseable(String),
    /// Envelope parsed but carries a business error.
    Rejected { code: i64, msg: String },
}

impl Cacheability {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Cacheability::Cacheable)
    }
}

pub struct CachePolicy;

impl CachePolicy {
    /// Only semantic success is stored: HTTP 200 and an envelope with
    /// `code == 0`. A 200 carrying an application error must never reach
    /// the cache.
    pub fn evaluate(status: StatusCode, body: &[u8]) -> Cacheability {
        if status != StatusCode::OK {
            return Cacheability::Status(status);
        }
        if body.is_empty() {
            return Cacheability::EmptyBody;
        }

        match serde_json::from_slice::<ApiEnvelope>(body) {
            Ok(envelope) if envelope.code == 0 => Cacheability::Cacheable,
            Ok(envelope) => Cacheability::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            },
            Err(e) => Cacheability::Unparseable(e.to_string()),
        }
    }
}
