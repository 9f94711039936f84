use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Width of the big-endian deadline prefix on every stored record.
const DEADLINE_PREFIX_LEN: usize = 8;

/// One cached upstream exchange. Always replaced as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub request_body: Vec<u8>,
    pub response_body: Vec<u8>,
    pub status_code: u16,
    /// Seconds since the unix epoch at write time.
    pub timestamp: u64,
}

impl CacheEntry {
    /// An entry is stale once `ttl` has fully elapsed since it was written.
    pub fn is_expired_at(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.timestamp) >= ttl.as_secs()
    }

    /// Record layout: `[deadline: u64 BE][bincode(entry)]`.
    ///
    /// The prefix lets the reclamation pass find dead records without
    /// decoding response bodies.
    pub(crate) fn encode_record(&self, deadline: u64) -> Result<Vec<u8>, CacheError> {
        let body = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(DEADLINE_PREFIX_LEN + body.len());
        out.extend_from_slice(&deadline.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub(crate) fn decode_record(record: &[u8]) -> Result<Self, CacheError> {
        if record.len() < DEADLINE_PREFIX_LEN {
            return Err(CacheError::Corrupt("record shorter than deadline prefix"));
        }
        Ok(bincode::deserialize(&record[DEADLINE_PREFIX_LEN..])?)
    }
}

/// Engine-level deadline stored in front of a record.
pub(crate) fn record_deadline(record: &[u8]) -> Option<u64> {
    let prefix: [u8; DEADLINE_PREFIX_LEN] = record.get(..DEADLINE_PREFIX_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(prefix))
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
