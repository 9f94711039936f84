use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::entry::{CacheEntry, record_deadline, unix_now};
use crate::error::CacheError;
use crate::key::CacheKey;

/// Storage footprint as reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: u64,
    /// Bytes held by live keys and records.
    pub used_bytes: u64,
    /// On-disk bytes not accounted for by live records (logs, stale segments).
    pub overhead_bytes: u64,
    pub total_bytes: u64,
}

/// Result of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub scanned: u64,
    pub removed: u64,
    pub reclaimed_bytes: u64,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.removed == 0
    }
}

/// Durable response cache backed by sled.
///
/// sled handles its own concurrency; the store is shared behind an `Arc`
/// by every request task and the reclamation task without extra locking.
/// Blocking engine calls run on the blocking pool.
#[derive(Debug)]
pub struct CacheStore {
    db: sled::Db,
    ttl: Duration,
    closed: AtomicBool,
}

impl CacheStore {
    /// Opens (or creates) the store directory. Failure here is fatal for
    /// the caller: the proxy does not start without its declared cache.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|source| CacheError::Open {
            path: path.display().to_string(),
            source,
        })?;

        info!(
            target: "tsproxy::cache",
            db_path = %path.display(),
            ttl_secs = ttl.as_secs(),
            entries = db.len(),
            "Cache store opened"
        );

        Ok(Self {
            db,
            ttl,
            closed: AtomicBool::new(false),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    /// Looks up a fresh entry. Any fault is logged and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.lookup(key, unix_now()).await {
            Ok(found) => found,
            Err(e) => {
                error!(
                    target: "tsproxy::cache",
                    cache_key = %key,
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                None
            }
        }
    }

    pub(crate) async fn lookup(
        &self,
        key: &CacheKey,
        now: u64,
    ) -> Result<Option<CacheEntry>, CacheError> {
        self.ensure_open()?;

        let db = self.db.clone();
        let raw_key = key.as_bytes().to_vec();
        let Some(record) = tokio::task::spawn_blocking(move || db.get(raw_key)).await?? else {
            debug!(target: "tsproxy::cache", cache_key = %key, "Cache miss");
            return Ok(None);
        };

        let entry = CacheEntry::decode_record(&record)?;

        // The engine-level deadline may not have been enforced yet; the
        // entry's own timestamp decides.
        if entry.is_expired_at(now, self.ttl) {
            debug!(
                target: "tsproxy::cache",
                cache_key = %key,
                written_at = entry.timestamp,
                "Cache entry expired"
            );
            self.spawn_stale_delete(key, record);
            return Ok(None);
        }

        debug!(target: "tsproxy::cache", cache_key = %key, "Cache hit");
        Ok(Some(entry))
    }

    /// Removes `record` in the background, unless the key has been
    /// rewritten in the meantime.
    fn spawn_stale_delete(&self, key: &CacheKey, record: sled::IVec) {
        let db = self.db.clone();
        let key = key.clone();

        tokio::spawn(async move {
            let raw_key = key.as_bytes().to_vec();
            let res = tokio::task::spawn_blocking(move || {
                db.compare_and_swap(raw_key, Some(record), None::<&[u8]>)
            })
            .await;

            match res {
                Ok(Ok(Ok(()))) => {
                    debug!(target: "tsproxy::cache", cache_key = %key, "Expired entry removed");
                }
                Ok(Ok(Err(_))) => {
                    debug!(
                        target: "tsproxy::cache",
                        cache_key = %key,
                        "Expired entry replaced before removal"
                    );
                }
                Ok(Err(e)) => {
                    error!(target: "tsproxy::cache", cache_key = %key, error = %e, "Failed to remove expired entry");
                }
                Err(e) => {
                    error!(target: "tsproxy::cache", cache_key = %key, error = %e, "Expired entry removal task failed");
                }
            }
        });
    }

    /// Writes a fresh entry, replacing whatever lived under `key`.
    pub async fn set(
        &self,
        key: &CacheKey,
        request_body: &[u8],
        response_body: &[u8],
        status_code: u16,
    ) -> Result<(), CacheError> {
        self.ensure_open()?;

        let now = unix_now();
        let entry = CacheEntry {
            key: key.as_str().to_owned(),
            request_body: request_body.to_vec(),
            response_body: response_body.to_vec(),
            status_code,
            timestamp: now,
        };
        let record = entry.encode_record(now.saturating_add(self.ttl.as_secs()))?;

        let db = self.db.clone();
        let raw_key = key.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || db.insert(raw_key, record)).await??;

        debug!(
            target: "tsproxy::cache",
            cache_key = %key,
            status_code,
            response_size = response_body.len(),
            "Cache entry stored"
        );
        Ok(())
    }

    /// Removes `key`. An absent key is not an error.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.ensure_open()?;

        let db = self.db.clone();
        let raw_key = key.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || db.remove(raw_key)).await??;
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats, CacheError> {
        self.ensure_open()?;

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || collect_stats(&db)).await?
    }

    /// On-disk footprint only. Does not scan records, unlike [`Self::stats`].
    pub async fn disk_bytes(&self) -> Result<u64, CacheError> {
        self.ensure_open()?;

        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || db.size_on_disk()).await??)
    }

    /// Purges every record whose engine-level deadline has passed and
    /// flushes the removals. Finding nothing to purge is a normal outcome.
    pub async fn reclaim(&self) -> Result<ReclaimReport, CacheError> {
        self.ensure_open()?;

        let db = self.db.clone();
        let now = unix_now();
        tokio::task::spawn_blocking(move || purge_expired(&db, now)).await?
    }

    /// Flushes and marks the store closed. Later calls are no-ops.
    pub async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(target: "tsproxy::cache", "Closing cache store");
        self.db.flush_async().await?;
        Ok(())
    }
}

fn collect_stats(db: &sled::Db) -> Result<StoreStats, CacheError> {
    let mut stats = StoreStats::default();
    for item in db.iter() {
        let (key, value) = item?;
        stats.entries += 1;
        stats.used_bytes += (key.len() + value.len()) as u64;
    }
    stats.total_bytes = db.size_on_disk()?;
    stats.overhead_bytes = stats.total_bytes.saturating_sub(stats.used_bytes);
    Ok(stats)
}

fn purge_expired(db: &sled::Db, now: u64) -> Result<ReclaimReport, CacheError> {
    let mut report = ReclaimReport::default();

    for item in db.iter() {
        let (key, value) = item?;
        report.scanned += 1;

        let dead = match record_deadline(&value) {
            Some(deadline) => deadline <= now,
            None => {
                warn!(
                    target: "tsproxy::cache",
                    cache_key = %String::from_utf8_lossy(&key),
                    "Dropping unreadable cache record"
                );
                true
            }
        };
        if !dead {
            continue;
        }

        let size = (key.len() + value.len()) as u64;
        // A concurrent set may have refreshed the key since the scan read it.
        if db
            .compare_and_swap(&key, Some(&value), None::<&[u8]>)?
            .is_ok()
        {
            report.removed += 1;
            report.reclaimed_bytes += size;
        }
    }

    if !report.is_empty() {
        db.flush()?;
    }
    Ok(report)
}
