//! Best-effort metric records
//!
//! Each download/upload call may append one record to a SQLite store. The
//! store lives on its own writer thread fed by a channel, so a slow or
//! failing write can never delay or fail a measurement response. Records
//! expire after 24 hours and are purged periodically.

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{HeaderMap, header};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use speedmark_common::{METRIC_TTL_SECS, SpeedmarkError};

#[derive(Debug, Clone, Copy)]
pub enum MetricKind {
    Download,
    Upload,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Download => "download",
            MetricKind::Upload => "upload",
        }
    }
}

#[derive(Debug)]
pub struct MetricRecord {
    pub timestamp_ms: i64,
    pub kind: MetricKind,
    pub bytes: u64,
    pub server_time_ms: u64,
    pub country: String,
    pub colo: String,
    pub user_agent: String,
}

/// Cloneable handle the request handlers use to submit records.
#[derive(Clone)]
pub struct MetricsHandle {
    tx: mpsc::Sender<MetricRecord>,
}

impl MetricsHandle {
    /// Submit one record. Failures are swallowed: metrics must never
    /// surface into the measurement response.
    pub fn record(
        &self,
        kind: MetricKind,
        bytes: u64,
        server_time_ms: u64,
        headers: &HeaderMap,
    ) {
        let record = MetricRecord {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            kind,
            bytes,
            server_time_ms,
            country: header_or_unknown(headers, "cf-ipcountry"),
            colo: colo_from_headers(headers),
            user_agent: header_or_unknown(headers, header::USER_AGENT.as_str()),
        };
        if let Err(e) = self.tx.send(record) {
            debug!("metrics channel closed, dropping record: {}", e);
        }
    }
}

fn header_or_unknown(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The edge request id carries the serving colo as its suffix.
fn colo_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("cf-ray")
        .and_then(|v| v.to_str().ok())
        .and_then(|ray| ray.rsplit_once('-').map(|(_, colo)| colo.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Open the store and spawn its writer thread. The thread drains the
/// channel and purges expired rows about once a minute.
pub fn spawn_store<P: AsRef<Path>>(path: P) -> Result<MetricsHandle> {
    let store = MetricsStore::open(path)?;
    let (tx, rx) = mpsc::channel::<MetricRecord>();

    std::thread::Builder::new()
        .name("metrics-writer".to_string())
        .spawn(move || writer_loop(store, rx))
        .context("Failed to spawn metrics writer thread")?;

    Ok(MetricsHandle { tx })
}

fn writer_loop(store: MetricsStore, rx: mpsc::Receiver<MetricRecord>) {
    loop {
        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(record) => {
                if let Err(e) = store.append(&record) {
                    debug!("{}", SpeedmarkError::Storage(e.to_string()));
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => match store.purge_expired() {
                Ok(purged) if purged > 0 => debug!("purged {} expired metric rows", purged),
                Ok(_) => {}
                Err(e) => debug!("metric purge failed: {}", e),
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open metrics database")?;

        // WAL mode for concurrent reads while the writer thread appends
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;
        conn.pragma_update(None, "busy_timeout", "5000")
            .context("Failed to set busy timeout")?;

        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        info!("Initializing metrics schema");

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS metrics (
                key TEXT PRIMARY KEY,
                timestamp_ms INTEGER NOT NULL,
                kind TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                server_time_ms INTEGER NOT NULL,
                country TEXT NOT NULL,
                colo TEXT NOT NULL,
                user_agent TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp_ms)",
            [],
        )?;

        Ok(())
    }

    pub fn append(&self, record: &MetricRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metrics
                (key, timestamp_ms, kind, bytes, server_time_ms, country, colo, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record_key(record.timestamp_ms),
                record.timestamp_ms,
                record.kind.as_str(),
                record.bytes,
                record.server_time_ms,
                record.country,
                record.colo,
                record.user_agent,
            ],
        )?;
        Ok(())
    }

    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp_millis() - METRIC_TTL_SECS * 1000;
        let purged = self
            .conn
            .execute("DELETE FROM metrics WHERE timestamp_ms < ?1", params![cutoff])?;
        Ok(purged)
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Key embeds a random suffix so concurrent appends in the same
/// millisecond never collide.
fn record_key(timestamp_ms: i64) -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("metric:{}:{}", timestamp_ms, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: MetricKind) -> MetricRecord {
        MetricRecord {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            kind,
            bytes: 1000,
            server_time_ms: 2,
            country: "ZA".to_string(),
            colo: "CPT".to_string(),
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn append_and_purge() {
        let store = MetricsStore::open(":memory:").unwrap();
        store.append(&record(MetricKind::Download)).unwrap();
        store.append(&record(MetricKind::Upload)).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        // Nothing is older than the retention window yet
        assert_eq!(store.purge_expired().unwrap(), 0);

        let stale = MetricRecord {
            timestamp_ms: chrono::Utc::now().timestamp_millis() - METRIC_TTL_SECS * 1000 - 1,
            ..record(MetricKind::Download)
        };
        store.append(&stale).unwrap();
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn keys_embed_a_random_suffix() {
        let a = record_key(1000);
        let b = record_key(1000);
        assert_ne!(a, b);
        assert!(a.starts_with("metric:1000:"));
    }
}
