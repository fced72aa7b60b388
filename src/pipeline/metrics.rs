//! Transfer and timing metrics for one job.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for a splitting run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Bytes of source audio downloaded
    pub bytes_downloaded: AtomicU64,

    /// Bytes of stems uploaded
    pub bytes_uploaded: AtomicU64,

    /// Stems moved into the workspace
    pub stems_collected: AtomicU64,

    /// Stems uploaded to durable storage
    pub stems_uploaded: AtomicU64,

    /// Failed moves and uploads
    pub transfer_failures: AtomicU64,

    start_time: Option<Instant>,

    // Per-stage timing (in microseconds for precision)
    /// Time spent fetching the source
    pub fetch_us: AtomicU64,

    /// Time spent in the separation tool
    pub separate_us: AtomicU64,

    /// Time spent collecting stems
    pub collect_us: AtomicU64,

    /// Time spent uploading stems
    pub upload_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    pub fn add_bytes_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_uploaded(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_stem_collected(&self) {
        self.stems_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stem_uploaded(&self) {
        self.stems_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_transfer_failure(&self) {
        self.transfer_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent in a stage.
    pub fn add_stage_time(&self, stage: Stage, elapsed: Duration) {
        let counter = match stage {
            Stage::Fetch => &self.fetch_us,
            Stage::Separate => &self.separate_us,
            Stage::Collect => &self.collect_us,
            Stage::Upload => &self.upload_us,
        };
        counter.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            elapsed: self.elapsed(),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            stems_collected: self.stems_collected.load(Ordering::Relaxed),
            stems_uploaded: self.stems_uploaded.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            fetch_ms: self.fetch_us.load(Ordering::Relaxed) as f64 / 1000.0,
            separate_ms: self.separate_us.load(Ordering::Relaxed) as f64 / 1000.0,
            collect_ms: self.collect_us.load(Ordering::Relaxed) as f64 / 1000.0,
            upload_ms: self.upload_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Timed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Separate,
    Collect,
    Upload,
}

/// Point-in-time snapshot of metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    pub stems_collected: u64,
    pub stems_uploaded: u64,
    pub transfer_failures: u64,
    pub fetch_ms: f64,
    pub separate_ms: f64,
    pub collect_ms: f64,
    pub upload_ms: f64,
}

impl MetricsSnapshot {
    /// Log a one-line summary.
    pub fn log_summary(&self) {
        tracing::info!(
            "Downloaded {:.2} MB, uploaded {} stems ({:.2} MB), {} transfer failures in {:.1}s \
             [fetch {:.0} ms, separate {:.0} ms, collect {:.0} ms, upload {:.0} ms]",
            self.bytes_downloaded as f64 / (1024.0 * 1024.0),
            self.stems_uploaded,
            self.bytes_uploaded as f64 / (1024.0 * 1024.0),
            self.transfer_failures,
            self.elapsed.as_secs_f64(),
            self.fetch_ms,
            self.separate_ms,
            self.collect_ms,
            self.upload_ms,
        );
    }

    /// Save metrics snapshot to a JSON file.
    pub fn save_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metrics_counters() {
        let metrics = Metrics::new();
        metrics.add_bytes_downloaded(1024);
        metrics.add_bytes_uploaded(2048);
        metrics.add_stem_collected();
        metrics.add_stem_collected();
        metrics.add_stem_uploaded();
        metrics.add_transfer_failure();
        metrics.add_stage_time(Stage::Separate, Duration::from_millis(1500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bytes_downloaded, 1024);
        assert_eq!(snapshot.bytes_uploaded, 2048);
        assert_eq!(snapshot.stems_collected, 2);
        assert_eq!(snapshot.stems_uploaded, 1);
        assert_eq!(snapshot.transfer_failures, 1);
        assert_eq!(snapshot.separate_ms, 1500.0);
        assert_eq!(snapshot.fetch_ms, 0.0);
    }

    #[test]
    fn test_default_metrics_have_zero_elapsed() {
        let metrics = Metrics::default();
        assert_eq!(metrics.elapsed(), Duration::ZERO);
        assert_eq!(metrics.snapshot().stems_uploaded, 0);
    }

    #[test]
    fn test_snapshot_save_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metrics.json");

        let metrics = Metrics::new();
        metrics.add_stem_uploaded();
        metrics.snapshot().save_to_file(path.to_str().unwrap()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["stems_uploaded"], 1);
        assert!(json["elapsed_secs"].is_f64());
    }
}
