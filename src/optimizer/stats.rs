//! Network and resource counters for an optimized page.
//!
//! Counters are monotonic for the lifetime of the page and read-only from
//! the caller's perspective; [`ResourceStats::reset`] is the only reset.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Count and cumulative byte size observed for one resource type.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResourceTypeStats {
    pub count: u64,
    pub size: u64,
}

/// JS-heap snapshot from `performance.memory`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemorySnapshot {
    pub js_heap_used_mb: f64,
    pub js_heap_total_mb: f64,
    pub js_heap_limit_mb: f64,
    pub js_heap_usage_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NetworkStats {
    pub requests: u64,
    pub responses: u64,
    pub failed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    total_response_time_ms: f64,
    timed_responses: u64,
}

/// Aggregated per-page resource usage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceStats {
    pub network: NetworkStats,
    pub resources_by_type: HashMap<String, ResourceTypeStats>,
    pub memory: Option<MemorySnapshot>,
}

impl ResourceStats {
    pub(crate) fn record_request(&mut self, resource_type: &str, bytes_sent: u64) {
        self.network.requests += 1;
        self.network.bytes_sent += bytes_sent;
        self.resources_by_type
            .entry(resource_type.to_string())
            .or_default()
            .count += 1;
    }

    /// Response headers arrived. Byte totals are not touched here: the size
    /// known at this point is only what has been received so far.
    pub(crate) fn record_response(&mut self, elapsed: Option<Duration>) {
        self.network.responses += 1;
        if let Some(elapsed) = elapsed {
            self.network.total_response_time_ms += elapsed.as_secs_f64() * 1000.0;
            self.network.timed_responses += 1;
        }
    }

    /// Transfer completed with its final encoded size (`loadingFinished`).
    pub(crate) fn record_transfer(&mut self, resource_type: &str, size: u64) {
        self.network.bytes_received += size;
        self.resources_by_type
            .entry(resource_type.to_string())
            .or_default()
            .size += size;
    }

    pub(crate) fn record_failure(&mut self) {
        self.network.failed += 1;
    }

    pub(crate) fn set_memory(&mut self, memory: Option<MemorySnapshot>) {
        self.memory = memory;
    }

    /// Mean time from request start to response headers, in milliseconds.
    /// Zero until at least one response has been timed.
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.network.timed_responses == 0 {
            return 0.0;
        }
        self.network.total_response_time_ms / self.network.timed_responses as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Write a timestamped JSON report to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct StatsReport<'a> {
            timestamp: chrono::DateTime<chrono::Utc>,
            stats: &'a ResourceStats,
        }

        let report = StatsReport {
            timestamp: chrono::Utc::now(),
            stats: self,
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_received_is_sum_of_completed_transfers() {
        let mut stats = ResourceStats::default();
        for size in [100u64, 250, 4096] {
            stats.record_response(None);
            stats.record_transfer("document", size);
        }
        assert_eq!(stats.network.responses, 3);
        assert_eq!(stats.network.bytes_received, 100 + 250 + 4096);
        assert_eq!(stats.resources_by_type["document"].size, 100 + 250 + 4096);
    }

    #[test]
    fn responses_count_independently_of_transfer_completion() {
        // A response whose body never finishes still counts as a response
        // but contributes no bytes
        let mut stats = ResourceStats::default();
        stats.record_response(None);
        assert_eq!(stats.network.responses, 1);
        assert_eq!(stats.network.bytes_received, 0);
    }

    #[test]
    fn avg_response_time_is_arithmetic_mean() {
        let mut stats = ResourceStats::default();
        stats.record_response(Some(Duration::from_millis(100)));
        stats.record_response(Some(Duration::from_millis(300)));
        // Untimed responses don't skew the mean
        stats.record_response(None);
        assert!((stats.avg_response_time_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn avg_response_time_zero_without_samples() {
        let stats = ResourceStats::default();
        assert_eq!(stats.avg_response_time_ms(), 0.0);
    }

    #[test]
    fn request_counters_track_per_type_counts() {
        let mut stats = ResourceStats::default();
        stats.record_request("image", 120);
        stats.record_request("image", 80);
        stats.record_request("script", 90);
        stats.record_failure();

        assert_eq!(stats.network.requests, 3);
        assert_eq!(stats.network.bytes_sent, 290);
        assert_eq!(stats.network.failed, 1);
        assert_eq!(stats.resources_by_type["image"].count, 2);
        assert_eq!(stats.resources_by_type["script"].count, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = ResourceStats::default();
        stats.record_request("image", 10);
        stats.record_response(Some(Duration::from_millis(5)));
        stats.record_transfer("image", 10);
        stats.reset();
        assert_eq!(stats.network.requests, 0);
        assert_eq!(stats.network.responses, 0);
        assert!(stats.resources_by_type.is_empty());
        assert_eq!(stats.avg_response_time_ms(), 0.0);
    }

    #[test]
    fn save_writes_timestamped_json() {
        let mut stats = ResourceStats::default();
        stats.record_response(Some(Duration::from_millis(42)));
        stats.record_transfer("document", 512);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stats.json");
        stats.save(&path).expect("save stats");

        let raw = std::fs::read_to_string(&path).expect("read back");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["stats"]["network"]["responses"], 1);
        assert_eq!(value["stats"]["network"]["bytes_received"], 512);
    }
}
