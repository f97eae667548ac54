use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregated per-tool execution counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    pub executions: u64,
    pub failures: u64,
    pub total_duration_seconds: f64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub tools: BTreeMap<String, ToolStats>,
}

/// Process-wide execution counters, dumped to `logs/metrics.json` on exit
/// or on demand from the CLI.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

struct Inner {
    started_at: DateTime<Utc>,
    requests_total: u64,
    requests_failed: u64,
    tools: BTreeMap<String, ToolStats>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                started_at: Utc::now(),
                requests_total: 0,
                requests_failed: 0,
                tools: BTreeMap::new(),
            }),
        }
    }

    pub fn record_tool_execution(
        &self,
        tool_name: &str,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    ) {
        let mut inner = self.inner.lock().expect("metrics poisoned");
        let stats = inner.tools.entry(tool_name.to_string()).or_default();
        stats.executions += 1;
        stats.total_duration_seconds += duration.as_secs_f64();
        if !success {
            stats.failures += 1;
            stats.last_error = error.map(String::from);
        }
    }

    pub fn record_request(&self, success: bool) {
        let mut inner = self.inner.lock().expect("metrics poisoned");
        inner.requests_total += 1;
        if !success {
            inner.requests_failed += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().expect("metrics poisoned");
        MetricsSnapshot {
            started_at: inner.started_at,
            exported_at: Utc::now(),
            requests_total: inner.requests_total,
            requests_failed: inner.requests_failed,
            tools: inner.tools.clone(),
        }
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.snapshot();
        let mut report = String::new();
        let _ = writeln!(report, "Metrics Report");
        let _ = writeln!(report, "==============");
        let _ = writeln!(
            report,
            "Requests: {} total, {} failed",
            snapshot.requests_total, snapshot.requests_failed
        );
        let _ = writeln!(report);
        let _ = writeln!(report, "Tool executions:");
        if snapshot.tools.is_empty() {
            let _ = writeln!(report, "  (none)");
        }
        for (name, stats) in &snapshot.tools {
            let avg = if stats.executions > 0 {
                stats.total_duration_seconds / stats.executions as f64
            } else {
                0.0
            };
            let _ = writeln!(
                report,
                "  {name:<20} {} runs, {} failed, avg {avg:.3}s",
                stats.executions, stats.failures
            );
        }
        report
    }

    /// Write the snapshot as JSON. Parent directories are created.
    pub fn export(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_tool_execution("write_file", Duration::from_millis(10), true, None);
        metrics.record_tool_execution("write_file", Duration::from_millis(30), false, Some("disk full"));

        let snapshot = metrics.snapshot();
        let stats = &snapshot.tools["write_file"];
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_export_writes_json(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/metrics.json");

        let metrics = MetricsCollector::new();
        metrics.record_request(true);
        metrics.export(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["requests_total"], 1);
    }

    #[test]
    fn test_report_lists_tools() {
        let metrics = MetricsCollector::new();
        metrics.record_tool_execution("ping", Duration::from_millis(5), true, None);
        let report = metrics.generate_report();
        assert!(report.contains("ping"));
        assert!(report.contains("1 runs"));
    }
}
