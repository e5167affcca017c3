use serde::Serialize;
use std::sync::Mutex;

use crate::domain::error::ErrorCode;

/// 保持するレイテンシ記録の上限
const MAX_LATENCY_RECORDS: usize = 1000;

/// レイテンシ計測のフェーズ名
pub mod phase {
    pub const ANALYZE: &str = "analyze";
    pub const REWRITE: &str = "rewrite";
    pub const QUICK_REWRITE: &str = "quick_rewrite";
}

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    checks_started: u64,
    rewrites_started: u64,
    quick_rewrites_started: u64,
    requests_succeeded: u64,
    retries: u64,
    errors_credential: u64,
    errors_provider: u64,
    errors_storage: u64,
    errors_other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub checks_started: u64,
    pub rewrites_started: u64,
    pub quick_rewrites_started: u64,
    pub requests_succeeded: u64,
    pub retries: u64,
    pub error_counts: ErrorCounts,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorCounts {
    pub missing_credential: u64,
    pub provider: u64,
    pub storage: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub analyze: Option<f64>,
    pub rewrite: Option<f64>,
    pub quick_rewrite: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, MetricsCounters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn inc_checks_started(&self) {
        self.counters().checks_started += 1;
    }

    pub fn inc_rewrites_started(&self) {
        self.counters().rewrites_started += 1;
    }

    pub fn inc_quick_rewrites_started(&self) {
        self.counters().quick_rewrites_started += 1;
    }

    pub fn inc_succeeded(&self) {
        self.counters().requests_succeeded += 1;
    }

    pub fn inc_retries(&self) {
        self.counters().retries += 1;
    }

    pub fn inc_error(&self, code: ErrorCode) {
        let mut c = self.counters();
        match code {
            ErrorCode::MissingCredential => c.errors_credential += 1,
            ErrorCode::Provider => c.errors_provider += 1,
            ErrorCode::Storage => c.errors_storage += 1,
            _ => c.errors_other += 1,
        }
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let record = LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        latencies.push(record);
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters();
        let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());

        let avg = |phase: &str| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            checks_started: c.checks_started,
            rewrites_started: c.rewrites_started,
            quick_rewrites_started: c.quick_rewrites_started,
            requests_succeeded: c.requests_succeeded,
            retries: c.retries,
            error_counts: ErrorCounts {
                missing_credential: c.errors_credential,
                provider: c.errors_provider,
                storage: c.errors_storage,
                other: c.errors_other,
            },
            avg_latency_ms: AvgLatency {
                analyze: avg(phase::ANALYZE),
                rewrite: avg(phase::REWRITE),
                quick_rewrite: avg(phase::QUICK_REWRITE),
            },
            recent_latencies: recent,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let m = Metrics::new();
        m.inc_checks_started();
        m.inc_checks_started();
        m.inc_rewrites_started();
        m.inc_retries();
        m.inc_succeeded();
        m.inc_error(ErrorCode::MissingCredential);
        m.inc_error(ErrorCode::Provider);
        m.inc_error(ErrorCode::Internal);

        let s = m.summary();
        assert_eq!(s.checks_started, 2);
        assert_eq!(s.rewrites_started, 1);
        assert_eq!(s.quick_rewrites_started, 0);
        assert_eq!(s.retries, 1);
        assert_eq!(s.requests_succeeded, 1);
        assert_eq!(s.error_counts.missing_credential, 1);
        assert_eq!(s.error_counts.provider, 1);
        assert_eq!(s.error_counts.other, 1);
    }

    #[test]
    fn test_latency_recording() {
        let m = Metrics::new();
        m.record_latency(phase::ANALYZE, 120);
        m.record_latency(phase::ANALYZE, 80);
        m.record_latency(phase::REWRITE, 200);

        let s = m.summary();
        assert!((s.avg_latency_ms.analyze.unwrap() - 100.0).abs() < f64::EPSILON);
        assert!((s.avg_latency_ms.rewrite.unwrap() - 200.0).abs() < f64::EPSILON);
        assert!(s.avg_latency_ms.quick_rewrite.is_none());
        assert_eq!(s.recent_latencies.len(), 3);
        assert_eq!(s.recent_latencies[0].phase, "rewrite");
    }

    #[test]
    fn test_latency_cap() {
        let m = Metrics::new();
        for i in 0..1100 {
            m.record_latency(phase::QUICK_REWRITE, i);
        }
        let latencies = m.latencies.lock().unwrap();
        assert_eq!(latencies.len(), MAX_LATENCY_RECORDS);
        assert_eq!(latencies[0].duration_ms, 100);
    }
}
