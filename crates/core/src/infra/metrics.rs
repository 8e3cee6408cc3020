use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;
use crate::domain::job::JobState;

/// 保持するレイテンシ記録の上限
const LATENCY_CAP: usize = 1000;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    jobs_submitted: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    jobs_cancelled: u64,
    jobs_timed_out: u64,
    polls_issued: u64,
    errors: BTreeMap<&'static str, u64>,
}

/// 計測区間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Submit,
    Poll,
    /// 投入から終端までの全体
    Generation,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: Phase,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（CLI の --stats 用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub jobs_timed_out: u64,
    pub polls_issued: u64,
    /// エラーコード（E_...）ごとの件数
    pub error_counts: BTreeMap<&'static str, u64>,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub submit: Option<f64>,
    pub poll: Option<f64>,
    pub generation: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_jobs_submitted(&self) {
        self.counters.lock().jobs_submitted += 1;
    }

    pub fn inc_polls_issued(&self) {
        self.counters.lock().polls_issued += 1;
    }

    /// 終端状態ごとの件数を数える
    pub fn record_outcome(&self, state: JobState) {
        let mut c = self.counters.lock();
        match state {
            JobState::Completed => c.jobs_completed += 1,
            JobState::Failed => c.jobs_failed += 1,
            JobState::Cancelled => c.jobs_cancelled += 1,
            JobState::TimedOut => c.jobs_timed_out += 1,
            JobState::Submitting | JobState::Queued | JobState::Processing => {}
        }
    }

    pub fn inc_error(&self, code: ErrorCode) {
        *self.counters.lock().errors.entry(code.as_str()).or_insert(0) += 1;
    }

    pub fn record_latency(&self, phase: Phase, duration_ms: u64) {
        let record = LatencyRecord {
            phase,
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock();
        latencies.push(record);
        if latencies.len() > LATENCY_CAP {
            let excess = latencies.len() - LATENCY_CAP;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock();
        let latencies = self.latencies.lock();

        let avg = |phase: Phase| -> Option<f64> {
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
            jobs_submitted: c.jobs_submitted,
            jobs_completed: c.jobs_completed,
            jobs_failed: c.jobs_failed,
            jobs_cancelled: c.jobs_cancelled,
            jobs_timed_out: c.jobs_timed_out,
            polls_issued: c.polls_issued,
            error_counts: c.errors.clone(),
            avg_latency_ms: AvgLatency {
                submit: avg(Phase::Submit),
                poll: avg(Phase::Poll),
                generation: avg(Phase::Generation),
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
