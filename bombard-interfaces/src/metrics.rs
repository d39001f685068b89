//! Metrics recorder contract
//!
//! The engine emits one duration sample per test and one per decorated
//! stage, plus worker-pool gauges. Actual sinks (statsd, prometheus, logs)
//! are operator concerns behind this trait; the in-memory recorder exists
//! for assertions in tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Recorder for harness-emitted measurements
pub trait HarnessMetrics: Send + Sync {
    /// One sample per decorated stage execution, labeled by service, stage
    /// name, and outcome
    fn record_stage_duration(&self, service: &str, stage: &str, outcome: &str, duration: Duration);

    /// Exactly one sample per finished test, labeled by service and outcome
    fn record_test_duration(&self, service: &str, outcome: &str, duration: Duration);

    /// Current number of live worker tasks for a service flow
    fn set_active_workers(&self, service: &str, count: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl HarnessMetrics for NoopMetrics {
    fn record_stage_duration(
        &self,
        _service: &str,
        _stage: &str,
        _outcome: &str,
        _duration: Duration,
    ) {
    }

    fn record_test_duration(&self, _service: &str, _outcome: &str, _duration: Duration) {}

    fn set_active_workers(&self, _service: &str, _count: u64) {}
}

/// One recorded duration sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationSample {
    pub service: String,
    /// Absent for whole-test samples
    pub stage: Option<String>,
    pub outcome: String,
    pub duration: Duration,
}

/// In-memory recorder used by the test suites
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    samples: Mutex<Vec<DurationSample>>,
    worker_gauges: Mutex<HashMap<String, u64>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded sample
    pub fn samples(&self) -> Vec<DurationSample> {
        self.samples.lock().expect("metrics lock poisoned").clone()
    }

    /// Whole-test samples for one service and outcome label
    pub fn test_samples(&self, service: &str, outcome: &str) -> Vec<DurationSample> {
        self.samples()
            .into_iter()
            .filter(|s| s.stage.is_none() && s.service == service && s.outcome == outcome)
            .collect()
    }

    /// Count of whole-test samples for a service, across outcomes
    pub fn test_sample_count(&self, service: &str) -> usize {
        self.samples()
            .iter()
            .filter(|s| s.stage.is_none() && s.service == service)
            .count()
    }

    /// Last reported worker gauge for a service
    pub fn active_workers(&self, service: &str) -> Option<u64> {
        self.worker_gauges
            .lock()
            .expect("metrics lock poisoned")
            .get(service)
            .copied()
    }
}

impl HarnessMetrics for RecordingMetrics {
    fn record_stage_duration(&self, service: &str, stage: &str, outcome: &str, duration: Duration) {
        self.samples
            .lock()
            .expect("metrics lock poisoned")
            .push(DurationSample {
                service: service.to_string(),
                stage: Some(stage.to_string()),
                outcome: outcome.to_string(),
                duration,
            });
    }

    fn record_test_duration(&self, service: &str, outcome: &str, duration: Duration) {
        self.samples
            .lock()
            .expect("metrics lock poisoned")
            .push(DurationSample {
                service: service.to_string(),
                stage: None,
                outcome: outcome.to_string(),
                duration,
            });
    }

    fn set_active_workers(&self, service: &str, count: u64) {
        self.worker_gauges
            .lock()
            .expect("metrics lock poisoned")
            .insert(service.to_string(), count);
    }
}
