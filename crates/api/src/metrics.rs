use resolve::PipelineOutput;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Pipeline runs
    total_runs: AtomicUsize,
    successful_runs: AtomicUsize,
    failed_runs: AtomicUsize,
    timed_out_runs: AtomicUsize,

    // Timing (in microseconds)
    total_generate_time_us: AtomicU64,
    total_search_time_us: AtomicU64,

    // Counts
    total_attempts: AtomicUsize,
    total_searches: AtomicUsize,
    entities_resolved: AtomicUsize,
    entities_minted: AtomicUsize,
    triples_inserted: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_runs: AtomicUsize::new(0),
            successful_runs: AtomicUsize::new(0),
            failed_runs: AtomicUsize::new(0),
            timed_out_runs: AtomicUsize::new(0),
            total_generate_time_us: AtomicU64::new(0),
            total_search_time_us: AtomicU64::new(0),
            total_attempts: AtomicUsize::new(0),
            total_searches: AtomicUsize::new(0),
            entities_resolved: AtomicUsize::new(0),
            entities_minted: AtomicUsize::new(0),
            triples_inserted: AtomicUsize::new(0),
        })
    }

    pub fn record_run(&self, duration: Duration, output: &PipelineOutput) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.successful_runs.fetch_add(1, Ordering::Relaxed);
        self.total_generate_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_attempts.fetch_add(output.attempts, Ordering::Relaxed);
        self.entities_resolved
            .fetch_add(output.entities.len(), Ordering::Relaxed);
        self.entities_minted.fetch_add(
            output.entities.iter().filter(|e| e.minted).count(),
            Ordering::Relaxed,
        );
        self.triples_inserted
            .fetch_add(output.inserted, Ordering::Relaxed);
    }

    pub fn record_failure(&self, duration: Duration, timed_out: bool) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.timed_out_runs.fetch_add(1, Ordering::Relaxed);
        }
        self.total_generate_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_search(&self, duration: Duration) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        self.total_search_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            successful_runs: self.successful_runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            timed_out_runs: self.timed_out_runs.load(Ordering::Relaxed),
            avg_generate_time_ms: avg_time_ms(&self.total_generate_time_us, &self.total_runs),
            avg_search_time_ms: avg_time_ms(&self.total_search_time_us, &self.total_searches),
            avg_attempts: ratio(&self.total_attempts, &self.successful_runs),
            total_searches: self.total_searches.load(Ordering::Relaxed),
            entities_resolved: self.entities_resolved.load(Ordering::Relaxed),
            entities_minted: self.entities_minted.load(Ordering::Relaxed),
            triples_inserted: self.triples_inserted.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

fn ratio(total: &AtomicUsize, count: &AtomicUsize) -> f64 {
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total.load(Ordering::Relaxed) as f64 / cnt
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub timed_out_runs: usize,
    pub avg_generate_time_ms: f64,
    pub avg_search_time_ms: f64,
    /// Mean generation attempts per successful run.
    pub avg_attempts: f64,
    pub total_searches: usize,
    pub entities_resolved: usize,
    pub entities_minted: usize,
    pub triples_inserted: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::ExtractedVariable;
    use resolve::ResolvedEntity;

    fn output(attempts: usize, minted: &[bool]) -> PipelineOutput {
        PipelineOutput {
            graph: String::new(),
            entities: minted
                .iter()
                .enumerate()
                .map(|(i, minted)| ResolvedEntity {
                    entity: ExtractedVariable::new(format!("E{i}"), "T", "n"),
                    subject: format!("http://example.org/{i}"),
                    minted: *minted,
                })
                .collect(),
            attempts,
            inserted: 4,
        }
    }

    #[test]
    fn test_snapshot_aggregates_runs() {
        let metrics = Metrics::new();
        metrics.record_run(Duration::from_millis(10), &output(1, &[false, true]));
        metrics.record_run(Duration::from_millis(30), &output(3, &[true]));
        metrics.record_failure(Duration::from_millis(20), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 3);
        assert_eq!(snapshot.successful_runs, 2);
        assert_eq!(snapshot.failed_runs, 1);
        assert_eq!(snapshot.timed_out_runs, 1);
        assert_eq!(snapshot.entities_resolved, 3);
        assert_eq!(snapshot.entities_minted, 2);
        assert_eq!(snapshot.triples_inserted, 8);
        assert!((snapshot.avg_attempts - 2.0).abs() < f64::EPSILON);
        assert!((snapshot.avg_generate_time_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_has_zero_averages() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_search_time_ms, 0.0);
        assert_eq!(snapshot.avg_attempts, 0.0);
    }
}
