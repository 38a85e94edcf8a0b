use crate::collector::MetricsCollector;
use crate::names;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One derived application-metrics snapshot, taken once per collection
/// interval (SPEC_FULL.md §9A `metrics.collection_interval_secs`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub requests_total: u64,
    pub errors_total: u64,
    pub cache_hit_rate: f64,
}

/// Bounded ring buffer of snapshots, evicted once older than the retention
/// period. Shared with HTTP handlers that expose recent history.
#[derive(Debug, Default)]
pub struct History {
    inner: Mutex<VecDeque<Snapshot>>,
}

impl History {
    pub fn push(&self, snapshot: Snapshot, retention: chrono::Duration) {
        let mut buf = self.inner.lock().unwrap();
        buf.push_back(snapshot);
        let cutoff = Utc::now() - retention;
        while buf.front().map(|s| s.taken_at < cutoff).unwrap_or(false) {
            buf.pop_front();
        }
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.inner.lock().unwrap().iter().cloned().collect()
    }
}

/// Runs until `shutdown` is cancelled, sampling derived application metrics
/// from the collector's existing counters/gauges at a fixed interval and
/// appending them to `history`. Mirrors the collection-loop shape of
/// `metrics_collector.py`'s `_collection_loop`, adapted to the counters this
/// workspace actually records (request/error counts, cache hit rate) rather
/// than host OS metrics, which nothing in this workspace's dependency stack
/// provides a grounded way to sample.
pub async fn run(
    collector: Arc<MetricsCollector>,
    history: Arc<History>,
    interval_secs: u64,
    retention_secs: u64,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let retention = chrono::Duration::seconds(retention_secs as i64);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let requests_total = collector.get_counter(names::PIPELINE_REQUESTS_PROCESSED, &[]);
                let errors_total = collector.get_counter(names::PIPELINE_ERRORS, &[]);
                let hits = collector.get_counter(names::PIPELINE_CACHE_HIT, &[]);
                let misses = collector.get_counter(names::PIPELINE_CACHE_MISS, &[]);
                let total = hits + misses;
                let cache_hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
                history.push(
                    Snapshot {
                        taken_at: Utc::now(),
                        requests_total,
                        errors_total,
                        cache_hit_rate,
                    },
                    retention,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_evicts_snapshots_older_than_retention() {
        let history = History::default();
        let old = Snapshot {
            taken_at: Utc::now() - chrono::Duration::seconds(120),
            requests_total: 1,
            errors_total: 0,
            cache_hit_rate: 1.0,
        };
        history.push(old, chrono::Duration::seconds(60));
        let fresh = Snapshot {
            taken_at: Utc::now(),
            requests_total: 2,
            errors_total: 0,
            cache_hit_rate: 1.0,
        };
        history.push(fresh, chrono::Duration::seconds(60));
        assert_eq!(history.snapshots().len(), 1);
    }
}
