use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

/// A histogram that tracks the distribution of observed values across buckets.
#[derive(Debug)]
pub struct Histogram {
    pub buckets: Vec<f64>,
    pub counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_bits: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        loop {
            let current = self.sum_bits.load(Ordering::Relaxed);
            let new = f64::from_bits(current) + value;
            match self.sum_bits.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(_) => continue,
            }
        }
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let c = self.count();
        if c == 0 {
            0.0
        } else {
            self.sum() / c as f64
        }
    }
}

fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// A sorted label set distinguishing counter/gauge families sharing one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect()
    }
}

/// A running timer acquired via [`MetricsCollector::timer_scope`]; recording
/// the elapsed duration into its histogram happens automatically on drop.
pub struct TimerScope<'a> {
    collector: &'a MetricsCollector,
    name: String,
    started_at: Instant,
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        self.collector.record_timer(&self.name, elapsed);
    }
}

/// Counters, gauges, histograms and timers for every other service in the
/// workspace. One instance lives on the `Application` composition root and is
/// handed out by reference — see SPEC_FULL.md §9D.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<HashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<HashMap<String, AtomicI64>>,
    histograms: RwLock<HashMap<String, Histogram>>,
    timers: RwLock<HashMap<String, Histogram>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = self.counters.read().unwrap();
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.counters.write().unwrap();
        map.entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        self.counters
            .read()
            .unwrap()
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        {
            let map = self.gauges.read().unwrap();
            if let Some(g) = map.get(name) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.gauges.write().unwrap();
        map.entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn get_gauge(&self, name: &str) -> i64 {
        self.gauges
            .read()
            .unwrap()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn add_histogram_value(&self, name: &str, value: f64) {
        {
            let map = self.histograms.read().unwrap();
            if let Some(h) = map.get(name) {
                h.observe(value);
                return;
            }
        }
        let mut map = self.histograms.write().unwrap();
        map.entry(name.to_string())
            .or_insert_with(|| Histogram::new(default_duration_buckets()))
            .observe(value);
    }

    pub fn record_timer(&self, name: &str, seconds: f64) {
        {
            let map = self.timers.read().unwrap();
            if let Some(h) = map.get(name) {
                h.observe(seconds);
                return;
            }
        }
        let mut map = self.timers.write().unwrap();
        map.entry(name.to_string())
            .or_insert_with(|| Histogram::new(default_duration_buckets()))
            .observe(seconds);
    }

    /// Acquire a scoped timer; the elapsed wall time is recorded when the
    /// returned guard is dropped.
    pub fn timer_scope(&self, name: &str) -> TimerScope<'_> {
        TimerScope {
            collector: self,
            name: name.to_string(),
            started_at: Instant::now(),
        }
    }

    pub fn timer_mean_seconds(&self, name: &str) -> f64 {
        self.timers
            .read()
            .unwrap()
            .get(name)
            .map(|h| h.mean())
            .unwrap_or(0.0)
    }

    pub fn export_json(&self) -> serde_json::Value {
        let mut counters_json = serde_json::Map::new();
        for ((name, labels), val) in self.counters.read().unwrap().iter() {
            let key = if labels.0.is_empty() {
                name.clone()
            } else {
                format!("{}{:?}", name, labels.as_json())
            };
            counters_json.insert(key, serde_json::json!(val.load(Ordering::Relaxed)));
        }

        let mut gauges_json = serde_json::Map::new();
        for (name, val) in self.gauges.read().unwrap().iter() {
            gauges_json.insert(name.clone(), serde_json::json!(val.load(Ordering::Relaxed)));
        }

        let mut histograms_json = serde_json::Map::new();
        for (name, h) in self.histograms.read().unwrap().iter() {
            histograms_json.insert(
                name.clone(),
                serde_json::json!({ "sum": h.sum(), "count": h.count(), "mean": h.mean() }),
            );
        }

        let mut timers_json = serde_json::Map::new();
        for (name, h) in self.timers.read().unwrap().iter() {
            timers_json.insert(
                name.clone(),
                serde_json::json!({ "mean_seconds": h.mean(), "count": h.count() }),
            );
        }

        serde_json::json!({
            "counters": counters_json,
            "gauges": gauges_json,
            "histograms": histograms_json,
            "timers": timers_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_per_label_set() {
        let m = MetricsCollector::new();
        m.increment_counter("requests_total", &[("status", "ok")]);
        m.increment_counter("requests_total", &[("status", "ok")]);
        m.increment_counter("requests_total", &[("status", "error")]);
        assert_eq!(m.get_counter("requests_total", &[("status", "ok")]), 2);
        assert_eq!(m.get_counter("requests_total", &[("status", "error")]), 1);
    }

    #[test]
    fn gauge_set_overwrites() {
        let m = MetricsCollector::new();
        m.set_gauge("queue_depth", 5);
        m.set_gauge("queue_depth", 2);
        assert_eq!(m.get_gauge("queue_depth"), 2);
    }

    #[test]
    fn histogram_tracks_sum_and_count() {
        let m = MetricsCollector::new();
        m.add_histogram_value("stage_duration_seconds", 0.1);
        m.add_histogram_value("stage_duration_seconds", 0.3);
        let json = m.export_json();
        assert_eq!(json["histograms"]["stage_duration_seconds"]["count"], 2);
    }

    #[test]
    fn timer_scope_records_on_drop() {
        let m = MetricsCollector::new();
        {
            let _t = m.timer_scope("op_seconds");
        }
        assert!(m.timer_mean_seconds("op_seconds") >= 0.0);
        assert_eq!(
            m.export_json()["timers"]["op_seconds"]["count"],
            serde_json::json!(1)
        );
    }
}
