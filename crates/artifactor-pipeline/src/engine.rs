use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artifactor_cache::CacheLayer;
use artifactor_core::types::{InferencePriority, InferenceRequest, InferenceResult};
use artifactor_metrics::{names, MetricsCollector};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::coalesce::compute_request_id;
use crate::queue::{PriorityQueues, QueueReceivers};
use crate::stages::{classify, embed, postprocess, preprocess, tag};

/// Outcome of [`PipelineEngine::submit`]. High-priority requests are
/// processed inline and return their full result; medium/low-priority
/// requests are handed to the background workers and the caller gets an
/// immediate queued acknowledgement (SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Processed(InferenceResult),
    Queued { request_id: String },
}

const THROUGHPUT_WINDOW_LEN: usize = 60;

/// Five-stage inference pipeline with priority scheduling, in-flight
/// coalescing, and a two-tier cache.
pub struct PipelineEngine {
    cache: Arc<CacheLayer>,
    metrics: Arc<MetricsCollector>,
    queues: Arc<PriorityQueues>,
    inflight: Mutex<HashMap<String, broadcast::Sender<InferenceResult>>>,
    processed_since_tick: AtomicU64,
    throughput_window: Mutex<VecDeque<u64>>,
}

impl PipelineEngine {
    pub fn new(cache: Arc<CacheLayer>, metrics: Arc<MetricsCollector>) -> (Arc<Self>, QueueReceivers) {
        let (queues, receivers) = PriorityQueues::new();
        let engine = Arc::new(Self {
            cache,
            metrics,
            queues: Arc::new(queues),
            inflight: Mutex::new(HashMap::new()),
            processed_since_tick: AtomicU64::new(0),
            throughput_window: Mutex::new(VecDeque::with_capacity(THROUGHPUT_WINDOW_LEN)),
        });
        (engine, receivers)
    }

    /// Submit a request. Priority `High` bypasses the queue and is
    /// processed on the caller's task; `Medium`/`Low` are queued for the
    /// background workers and an immediate `Queued` ack is returned.
    pub async fn submit(self: &Arc<Self>, req: InferenceRequest, use_cache: bool) -> SubmitOutcome {
        match req.priority {
            InferencePriority::High => SubmitOutcome::Processed(self.process_request(req, use_cache).await),
            InferencePriority::Medium | InferencePriority::Low => {
                let mut req = req;
                req.request_id = compute_request_id(&req);
                let request_id = req.request_id.clone();
                self.queues.push(req, &self.metrics);
                SubmitOutcome::Queued { request_id }
            }
        }
    }

    /// Look up a previously computed result by request id, consulting the
    /// cache only (does not trigger computation). Used to poll for the
    /// outcome of a queued submission.
    pub async fn get_result(&self, request_id: &str) -> Option<InferenceResult> {
        let key = cache_key(request_id);
        self.cache
            .get(&key)
            .await
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Run one request through the full pipeline, honoring cache-first and
    /// in-flight coalescing. Used both for inline (priority-1) submissions
    /// and by the background workers draining the queues.
    pub async fn process_request(&self, mut req: InferenceRequest, use_cache: bool) -> InferenceResult {
        let start = std::time::Instant::now();
        req.request_id = compute_request_id(&req);
        let request_id = req.request_id.clone();
        let key = cache_key(&request_id);

        if use_cache {
            if let Ok(Some(cached)) = self.cache.get(&key).await {
                if let Ok(mut result) = serde_json::from_value::<InferenceResult>(cached) {
                    result.cache_hit = true;
                    self.metrics.increment_counter(names::PIPELINE_CACHE_HIT, &[]);
                    return result;
                }
            }
            self.metrics.increment_counter(names::PIPELINE_CACHE_MISS, &[]);
        }

        // In-flight coalescing: attach to an existing computation for the
        // same request id rather than redoing the work (SHOULD, not MUST).
        let mut rx = {
            let mut inflight = self.inflight.lock().unwrap();
            if let Some(tx) = inflight.get(&request_id) {
                Some(tx.subscribe())
            } else {
                let (tx, _rx) = broadcast::channel(4);
                inflight.insert(request_id.clone(), tx);
                None
            }
        };

        if let Some(rx) = rx.take() {
            let mut rx = rx;
            if let Ok(result) = rx.recv().await {
                return result;
            }
            // Sender dropped without broadcasting (panic in the other
            // task) — fall through and compute it ourselves.
        }

        let mut result = self.run_stages(&req).await;
        result.processing_time_ms = start.elapsed().as_millis() as u64;

        self.metrics.increment_counter(names::PIPELINE_REQUESTS_PROCESSED, &[]);
        if !result.success {
            self.metrics.increment_counter(names::PIPELINE_ERRORS, &[]);
        }
        self.processed_since_tick.fetch_add(1, Ordering::Relaxed);

        if result.success && use_cache {
            if let Ok(value) = serde_json::to_value(&result) {
                let user_tag = format!("user:{}", req.user_id.as_str());
                let type_tag = format!("file_type:{}", req.file_type);
                if let Err(e) = self.cache.set(&key, value, &[&user_tag, &type_tag]).await {
                    warn!(request_id = %request_id, error = %e, "failed to cache inference result");
                }
            }
        }

        if let Some(tx) = self.inflight.lock().unwrap().remove(&request_id) {
            let _ = tx.send(result.clone());
        }

        result
    }

    async fn run_stages(&self, req: &InferenceRequest) -> InferenceResult {
        let mut stages_completed = Vec::new();

        let pre = self.timed("preprocess", || preprocess(req));
        stages_completed.push("preprocess".to_string());

        let classification = self.timed("classify", || classify(req, &pre));
        stages_completed.push("classify".to_string());

        let tags = self.timed("tag", || tag(req, &pre));
        stages_completed.push("tag".to_string());

        let embedding = self.timed("embed", || embed(&pre.full_text));
        stages_completed.push("embed".to_string());

        let post = self.timed("postprocess", || postprocess(&pre, &classification, &tags, &embedding));
        stages_completed.push("postprocess".to_string());

        InferenceResult {
            request_id: req.request_id.clone(),
            success: true,
            classification: Some(classification),
            tags,
            embedding,
            quality_score: Some(post.quality_score),
            error: None,
            processing_time_ms: 0,
            cache_hit: false,
            stages_completed,
            produced_at: Utc::now(),
            read_time_minutes: post.read_time_minutes,
        }
    }

    fn timed<T>(&self, stage: &str, f: impl FnOnce() -> T) -> T {
        let start = std::time::Instant::now();
        let out = f();
        self.metrics
            .add_histogram_value(&format!("pipeline_stage_ms:{stage}"), start.elapsed().as_secs_f64() * 1000.0);
        out
    }

    /// Drain the three priority lanes with strict priority: high before
    /// medium before low. Spawns `workers` background tasks and returns
    /// their join handles.
    ///
    /// On `shutdown`, the loop stops selecting on new work and switches to a
    /// drain: it keeps pulling from the three receivers — still high before
    /// medium before low — until they're empty or `drain_grace` elapses.
    /// Anything still sitting in a queue once the grace deadline passes is
    /// finalized with a cached `shutdown` error instead of being dropped, so
    /// a submitter polling `get_result` doesn't wait forever (SPEC_FULL.md
    /// §5 graceful shutdown).
    pub fn spawn_workers(
        self: Arc<Self>,
        receivers: QueueReceivers,
        shutdown: CancellationToken,
        drain_grace: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self;
        let QueueReceivers { mut high, mut medium, mut low } = receivers;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    Some(req) = high.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::High, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    Some(req) = medium.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::Medium, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    Some(req) = low.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::Low, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    else => break,
                }
            }

            let deadline = tokio::time::Instant::now() + drain_grace;
            loop {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => break,
                    Some(req) = high.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::High, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    Some(req) = medium.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::Medium, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    Some(req) = low.recv() => {
                        engine.queues.mark_dequeued(InferencePriority::Low, &engine.metrics);
                        engine.process_request(req, true).await;
                    }
                    else => break,
                }
            }

            for mut rx in [high, medium, low] {
                while let Ok(req) = rx.try_recv() {
                    engine.finalize_with_shutdown_error(req).await;
                }
            }
        })
    }

    /// Finalizes a request abandoned by the grace-period drain: caches a
    /// failed result carrying the `shutdown` error so a submitter polling
    /// `get_result` observes a terminal outcome rather than hanging, and
    /// wakes up any in-flight coalescing waiter the same way a completed
    /// request would.
    async fn finalize_with_shutdown_error(&self, mut req: InferenceRequest) {
        req.request_id = compute_request_id(&req);
        let request_id = req.request_id.clone();
        self.metrics.increment_counter(names::PIPELINE_ERRORS, &[]);

        let result = InferenceResult {
            request_id: request_id.clone(),
            success: false,
            classification: None,
            tags: Vec::new(),
            embedding: None,
            quality_score: None,
            error: Some("shutdown".to_string()),
            processing_time_ms: 0,
            cache_hit: false,
            stages_completed: Vec::new(),
            produced_at: Utc::now(),
            read_time_minutes: 0.0,
        };

        if let Ok(value) = serde_json::to_value(&result) {
            if let Err(e) = self.cache.set(&cache_key(&request_id), value, &[]).await {
                warn!(request_id = %request_id, error = %e, "failed to cache shutdown result");
            }
        }
        if let Some(tx) = self.inflight.lock().unwrap().remove(&request_id) {
            let _ = tx.send(result);
        }
    }

    /// Sample `processed_since_tick` into a 60-entry sliding window once a
    /// minute, publishing the latest count as a gauge.
    pub fn spawn_throughput_sampler(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let count = engine.processed_since_tick.swap(0, Ordering::Relaxed);
                        let mut window = engine.throughput_window.lock().unwrap();
                        if window.len() >= THROUGHPUT_WINDOW_LEN {
                            window.pop_front();
                        }
                        window.push_back(count);
                        engine.metrics.set_gauge("pipeline_throughput_per_minute", count as i64);
                    }
                }
            }
        })
    }
}

fn cache_key(request_id: &str) -> String {
    format!("inference:{request_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_core::types::UserId;

    fn req(priority: InferencePriority, content: &str) -> InferenceRequest {
        InferenceRequest {
            request_id: String::new(),
            content: content.to_string(),
            title: "title".into(),
            description: "desc".into(),
            file_type: "rs".into(),
            language: "rust".into(),
            user_id: UserId::from("u1".to_string()),
            priority,
            created_at: Utc::now(),
        }
    }

    fn engine() -> Arc<PipelineEngine> {
        engine_with_receivers().0
    }

    fn engine_with_receivers() -> (Arc<PipelineEngine>, QueueReceivers) {
        let cache = Arc::new(CacheLayer::new(1024 * 1024, 60, 600));
        let metrics = Arc::new(MetricsCollector::new());
        PipelineEngine::new(cache, metrics)
    }

    #[tokio::test]
    async fn high_priority_processes_inline() {
        let engine = engine();
        let outcome = engine.submit(req(InferencePriority::High, "fn main() {}"), true).await;
        match outcome {
            SubmitOutcome::Processed(r) => {
                assert!(r.success);
                assert_eq!(r.stages_completed.len(), 5);
            }
            SubmitOutcome::Queued { .. } => panic!("expected inline processing"),
        }
    }

    #[tokio::test]
    async fn medium_priority_is_queued() {
        let engine = engine();
        let outcome = engine.submit(req(InferencePriority::Medium, "content"), true).await;
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    }

    #[tokio::test]
    async fn second_submission_is_served_from_cache() {
        let engine = engine();
        let first = engine.submit(req(InferencePriority::High, "repeat me"), true).await;
        let second = engine.submit(req(InferencePriority::High, "repeat me"), true).await;
        match (first, second) {
            (SubmitOutcome::Processed(a), SubmitOutcome::Processed(b)) => {
                assert!(!a.cache_hit);
                assert!(b.cache_hit);
            }
            _ => panic!("expected inline processing"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drain_processes_what_is_already_queued() {
        let (engine, receivers) = engine_with_receivers();
        let outcome = engine.submit(req(InferencePriority::Medium, "queued before shutdown"), true).await;
        let SubmitOutcome::Queued { request_id } = outcome else {
            panic!("expected a queued submission");
        };

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let handle = engine.clone().spawn_workers(receivers, shutdown, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        handle.await.unwrap();

        let result = engine.get_result(&request_id).await.expect("result should be cached");
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drain_finalizes_leftovers_as_shutdown_errors_past_the_deadline() {
        let (engine, receivers) = engine_with_receivers();
        let outcome = engine.submit(req(InferencePriority::Low, "never gets a worker"), true).await;
        let SubmitOutcome::Queued { request_id } = outcome else {
            panic!("expected a queued submission");
        };

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let handle = engine.clone().spawn_workers(receivers, shutdown, Duration::ZERO);

        tokio::time::advance(Duration::from_millis(10)).await;
        handle.await.unwrap();

        let result = engine.get_result(&request_id).await.expect("a shutdown result should be cached");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("shutdown"));
    }
}
