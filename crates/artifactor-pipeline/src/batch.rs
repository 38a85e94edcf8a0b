use std::sync::Arc;

use artifactor_core::types::{InferenceRequest, InferenceResult};
use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::engine::PipelineEngine;

/// Process `requests` with at most `concurrency` in flight at once,
/// returning one result per request in submission order. Each request's
/// own success/failure is carried in its [`InferenceResult`] — a single
/// request's failure never aborts the rest of the batch.
pub async fn batch_process(
    engine: &Arc<PipelineEngine>,
    requests: Vec<InferenceRequest>,
    concurrency: usize,
) -> Vec<InferenceResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let futures = requests.into_iter().map(|req| {
        let engine = Arc::clone(engine);
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            engine.process_request(req, true).await
        }
    });

    join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_cache::CacheLayer;
    use artifactor_core::types::{InferencePriority, UserId};
    use artifactor_metrics::MetricsCollector;
    use chrono::Utc;

    fn req(i: usize) -> InferenceRequest {
        InferenceRequest {
            request_id: String::new(),
            content: format!("content {i}"),
            title: "t".into(),
            description: "d".into(),
            file_type: "rs".into(),
            language: "rust".into(),
            user_id: UserId::from("u1".to_string()),
            priority: InferencePriority::High,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn batch_preserves_submission_order() {
        let cache = Arc::new(CacheLayer::new(1024 * 1024, 60, 600));
        let metrics = Arc::new(MetricsCollector::new());
        let (engine, _recv) = PipelineEngine::new(cache, metrics);

        let requests: Vec<_> = (0..5).map(req).collect();
        let results = batch_process(&engine, requests, 2).await;

        assert_eq!(results.len(), 5);
        for (i, r) in results.iter().enumerate() {
            assert!(r.success, "request {i} should succeed");
        }
    }
}
