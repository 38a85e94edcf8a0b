//! Composition root: builds every service in dependency order and drives
//! them, plus the axum server, until shutdown (SPEC_FULL.md §9D).

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use artifactor_bridge::AgentBridge;
use artifactor_cache::{CacheLayer, InMemoryKv};
use artifactor_core::config::ArtifactorConfig;
use artifactor_metrics::{History, MetricsCollector};
use artifactor_notifications::NotificationService;
use artifactor_pipeline::{PipelineEngine, QueueReceivers};
use artifactor_presence::PresenceService;

use crate::hub::CollaborationHub;

/// Shared state handed to every axum handler.
pub struct HubState {
    pub config: ArtifactorConfig,
    pub metrics: Arc<MetricsCollector>,
    pub metrics_history: Arc<History>,
    pub cache: Arc<CacheLayer>,
    pub bridge: Arc<AgentBridge>,
    pub presence: Arc<PresenceService>,
    pub notifications: Arc<NotificationService>,
    pub pipeline: Arc<PipelineEngine>,
    pub hub: Arc<CollaborationHub>,
}

/// Owns every service plus the background tasks and HTTP server that tie
/// them together. Built once in `main`, consumed by `run`.
pub struct Application {
    state: Arc<HubState>,
    notification_rx: tokio::sync::mpsc::UnboundedReceiver<artifactor_core::types::Notification>,
    pipeline_receivers: QueueReceivers,
}

impl Application {
    /// Constructs every service in dependency order: Metrics → Cache →
    /// AgentBridge → Presence → Notifications → InferencePipeline →
    /// CollaborationHub.
    pub fn build(config: ArtifactorConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsCollector::new());
        let metrics_history = Arc::new(History::default());

        let mut cache_layer = CacheLayer::new(
            config.cache.tier1_capacity_bytes,
            config.cache.tier1_ttl_secs,
            config.cache.tier2_ttl_secs,
        );
        if config.kv.url.is_some() {
            // No networked Tier2Kv backend exists in this workspace yet;
            // an in-memory stand-in still exercises the write-through path.
            cache_layer = cache_layer.with_tier2(Arc::new(InMemoryKv::new()));
        }
        let cache = Arc::new(cache_layer);

        let bridge = Arc::new(AgentBridge::new(metrics.clone()));

        let durable = Arc::new(Mutex::new(open_database(&config.database.path)?));

        let presence = Arc::new(PresenceService::new(durable.clone(), cache.clone())?);

        let (notifications, notification_rx) = NotificationService::new(durable.clone())?;

        let (pipeline, pipeline_receivers) = PipelineEngine::new(cache.clone(), metrics.clone());

        let hub = Arc::new(CollaborationHub::new(durable.clone(), presence.clone(), notifications.clone())?);

        let state = Arc::new(HubState {
            config,
            metrics,
            metrics_history,
            cache,
            bridge,
            presence,
            notifications,
            pipeline,
            hub,
        });

        Ok(Self { state, notification_rx, pipeline_receivers })
    }

    /// Starts every background task and the HTTP/WebSocket server, and runs
    /// until `shutdown` fires, then drains per SPEC_FULL.md §5.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let Application { state, notification_rx, pipeline_receivers } = self;

        let mut tasks = Vec::new();
        tasks.push(state.presence.clone().run_cleanup(shutdown.clone()));
        tasks.push(state.notifications.clone().run_delivery(notification_rx, shutdown.clone()));
        let drain_grace = Duration::from_secs(state.config.server.shutdown_grace_secs);
        tasks.push(
            state
                .pipeline
                .clone()
                .spawn_workers(pipeline_receivers, shutdown.clone(), drain_grace),
        );
        tasks.push(state.pipeline.clone().spawn_throughput_sampler(shutdown.clone()));

        tasks.push(tokio::spawn(artifactor_metrics::sampler::run(
            state.metrics.clone(),
            state.metrics_history.clone(),
            state.config.metrics.collection_interval_secs,
            state.config.metrics.retention_secs,
            shutdown.clone(),
        )));

        let router = crate::http::router(state.clone()).merge(crate::ws::router(state.clone()));
        let router = router
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&state.config.server.cors_origins));

        let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "artifactor collaboration hub listening");

        let server_shutdown = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await?;

        let grace = Duration::from_secs(state.config.server.shutdown_grace_secs);
        for task in tasks {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("background task did not shut down within the grace period");
            }
        }

        Ok(())
    }
}

fn open_database(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Connection::open(path)?)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(parsed))
    }
}
