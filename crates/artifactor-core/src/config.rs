use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Top-level config (artifactor.toml + ARTIFACTOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArtifactorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub collaboration: CollaborationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

/// Shared key-value backend used for Tier-2 cache, presence mirroring, and
/// notification fanout bookkeeping. When `url` is absent every consumer falls
/// back to in-memory-only operation (see SPEC_FULL.md §9A).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KvConfig {
    pub url: Option<String>,
    #[serde(default = "default_kv_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_tier1_capacity_bytes")]
    pub tier1_capacity_bytes: usize,
    #[serde(default = "default_tier1_ttl_secs")]
    pub tier1_ttl_secs: u64,
    #[serde(default = "default_tier2_ttl_secs")]
    pub tier2_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tier1_capacity_bytes: default_tier1_capacity_bytes(),
            tier1_ttl_secs: default_tier1_ttl_secs(),
            tier2_ttl_secs: default_tier2_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "bool_true")]
    pub coalesce: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_tags: default_max_tags(),
            embedding_dim: default_embedding_dim(),
            coalesce: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    #[serde(default = "default_room_idle_reap_secs")]
    pub room_idle_reap_secs: u64,
    #[serde(default = "default_notification_cache_cap")]
    pub notification_cache_cap: usize,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            room_idle_reap_secs: default_room_idle_reap_secs(),
            notification_cache_cap: default_notification_cache_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: default_collection_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub token_signing_secret: Option<String>,
    #[serde(default = "default_bearer_header")]
    pub bearer_header: String,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_body_bytes() -> usize {
    MAX_BODY_BYTES
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.artifactor/artifactor.db", home)
}
fn default_pool_size() -> u32 {
    8
}
fn default_statement_timeout_secs() -> u64 {
    30
}
fn default_kv_timeout_secs() -> u64 {
    5
}
fn default_tier1_capacity_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_tier1_ttl_secs() -> u64 {
    3600
}
fn default_tier2_ttl_secs() -> u64 {
    86_400
}
fn default_worker_count() -> usize {
    4
}
fn default_max_tags() -> usize {
    10
}
fn default_embedding_dim() -> usize {
    384
}
fn default_room_idle_reap_secs() -> u64 {
    3600
}
fn default_notification_cache_cap() -> usize {
    100
}
fn default_collection_interval_secs() -> u64 {
    1
}
fn default_retention_secs() -> u64 {
    3600
}
fn default_bearer_header() -> String {
    "Authorization".to_string()
}

impl ArtifactorConfig {
    /// Load config from a TOML file with ARTIFACTOR_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `ARTIFACTOR_CONFIG` env var
    ///   3. `~/.artifactor/artifactor.toml`
    ///   4. Built-in defaults (every field defaults, so a missing file is fine)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("ARTIFACTOR_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: ArtifactorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ARTIFACTOR_").split("_"))
            .extract()
            .map_err(|e| crate::error::ArtifactorError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.artifactor/artifactor.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = ArtifactorConfig::default();
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.pipeline.worker_count, 4);
        assert_eq!(cfg.cache.tier1_ttl_secs, 3600);
        assert!(cfg.kv.url.is_none());
    }

    #[test]
    fn load_with_missing_file_falls_back_to_defaults() {
        let cfg = ArtifactorConfig::load(Some("/nonexistent/path/artifactor.toml")).unwrap();
        assert_eq!(cfg.server.bind, DEFAULT_BIND);
    }
}
