//! ML inference endpoints: classification, tagging, agent coordination,
//! and search (SPEC_FULL.md §6).
//!
//! Search and "related artifacts" have no backing `ArtifactEmbeddings`
//! store in this crate — that table belongs to the ingestion component
//! this specification doesn't cover. These two handlers run the query
//! itself through the pipeline and hand the caller back its
//! classification/tags/embedding to rank against their own index, rather
//! than pretending to host a search engine here.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use artifactor_core::types::{InferencePriority, InferenceRequest, InferenceResult, Tag, UserId};
use artifactor_pipeline::{batch_process, SubmitOutcome};

use crate::app::HubState;
use crate::auth::authenticate;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub priority: Option<String>,
}

fn priority_from(raw: Option<&str>) -> InferencePriority {
    match raw {
        Some("high") => InferencePriority::High,
        Some("low") => InferencePriority::Low,
        _ => InferencePriority::Medium,
    }
}

fn build_request(body: &ClassifyBody, user_id: UserId, priority: InferencePriority) -> InferenceRequest {
    InferenceRequest {
        request_id: String::new(),
        content: body.content.clone(),
        title: body.title.clone(),
        description: body.description.clone(),
        file_type: body.file_type.clone(),
        language: body.language.clone(),
        user_id,
        priority,
        created_at: Utc::now(),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassifyResponse {
    Processed { result: InferenceResult },
    Queued { request_id: String },
}

pub async fn classify(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<ClassifyBody>,
) -> Result<Json<ClassifyResponse>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let priority = priority_from(body.priority.as_deref());
    let req = build_request(&body, UserId::from(user.user_id), priority);
    let outcome = state.pipeline.submit(req, true).await;
    let response = match outcome {
        SubmitOutcome::Processed(result) => ClassifyResponse::Processed { result },
        SubmitOutcome::Queued { request_id } => ClassifyResponse::Queued { request_id },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBatchBody {
    pub items: Vec<ClassifyBody>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

pub async fn classify_batch(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<ClassifyBatchBody>,
) -> Result<Json<Vec<InferenceResult>>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let user_id = UserId::from(user.user_id);
    let requests: Vec<InferenceRequest> = body
        .items
        .iter()
        .map(|item| build_request(item, user_id.clone(), InferencePriority::High))
        .collect();
    let results = batch_process(&state.pipeline, requests, body.concurrency).await;
    Ok(Json(results))
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<Tag>,
}

pub async fn tags_generate(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<ClassifyBody>,
) -> Result<Json<TagsResponse>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let req = build_request(&body, UserId::from(user.user_id), InferencePriority::High);
    let result = state.pipeline.process_request(req, true).await;
    Ok(Json(TagsResponse { tags: result.tags }))
}

#[derive(Debug, Deserialize)]
pub struct ProjectAnalyzeBody {
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(flatten)]
    pub extra: Value,
}

pub async fn projects_analyze(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<ProjectAnalyzeBody>,
) -> Result<Json<Value>> {
    authenticate(&state.config.auth, &headers)?;
    let agents = if body.agents.is_empty() {
        vec!["pygui".to_string(), "python_internal".to_string()]
    } else {
        body.agents.clone()
    };
    let mut task_data = body.extra;
    if let Value::Object(ref mut map) = task_data {
        map.insert("task_type".to_string(), json!("analyze_project"));
        map.insert("agents".to_string(), json!(agents));
    } else {
        task_data = json!({ "task_type": "analyze_project", "agents": agents });
    }
    let outcome = state.bridge.invoke("coordinator", task_data).await;
    Ok(Json(outcome.to_json()))
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default = "default_search_type")]
    #[serde(rename = "type")]
    pub search_type: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filters: Value,
}

fn default_search_type() -> String {
    "semantic".to_string()
}

fn default_search_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: String,
    pub limit: usize,
    pub result: InferenceResult,
}

pub async fn search(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let req = InferenceRequest {
        request_id: String::new(),
        content: body.query.clone(),
        title: String::new(),
        description: String::new(),
        file_type: String::new(),
        language: String::new(),
        user_id: UserId::from(user.user_id),
        priority: InferencePriority::High,
        created_at: Utc::now(),
    };
    let result = state.pipeline.process_request(req, true).await;
    Ok(Json(SearchResponse {
        query: body.query,
        search_type: body.search_type,
        limit: body.limit,
        result,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RelatedBody {
    pub artifact_id: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    pub artifact_id: String,
    pub limit: usize,
    pub tags: Vec<Tag>,
}

pub async fn related(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<RelatedBody>,
) -> Result<Json<RelatedResponse>> {
    authenticate(&state.config.auth, &headers)?;
    let cached = state.pipeline.get_result(&body.artifact_id).await;
    let tags = cached.map(|r| r.tags).unwrap_or_default();
    Ok(Json(RelatedResponse {
        artifact_id: body.artifact_id,
        limit: body.limit,
        tags,
    }))
}
