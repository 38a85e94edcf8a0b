pub mod activity;
pub mod comments;
pub mod health;
pub mod ml;
pub mod notifications;
pub mod presence;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use artifactor_protocol::methods;

use crate::app::HubState;

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route(methods::HEALTH, get(health::health))
        .route(
            methods::ARTIFACT_COMMENTS,
            get(comments::list).post(comments::create),
        )
        .route(
            methods::ARTIFACT_COMMENT,
            put(comments::update).delete(comments::delete),
        )
        .route(methods::ARTIFACT_ACTIVITY, get(activity::list))
        .route(methods::ARTIFACT_PRESENCE, get(presence::artifact_presence))
        .route(methods::NOTIFICATIONS, get(notifications::list))
        .route(methods::NOTIFICATIONS_MARK_READ, post(notifications::mark_read))
        .route(methods::NOTIFICATIONS_MARK_ALL_READ, post(notifications::mark_all_read))
        .route(methods::NOTIFICATIONS_COUNTS, get(notifications::counts))
        .route(methods::ML_CLASSIFY, post(ml::classify))
        .route(methods::ML_CLASSIFY_BATCH, post(ml::classify_batch))
        .route(methods::ML_TAGS_GENERATE, post(ml::tags_generate))
        .route(methods::ML_PROJECTS_ANALYZE, post(ml::projects_analyze))
        .route(methods::ML_SEARCH, post(ml::search))
        .route(methods::ML_RELATED, post(ml::related))
        .with_state(state)
}
