//! WebSocket upgrade route and per-connection duplex loop (SPEC_FULL.md §6).
//!
//! Authentication happens on the upgrade request itself: the bearer token
//! travels as a query parameter (`GET /ws?artifact_id=...&token=...`) rather
//! than an in-band handshake frame, since there is no pre-auth message the
//! protocol needs to exchange first.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use artifactor_core::types::{ArtifactId, ConnId, UserId};
use artifactor_protocol::handshake::{AuthenticatedUser, ConnectParams};
use artifactor_protocol::{methods, ClientMessage, ServerMessage};

use crate::app::HubState;
use crate::auth::verify_token;
use crate::error::Result;

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route(methods::WS_CONNECT, get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse> {
    let user = verify_token(&state.config.auth, &params.token)?;
    let artifact_id = ArtifactId::from(params.artifact_id.clone());
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user, artifact_id)))
}

async fn handle_connection(socket: WebSocket, state: Arc<HubState>, user: AuthenticatedUser, artifact_id: ArtifactId) {
    let conn_id = ConnId::new();
    let user_id = UserId::from(user.user_id.clone());
    info!(conn_id = %conn_id.as_str(), user_id = %user_id.as_str(), artifact_id = %artifact_id.as_str(), "ws connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut outbox) = mpsc::unbounded_channel::<ServerMessage>();

    let snapshot = match state
        .hub
        .attach(
            conn_id.clone(),
            user_id.clone(),
            artifact_id.clone(),
            user.display_name.clone(),
            user.avatar_url.clone(),
            tx,
        )
        .await
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(conn_id = %conn_id.as_str(), error = %e, "failed to attach ws connection to room");
            let _ = send(&mut sink, &ServerMessage::error(e.code(), &e.to_string())).await;
            return;
        }
    };

    let hello = ServerMessage::room_state(serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null));
    if send(&mut sink, &hello).await.is_err() {
        let _ = state.hub.detach(&conn_id, &user_id, &artifact_id).await;
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if let Err(e) = state
                                    .hub
                                    .deliver(&conn_id, &user_id, &artifact_id, &user.display_name, msg)
                                    .await
                                {
                                    if send(&mut sink, &e.ws_frame()).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(conn_id = %conn_id.as_str(), error = %e, "malformed ws frame, ignoring");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id.as_str(), error = %e, "ws read error");
                        break;
                    }
                }
            }
            outgoing = outbox.recv() => {
                match outgoing {
                    Some(msg) => {
                        if send(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Err(e) = state.hub.detach(&conn_id, &user_id, &artifact_id).await {
        warn!(conn_id = %conn_id.as_str(), error = %e, "failed to detach ws connection");
    }
    info!(conn_id = %conn_id.as_str(), "ws connection closed");
}

async fn send(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> std::result::Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(text.into())).await
}
