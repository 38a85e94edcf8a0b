//! In-memory rooms and the collaboration hub registry (SPEC_FULL.md §4.1).
//!
//! A room exists exactly while at least one client is attached to it; the
//! last `Detach` for an artifact tears the room down. Two distinct rooms
//! never contend on the same lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use artifactor_core::types::{
    Activity, ArtifactId, Comment, ConnId, CursorPosition, PresenceStatus, UserId,
};
use artifactor_notifications::NotificationService;
use artifactor_presence::PresenceService;
use artifactor_protocol::{ClientMessage, MessageType, ServerMessage};

use crate::error::{HubError, Result};
use crate::hub::comments;

/// One connected client bound to a room.
struct Client {
    user_id: UserId,
    display_name: String,
    avatar_url: Option<String>,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
struct Room {
    clients: HashMap<ConnId, Client>,
    cursors: HashMap<UserId, Value>,
    selections: HashMap<UserId, Value>,
    typing: HashSet<UserId>,
}

/// A user's entry in a room snapshot, as sent in `room_state` and returned by
/// `active_users`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveUser {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub cursor: Option<Value>,
    pub selection: Option<Value>,
}

fn snapshot_of(room: &Room) -> Vec<ActiveUser> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for client in room.clients.values() {
        if !seen.insert(client.user_id.clone()) {
            continue;
        }
        out.push(ActiveUser {
            user_id: client.user_id.to_string(),
            display_name: client.display_name.clone(),
            avatar_url: client.avatar_url.clone(),
            cursor: room.cursors.get(&client.user_id).cloned(),
            selection: room.selections.get(&client.user_id).cloned(),
        });
    }
    out
}

/// Owns every room plus the durable comment/activity store, and coordinates
/// with presence and notifications for the side effects each inbound
/// message type triggers.
pub struct CollaborationHub {
    rooms: DashMap<ArtifactId, Mutex<Room>>,
    durable: Arc<Mutex<Connection>>,
    presence: Arc<PresenceService>,
    notifications: Arc<NotificationService>,
}

impl CollaborationHub {
    pub fn new(
        durable: Arc<Mutex<Connection>>,
        presence: Arc<PresenceService>,
        notifications: Arc<NotificationService>,
    ) -> Result<Self> {
        comments::init_db(&durable.lock().unwrap())?;
        Ok(Self {
            rooms: DashMap::new(),
            durable,
            presence,
            notifications,
        })
    }

    /// Registers a new client in the artifact's room, creating the room if
    /// this is its first client. Broadcasts `user_join` to the rest of the
    /// room and returns the `room_state` snapshot for the joiner.
    #[allow(clippy::too_many_arguments)]
    pub async fn attach(
        &self,
        conn_id: ConnId,
        user_id: UserId,
        artifact_id: ArtifactId,
        display_name: String,
        avatar_url: Option<String>,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Vec<ActiveUser>> {
        let client = Client {
            user_id: user_id.clone(),
            display_name: display_name.clone(),
            avatar_url: avatar_url.clone(),
            tx,
        };

        let snapshot = {
            let room_ref = self.rooms.entry(artifact_id.clone()).or_default();
            let mut room = room_ref.lock().unwrap();
            room.clients.insert(conn_id.clone(), client);
            snapshot_of(&room)
        };

        self.presence
            .update_presence(
                user_id.clone(),
                artifact_id.clone(),
                PresenceStatus::Active,
                None,
                None,
                None,
                conn_id.clone(),
                None,
            )
            .await?;

        self.broadcast_except(
            &artifact_id,
            &conn_id,
            ServerMessage::new(
                MessageType::UserJoin,
                Some(user_id.to_string()),
                serde_json::json!({ "display_name": display_name, "avatar_url": avatar_url }),
            ),
        );

        Ok(snapshot)
    }

    /// Removes a client from its room, destroying the room if it was the
    /// last occupant, and marks the user's presence offline.
    pub async fn detach(&self, conn_id: &ConnId, user_id: &UserId, artifact_id: &ArtifactId) -> Result<()> {
        let room_empty = match self.rooms.get(artifact_id) {
            Some(room_ref) => {
                let mut room = room_ref.lock().unwrap();
                room.clients.remove(conn_id);
                let still_present = room.clients.values().any(|c| &c.user_id == user_id);
                if !still_present {
                    room.cursors.remove(user_id);
                    room.selections.remove(user_id);
                    room.typing.remove(user_id);
                }
                room.clients.is_empty()
            }
            None => true,
        };

        if room_empty {
            self.rooms.remove(artifact_id);
        } else {
            self.broadcast(
                artifact_id,
                ServerMessage::new(MessageType::UserLeave, Some(user_id.to_string()), Value::Null),
            );
        }

        self.presence.remove_presence(user_id, artifact_id).await?;
        Ok(())
    }

    /// The set of distinct users currently attached to an artifact's room.
    pub fn active_users(&self, artifact_id: &ArtifactId) -> Vec<ActiveUser> {
        match self.rooms.get(artifact_id) {
            Some(room_ref) => snapshot_of(&room_ref.lock().unwrap()),
            None => Vec::new(),
        }
    }

    /// Fans a notification out to every live connection belonging to
    /// `user_id`, across whichever rooms they currently occupy.
    pub fn push_notification_to_user(&self, user_id: &UserId, payload: Value) {
        for room_ref in self.rooms.iter() {
            let room = room_ref.lock().unwrap();
            for client in room.clients.values().filter(|c| &c.user_id == user_id) {
                let _ = client.tx.send(ServerMessage::new(
                    MessageType::Notification,
                    Some(user_id.to_string()),
                    payload.clone(),
                ));
            }
        }
    }

    /// Applies the effects table for one inbound client message (SPEC_FULL.md
    /// §4.1): ephemeral types mutate room state and fan out best-effort,
    /// durable types persist first and only broadcast once the write
    /// succeeds.
    pub async fn deliver(
        &self,
        conn_id: &ConnId,
        user_id: &UserId,
        artifact_id: &ArtifactId,
        display_name: &str,
        msg: ClientMessage,
    ) -> Result<()> {
        match msg.message_type {
            MessageType::CursorMove => {
                if let Ok(cursor) = serde_json::from_value::<CursorPosition>(msg.data.clone()) {
                    if let Err(err) = self.presence.update_cursor(user_id, artifact_id, cursor).await {
                        warn!(%user_id, error = %err, "presence cursor update failed");
                    }
                }
                self.with_room(artifact_id, |room| {
                    room.cursors.insert(user_id.clone(), msg.data.clone());
                });
                self.broadcast_except(
                    artifact_id,
                    conn_id,
                    ServerMessage::new(MessageType::CursorMove, Some(user_id.to_string()), msg.data),
                );
            }
            MessageType::SelectionChange => {
                self.with_room(artifact_id, |room| {
                    room.selections.insert(user_id.clone(), msg.data.clone());
                });
                self.broadcast_except(
                    artifact_id,
                    conn_id,
                    ServerMessage::new(MessageType::SelectionChange, Some(user_id.to_string()), msg.data),
                );
            }
            MessageType::TypingStart => {
                self.with_room(artifact_id, |room| {
                    room.typing.insert(user_id.clone());
                });
                self.broadcast_except(
                    artifact_id,
                    conn_id,
                    ServerMessage::new(MessageType::TypingStart, Some(user_id.to_string()), Value::Null),
                );
            }
            MessageType::TypingStop => {
                self.with_room(artifact_id, |room| {
                    room.typing.remove(user_id);
                });
                self.broadcast_except(
                    artifact_id,
                    conn_id,
                    ServerMessage::new(MessageType::TypingStop, Some(user_id.to_string()), Value::Null),
                );
            }
            MessageType::ArtifactEdit => {
                self.append_activity(
                    artifact_id,
                    user_id,
                    "artifact_edit",
                    "edit",
                    "artifact edited",
                    msg.data.clone(),
                    None,
                )?;
                self.broadcast_except(
                    artifact_id,
                    conn_id,
                    ServerMessage::new(MessageType::ArtifactEdit, Some(user_id.to_string()), msg.data),
                );
                self.notify_artifact_update(artifact_id, user_id, display_name);
            }
            MessageType::CommentAdd => {
                self.submit_comment(artifact_id, user_id, display_name, msg.data).await?;
            }
            MessageType::CommentUpdate => {
                self.apply_comment_update(artifact_id, user_id, msg.data).await?;
            }
            MessageType::CommentDelete => {
                self.apply_comment_delete(artifact_id, user_id, msg.data).await?;
            }
            MessageType::UserJoin
            | MessageType::UserLeave
            | MessageType::RoomState
            | MessageType::Notification
            | MessageType::Error => {
                return Err(HubError::validation(format!(
                    "{:?} is a server-only message type",
                    msg.message_type
                )));
            }
        }
        Ok(())
    }

    // -- comments -----------------------------------------------------

    pub fn list_comments(&self, artifact_id: &ArtifactId) -> Result<Vec<Comment>> {
        let conn = self.durable.lock().unwrap();
        comments::list_comments(&conn, artifact_id.as_str())
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        let conn = self.durable.lock().unwrap();
        comments::get_comment(&conn, id)
    }

    pub fn list_activity(
        &self,
        artifact_id: &ArtifactId,
        limit: usize,
        offset: usize,
        types: &[String],
    ) -> Result<Vec<Activity>> {
        let conn = self.durable.lock().unwrap();
        comments::list_activity(&conn, artifact_id.as_str(), limit, offset, types)
    }

    /// Persists a new comment, records the activity, broadcasts it to every
    /// client in the room (including the author, so it learns the
    /// server-assigned id), and raises mention/reply notifications.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_comment(
        &self,
        artifact_id: &ArtifactId,
        user_id: &UserId,
        display_name: &str,
        data: Value,
    ) -> Result<Comment> {
        let content = data
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(HubError::validation("comment content must not be empty"));
        }
        let mentions: Vec<String> = data
            .get("mentions")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let parent_id = data.get("parent_id").and_then(Value::as_str).map(str::to_string);
        let position_data = data.get("position_data").cloned();
        let content_type = data
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_string();

        let parent = match &parent_id {
            Some(pid) => {
                let parent = self.get_comment(pid)?.ok_or_else(|| HubError::not_found("comment", pid.clone()))?;
                if &parent.artifact_id != artifact_id {
                    return Err(HubError::validation("parent comment belongs to a different artifact"));
                }
                Some(parent)
            }
            None => None,
        };

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::now_v7().to_string(),
            artifact_id: artifact_id.clone(),
            author_id: user_id.clone(),
            parent_id,
            content,
            content_type,
            position_data,
            created_at: now,
            updated_at: now,
            edited: false,
            resolved: false,
            resolved_by: None,
            reactions: HashMap::new(),
            mentions: mentions.clone(),
        };

        {
            let conn = self.durable.lock().unwrap();
            comments::insert_comment(&conn, &comment)?;
        }
        self.append_activity(
            artifact_id,
            user_id,
            "comment_add",
            "comment",
            "comment added",
            serde_json::json!({ "comment_id": comment.id }),
            Some(comment.id.clone()),
        )?;

        self.broadcast(
            artifact_id,
            ServerMessage::new(
                MessageType::CommentAdd,
                Some(user_id.to_string()),
                serde_json::to_value(&comment).unwrap_or(Value::Null),
            ),
        );

        for mention in &mentions {
            let recipient = UserId::from(mention.trim_start_matches('@').to_string());
            if recipient == *user_id {
                continue;
            }
            match self.notifications.mention_notification(
                recipient.clone(),
                artifact_id.clone(),
                display_name,
                user_id.clone(),
                comment.id.clone(),
            ) {
                Ok(notification) => {
                    self.push_notification_to_user(
                        &recipient,
                        serde_json::to_value(&notification).unwrap_or(Value::Null),
                    );
                }
                Err(err) => warn!(%recipient, error = %err, "mention notification failed"),
            }
        }

        if let Some(parent) = parent {
            match self.notifications.comment_reply_notification(
                parent.author_id.clone(),
                artifact_id.clone(),
                display_name,
                user_id.clone(),
                comment.id.clone(),
            ) {
                Ok(Some(notification)) => {
                    self.push_notification_to_user(
                        &parent.author_id,
                        serde_json::to_value(&notification).unwrap_or(Value::Null),
                    );
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "comment reply notification failed"),
            }
        }

        Ok(comment)
    }

    async fn apply_comment_update(&self, artifact_id: &ArtifactId, user_id: &UserId, data: Value) -> Result<()> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::validation("missing comment id"))?
            .to_string();
        let content = data
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::validation("missing content"))?
            .to_string();
        let mentions: Vec<String> = data
            .get("mentions")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        self.edit_comment(artifact_id, user_id, &id, content, mentions).await?;
        Ok(())
    }

    /// Edits a comment's content. Only the original author may edit.
    pub async fn edit_comment(
        &self,
        artifact_id: &ArtifactId,
        user_id: &UserId,
        comment_id: &str,
        content: String,
        mentions: Vec<String>,
    ) -> Result<Comment> {
        let existing = self
            .get_comment(comment_id)?
            .ok_or_else(|| HubError::not_found("comment", comment_id))?;
        if &existing.artifact_id != artifact_id {
            return Err(HubError::not_found("comment", comment_id));
        }
        if &existing.author_id != user_id {
            return Err(HubError::forbidden("only the comment author may edit this comment"));
        }

        let now = Utc::now();
        {
            let conn = self.durable.lock().unwrap();
            comments::update_comment(&conn, comment_id, &content, &mentions, now)?;
        }
        self.append_activity(
            artifact_id,
            user_id,
            "comment_update",
            "comment",
            "comment edited",
            serde_json::json!({ "comment_id": comment_id }),
            Some(comment_id.to_string()),
        )?;

        let updated = Comment {
            content,
            mentions,
            edited: true,
            updated_at: now,
            ..existing
        };
        self.broadcast(
            artifact_id,
            ServerMessage::new(
                MessageType::CommentUpdate,
                Some(user_id.to_string()),
                serde_json::to_value(&updated).unwrap_or(Value::Null),
            ),
        );
        Ok(updated)
    }

    async fn apply_comment_delete(&self, artifact_id: &ArtifactId, user_id: &UserId, data: Value) -> Result<()> {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::validation("missing comment id"))?
            .to_string();
        self.remove_comment(artifact_id, user_id, &id).await
    }

    /// Deletes a comment outright. Only the original author may delete.
    pub async fn remove_comment(&self, artifact_id: &ArtifactId, user_id: &UserId, comment_id: &str) -> Result<()> {
        let existing = self
            .get_comment(comment_id)?
            .ok_or_else(|| HubError::not_found("comment", comment_id))?;
        if &existing.artifact_id != artifact_id {
            return Err(HubError::not_found("comment", comment_id));
        }
        if &existing.author_id != user_id {
            return Err(HubError::forbidden("only the comment author may delete this comment"));
        }

        {
            let conn = self.durable.lock().unwrap();
            comments::delete_comment(&conn, comment_id)?;
        }
        self.append_activity(
            artifact_id,
            user_id,
            "comment_delete",
            "comment",
            "comment deleted",
            serde_json::json!({ "comment_id": comment_id }),
            Some(comment_id.to_string()),
        )?;

        self.broadcast(
            artifact_id,
            ServerMessage::new(
                MessageType::CommentDelete,
                Some(user_id.to_string()),
                serde_json::json!({ "id": comment_id }),
            ),
        );
        Ok(())
    }

    fn append_activity(
        &self,
        artifact_id: &ArtifactId,
        user_id: &UserId,
        activity_type: &str,
        category: &str,
        description: &str,
        data: Value,
        related_comment_id: Option<String>,
    ) -> Result<()> {
        let activity = Activity {
            id: Uuid::now_v7().to_string(),
            artifact_id: artifact_id.clone(),
            user_id: user_id.clone(),
            activity_type: activity_type.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            data,
            timestamp: Utc::now(),
            is_public: true,
            related_comment_id,
            related_user_id: None,
        };
        let conn = self.durable.lock().unwrap();
        comments::insert_activity(&conn, &activity)
    }

    /// Recipients are every other user currently attached to the room (the
    /// Open Question #1 decision — see DESIGN.md).
    fn notify_artifact_update(&self, artifact_id: &ArtifactId, user_id: &UserId, display_name: &str) {
        let recipients: Vec<UserId> = self
            .active_users(artifact_id)
            .into_iter()
            .map(|u| UserId::from(u.user_id))
            .filter(|u| u != user_id)
            .collect();
        if recipients.is_empty() {
            return;
        }
        match self.notifications.artifact_update_notification(
            recipients,
            artifact_id.clone(),
            display_name,
            user_id.clone(),
        ) {
            Ok(created) => {
                for notification in created {
                    let recipient = notification.recipient_id.clone();
                    self.push_notification_to_user(
                        &recipient,
                        serde_json::to_value(&notification).unwrap_or(Value::Null),
                    );
                }
            }
            Err(err) => warn!(error = %err, "artifact update notification failed"),
        }
    }

    // -- internals ------------------------------------------------------

    fn with_room(&self, artifact_id: &ArtifactId, f: impl FnOnce(&mut Room)) {
        if let Some(room_ref) = self.rooms.get(artifact_id) {
            let mut room = room_ref.lock().unwrap();
            f(&mut room);
        }
    }

    fn broadcast(&self, artifact_id: &ArtifactId, msg: ServerMessage) {
        self.broadcast_filtered(artifact_id, msg, |_| true);
    }

    fn broadcast_except(&self, artifact_id: &ArtifactId, exclude: &ConnId, msg: ServerMessage) {
        self.broadcast_filtered(artifact_id, msg, move |c| c != exclude);
    }

    /// Best-effort fanout. A client whose send channel is closed (its
    /// connection task has already exited) is dropped from the room; its
    /// presence record is reclaimed by the periodic cleanup sweep rather than
    /// synchronously, since that requires the async/locking dance this
    /// synchronous loop deliberately avoids.
    fn broadcast_filtered(&self, artifact_id: &ArtifactId, msg: ServerMessage, pred: impl Fn(&ConnId) -> bool) {
        let Some(room_ref) = self.rooms.get(artifact_id) else {
            return;
        };
        let mut room = room_ref.lock().unwrap();
        let mut dead = Vec::new();
        for (conn_id, client) in room.clients.iter() {
            if !pred(conn_id) {
                continue;
            }
            if client.tx.send(msg.clone()).is_err() {
                dead.push((conn_id.clone(), client.user_id.clone()));
            }
        }
        for (conn_id, user_id) in dead {
            room.clients.remove(&conn_id);
            if !room.clients.values().any(|c| c.user_id == user_id) {
                room.cursors.remove(&user_id);
                room.selections.remove(&user_id);
                room.typing.remove(&user_id);
            }
            warn!(%conn_id, "dropped client with closed send channel during broadcast");
        }
    }
}
