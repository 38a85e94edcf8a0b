use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use artifactor_core::types::{
    ArtifactId, DeliveryChannel, Notification, NotificationPriority, NotificationType, UserId,
};

use crate::error::Result;
use crate::store;

/// Per-user in-memory cache cap (spec.md §4.5 — "capped at 100 most recent").
const RECENT_CAP: usize = 100;

pub type SubscriberId = u64;
pub type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Builder for a notification prior to persisting it via
/// [`NotificationService::create`].
pub struct NewNotification {
    pub recipient_id: UserId,
    pub artifact_id: Option<ArtifactId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub delivery_channels: Vec<DeliveryChannel>,
    pub related_comment_id: Option<String>,
    pub related_activity_id: Option<String>,
    pub related_user_id: Option<UserId>,
    pub data: Value,
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
}

impl NewNotification {
    pub fn new(recipient_id: UserId, notification_type: NotificationType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient_id,
            artifact_id: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            priority: NotificationPriority::Normal,
            delivery_channels: vec![DeliveryChannel::Websocket],
            related_comment_id: None,
            related_activity_id: None,
            related_user_id: None,
            data: Value::Null,
            scheduled_for: None,
        }
    }

    pub fn with_artifact(mut self, artifact_id: ArtifactId) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_related_user(mut self, user_id: UserId) -> Self {
        self.related_user_id = Some(user_id);
        self
    }

    pub fn with_related_comment(mut self, comment_id: impl Into<String>) -> Self {
        self.related_comment_id = Some(comment_id.into());
        self
    }
}

/// Creates, stores, delivers and queries user notifications (spec.md §4.5).
pub struct NotificationService {
    durable: Arc<Mutex<Connection>>,
    recent: Mutex<HashMap<UserId, VecDeque<Notification>>>,
    subscribers: Mutex<HashMap<UserId, HashMap<SubscriberId, Callback>>>,
    next_subscriber_id: AtomicU64,
    queue_tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationService {
    pub fn new(durable: Arc<Mutex<Connection>>) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Notification>)> {
        store::init_db(&durable.lock().unwrap())?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Ok((
            Arc::new(Self {
                durable,
                recent: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber_id: AtomicU64::new(1),
                queue_tx,
            }),
            queue_rx,
        ))
    }

    pub fn create(&self, new: NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::now_v7().to_string(),
            recipient_id: new.recipient_id,
            artifact_id: new.artifact_id,
            notification_type: new.notification_type,
            title: new.title,
            message: new.message,
            priority: new.priority,
            delivery_channels: new.delivery_channels,
            delivered_channels: Vec::new(),
            read: false,
            read_at: None,
            created_at: Utc::now(),
            scheduled_for: new.scheduled_for,
            related_comment_id: new.related_comment_id,
            related_activity_id: new.related_activity_id,
            related_user_id: new.related_user_id,
            data: new.data,
        };

        {
            let conn = self.durable.lock().unwrap();
            store::insert(&conn, &notification)?;
        }

        {
            let mut recent = self.recent.lock().unwrap();
            let list = recent.entry(notification.recipient_id.clone()).or_default();
            list.push_front(notification.clone());
            while list.len() > RECENT_CAP {
                list.pop_back();
            }
        }

        if self.queue_tx.send(notification.clone()).is_err() {
            warn!(id = %notification.id, "delivery queue receiver dropped");
        }

        Ok(notification)
    }

    /// Convenience wrapper: notifies `recipient_id` that `actor_display_name`
    /// mentioned them.
    pub fn mention_notification(
        &self,
        recipient_id: UserId,
        artifact_id: ArtifactId,
        actor_display_name: &str,
        actor_id: UserId,
        comment_id: impl Into<String>,
    ) -> Result<Notification> {
        let new = NewNotification::new(
            recipient_id,
            NotificationType::Mention,
            format!("New mention from {actor_display_name}"),
            format!("{actor_display_name} mentioned you in a comment"),
        )
        .with_artifact(artifact_id)
        .with_priority(NotificationPriority::High)
        .with_related_user(actor_id)
        .with_related_comment(comment_id);
        self.create(new)
    }

    /// Reply notifications to self are suppressed (spec.md §4.5).
    pub fn comment_reply_notification(
        &self,
        recipient_id: UserId,
        artifact_id: ArtifactId,
        actor_display_name: &str,
        actor_id: UserId,
        comment_id: impl Into<String>,
    ) -> Result<Option<Notification>> {
        if recipient_id == actor_id {
            return Ok(None);
        }
        let new = NewNotification::new(
            recipient_id,
            NotificationType::CommentReply,
            format!("{actor_display_name} replied to your comment"),
            format!("{actor_display_name} replied to your comment"),
        )
        .with_artifact(artifact_id)
        .with_related_user(actor_id)
        .with_related_comment(comment_id);
        self.create(new).map(Some)
    }

    /// `recipient_ids` is the already-filtered list for the artifact (the
    /// caller excludes the updating user — see Open Question #1).
    pub fn artifact_update_notification(
        &self,
        recipient_ids: impl IntoIterator<Item = UserId>,
        artifact_id: ArtifactId,
        actor_display_name: &str,
        actor_id: UserId,
    ) -> Result<Vec<Notification>> {
        let mut created = Vec::new();
        for recipient_id in recipient_ids {
            if recipient_id == actor_id {
                continue;
            }
            let new = NewNotification::new(
                recipient_id,
                NotificationType::ArtifactUpdate,
                format!("{actor_display_name} updated the artifact"),
                format!("{actor_display_name} made changes you may want to review"),
            )
            .with_artifact(artifact_id.clone())
            .with_related_user(actor_id.clone());
            created.push(self.create(new)?);
        }
        Ok(created)
    }

    pub fn mark_read(&self, id: &str, user_id: &UserId) -> Result<()> {
        let conn = self.durable.lock().unwrap();
        store::mark_read(&conn, id, user_id, Utc::now())?;
        drop(conn);
        let mut recent = self.recent.lock().unwrap();
        if let Some(list) = recent.get_mut(user_id) {
            for n in list.iter_mut() {
                if n.id == id {
                    n.read = true;
                    n.read_at = Some(Utc::now());
                }
            }
        }
        Ok(())
    }

    pub fn mark_all_read(&self, user_id: &UserId, artifact_id: Option<&ArtifactId>) -> Result<usize> {
        let conn = self.durable.lock().unwrap();
        let count = store::mark_all_read(&conn, user_id, artifact_id.map(|a| a.as_str()), Utc::now())?;
        drop(conn);
        let mut recent = self.recent.lock().unwrap();
        if let Some(list) = recent.get_mut(user_id) {
            for n in list.iter_mut() {
                let matches_artifact = match artifact_id {
                    Some(a) => n.artifact_id.as_ref() == Some(a),
                    None => true,
                };
                if matches_artifact {
                    n.read = true;
                    n.read_at = Some(Utc::now());
                }
            }
        }
        Ok(count)
    }

    pub fn list(
        &self,
        user_id: &UserId,
        limit: usize,
        unread_only: bool,
        artifact_id: Option<&ArtifactId>,
    ) -> Result<Vec<Notification>> {
        let conn = self.durable.lock().unwrap();
        store::list(&conn, user_id, limit, unread_only, artifact_id.map(|a| a.as_str()))
    }

    pub fn counts(&self, user_id: &UserId) -> Result<(u64, u64, u64)> {
        let conn = self.durable.lock().unwrap();
        store::counts(&conn, user_id)
    }

    pub fn subscribe(&self, user_id: UserId, callback: Callback) -> SubscriberId {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().entry(user_id).or_default().insert(id, callback);
        id
    }

    pub fn unsubscribe(&self, user_id: &UserId, subscriber_id: SubscriberId) {
        if let Some(subs) = self.subscribers.lock().unwrap().get_mut(user_id) {
            subs.remove(&subscriber_id);
        }
    }

    /// Single background consumer pulling from the FIFO delivery queue
    /// (spec.md §4.5). Delivery is best-effort and at-most-once per channel.
    /// On shutdown, flushes whatever is still buffered in `queue_rx` rather
    /// than abandoning it (SPEC_FULL.md §5 "flush delivery queue").
    pub fn run_delivery(
        self: Arc<Self>,
        mut queue_rx: mpsc::UnboundedReceiver<Notification>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = queue_rx.recv() => {
                        match received {
                            Some(notification) => self.deliver(notification),
                            None => break,
                        }
                    }
                }
            }

            queue_rx.close();
            while let Some(notification) = queue_rx.recv().await {
                self.deliver(notification);
            }
        })
    }

    fn deliver(&self, notification: Notification) {
        let mut delivered = Vec::new();
        for channel in &notification.delivery_channels {
            match channel {
                DeliveryChannel::Websocket => {
                    let callbacks: Vec<Callback> = self
                        .subscribers
                        .lock()
                        .unwrap()
                        .get(&notification.recipient_id)
                        .map(|m| m.values().cloned().collect())
                        .unwrap_or_default();
                    for cb in callbacks {
                        cb(&notification);
                    }
                    delivered.push(DeliveryChannel::Websocket);
                }
                // Email/push are sketched as future work; no-op delivery is
                // still recorded as delivered since the channel was attempted.
                DeliveryChannel::Email => delivered.push(DeliveryChannel::Email),
                DeliveryChannel::Push => delivered.push(DeliveryChannel::Push),
            }
        }

        let conn = self.durable.lock().unwrap();
        if let Err(err) = store::set_delivered(&conn, &notification.id, &delivered) {
            warn!(id = %notification.id, error = %err, "failed to record delivered channels");
        }
        info!(id = %notification.id, channels = delivered.len(), "notification delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn service() -> (Arc<NotificationService>, mpsc::UnboundedReceiver<Notification>) {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        NotificationService::new(conn).unwrap()
    }

    #[test]
    fn create_caches_in_recent_list() {
        let (svc, _rx) = service();
        let recipient = UserId::new();
        svc.create(NewNotification::new(
            recipient.clone(),
            NotificationType::SystemAlert,
            "t",
            "m",
        ))
        .unwrap();
        let (total, unread, _) = svc.counts(&recipient).unwrap();
        assert_eq!(total, 1);
        assert_eq!(unread, 1);
    }

    #[test]
    fn comment_reply_to_self_is_suppressed() {
        let (svc, _rx) = service();
        let user = UserId::new();
        let result = svc
            .comment_reply_notification(user.clone(), ArtifactId::from("a1"), "Alice", user.clone(), "c1")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn artifact_update_skips_the_updating_user() {
        let (svc, _rx) = service();
        let actor = UserId::new();
        let other = UserId::new();
        let created = svc
            .artifact_update_notification(
                vec![actor.clone(), other.clone()],
                ArtifactId::from("a1"),
                "Alice",
                actor.clone(),
            )
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].recipient_id, other);
    }

    #[test]
    fn mark_read_updates_counts() {
        let (svc, _rx) = service();
        let user = UserId::new();
        let n = svc
            .create(NewNotification::new(user.clone(), NotificationType::SystemAlert, "t", "m"))
            .unwrap();
        svc.mark_read(&n.id, &user).unwrap();
        let (_, unread, _) = svc.counts(&user).unwrap();
        assert_eq!(unread, 0);
    }

    #[tokio::test]
    async fn delivery_pipeline_invokes_subscriber_callback() {
        let (svc, rx) = service();
        let user = UserId::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        svc.subscribe(user.clone(), Arc::new(move |_n| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        }));

        let shutdown = CancellationToken::new();
        let handle = svc.clone().run_delivery(rx, shutdown.clone());

        svc.create(NewNotification::new(user, NotificationType::SystemAlert, "t", "m")).unwrap();

        // give the consumer task a chance to drain the queue
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown.cancel();
        let _ = handle.await;

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn run_delivery_flushes_buffered_notifications_on_shutdown() {
        let (svc, rx) = service();
        let user = UserId::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        svc.subscribe(user.clone(), Arc::new(move |_n| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
        }));

        let shutdown = CancellationToken::new();
        // Cancelled up front so both notifications below land in the
        // channel buffer instead of being drained live by the consumer.
        shutdown.cancel();

        svc.create(NewNotification::new(user.clone(), NotificationType::SystemAlert, "t", "m1"))
            .unwrap();
        svc.create(NewNotification::new(user, NotificationType::SystemAlert, "t", "m2"))
            .unwrap();

        let handle = svc.clone().run_delivery(rx, shutdown);
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
