use rusqlite::{params, Connection, OptionalExtension};

use artifactor_core::types::{
    DeliveryChannel, Notification, NotificationPriority, NotificationType, UserId,
};

use crate::error::{NotificationError, Result};

/// Initialise the notifications table and its indices. Safe to call on every
/// startup — `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notifications (
            id                   TEXT PRIMARY KEY,
            recipient_id         TEXT NOT NULL,
            artifact_id          TEXT,
            notification_type   TEXT NOT NULL,
            title                TEXT NOT NULL,
            message              TEXT NOT NULL,
            priority             TEXT NOT NULL,
            delivery_channels    TEXT NOT NULL DEFAULT '[]',
            delivered_channels   TEXT NOT NULL DEFAULT '[]',
            read                 INTEGER NOT NULL DEFAULT 0,
            read_at              TEXT,
            created_at           TEXT NOT NULL,
            scheduled_for        TEXT,
            related_comment_id   TEXT,
            related_activity_id  TEXT,
            related_user_id      TEXT,
            data                 TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at DESC);",
    )?;
    Ok(())
}

fn priority_str(p: &NotificationPriority) -> &'static str {
    match p {
        NotificationPriority::Low => "low",
        NotificationPriority::Normal => "normal",
        NotificationPriority::High => "high",
        NotificationPriority::Urgent => "urgent",
    }
}

fn priority_from_str(s: &str) -> NotificationPriority {
    match s {
        "low" => NotificationPriority::Low,
        "high" => NotificationPriority::High,
        "urgent" => NotificationPriority::Urgent,
        _ => NotificationPriority::Normal,
    }
}

fn type_str(t: &NotificationType) -> &'static str {
    match t {
        NotificationType::Mention => "mention",
        NotificationType::CommentReply => "comment_reply",
        NotificationType::ArtifactUpdate => "artifact_update",
        NotificationType::UserJoin => "user_join",
        NotificationType::UserLeave => "user_leave",
        NotificationType::WorkspaceInvite => "workspace_invite",
        NotificationType::DeadlineReminder => "deadline_reminder",
        NotificationType::SystemAlert => "system_alert",
    }
}

fn type_from_str(s: &str) -> NotificationType {
    match s {
        "comment_reply" => NotificationType::CommentReply,
        "artifact_update" => NotificationType::ArtifactUpdate,
        "user_join" => NotificationType::UserJoin,
        "user_leave" => NotificationType::UserLeave,
        "workspace_invite" => NotificationType::WorkspaceInvite,
        "deadline_reminder" => NotificationType::DeadlineReminder,
        "system_alert" => NotificationType::SystemAlert,
        _ => NotificationType::Mention,
    }
}

fn channels_to_json(channels: &[DeliveryChannel]) -> String {
    let names: Vec<&str> = channels
        .iter()
        .map(|c| match c {
            DeliveryChannel::Websocket => "websocket",
            DeliveryChannel::Email => "email",
            DeliveryChannel::Push => "push",
        })
        .collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
}

fn channels_from_json(s: &str) -> Vec<DeliveryChannel> {
    let names: Vec<String> = serde_json::from_str(s).unwrap_or_default();
    names
        .into_iter()
        .map(|n| match n.as_str() {
            "email" => DeliveryChannel::Email,
            "push" => DeliveryChannel::Push,
            _ => DeliveryChannel::Websocket,
        })
        .collect()
}

pub fn insert(conn: &Connection, n: &Notification) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (
            id, recipient_id, artifact_id, notification_type, title, message, priority,
            delivery_channels, delivered_channels, read, read_at, created_at, scheduled_for,
            related_comment_id, related_activity_id, related_user_id, data
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        params![
            n.id,
            n.recipient_id.to_string(),
            n.artifact_id.as_ref().map(|a| a.to_string()),
            type_str(&n.notification_type),
            n.title,
            n.message,
            priority_str(&n.priority),
            channels_to_json(&n.delivery_channels),
            channels_to_json(&n.delivered_channels),
            n.read as i32,
            n.read_at.map(|t| t.to_rfc3339()),
            n.created_at.to_rfc3339(),
            n.scheduled_for.map(|t| t.to_rfc3339()),
            n.related_comment_id,
            n.related_activity_id,
            n.related_user_id.as_ref().map(|u| u.to_string()),
            n.data.to_string(),
        ],
    )?;
    Ok(())
}

pub fn set_delivered(conn: &Connection, id: &str, delivered: &[DeliveryChannel]) -> Result<()> {
    conn.execute(
        "UPDATE notifications SET delivered_channels = ?2 WHERE id = ?1",
        params![id, channels_to_json(delivered)],
    )?;
    Ok(())
}

pub fn mark_read(conn: &Connection, id: &str, user_id: &UserId, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
    let rows = conn.execute(
        "UPDATE notifications SET read = 1, read_at = ?3
         WHERE id = ?1 AND recipient_id = ?2",
        params![id, user_id.to_string(), now.to_rfc3339()],
    )?;
    if rows == 0 {
        return Err(NotificationError::NotFound { id: id.to_string() });
    }
    Ok(())
}

pub fn mark_all_read(
    conn: &Connection,
    user_id: &UserId,
    artifact_id: Option<&str>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<usize> {
    let rows = match artifact_id {
        Some(artifact_id) => conn.execute(
            "UPDATE notifications SET read = 1, read_at = ?3
             WHERE recipient_id = ?1 AND artifact_id = ?2 AND read = 0",
            params![user_id.to_string(), artifact_id, now.to_rfc3339()],
        )?,
        None => conn.execute(
            "UPDATE notifications SET read = 1, read_at = ?2
             WHERE recipient_id = ?1 AND read = 0",
            params![user_id.to_string(), now.to_rfc3339()],
        )?,
    };
    Ok(rows)
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let channels_raw: String = row.get(7)?;
    let delivered_raw: String = row.get(8)?;
    let data_raw: String = row.get(16)?;
    Ok(Notification {
        id: row.get(0)?,
        recipient_id: UserId::from(row.get::<_, String>(1)?),
        artifact_id: row.get::<_, Option<String>>(2)?.map(artifactor_core::types::ArtifactId::from),
        notification_type: type_from_str(&row.get::<_, String>(3)?),
        title: row.get(4)?,
        message: row.get(5)?,
        priority: priority_from_str(&row.get::<_, String>(6)?),
        delivery_channels: channels_from_json(&channels_raw),
        delivered_channels: channels_from_json(&delivered_raw),
        read: row.get::<_, i32>(9)? != 0,
        read_at: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&chrono::Utc)),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(11)?)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        scheduled_for: row
            .get::<_, Option<String>>(12)?
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&chrono::Utc)),
        related_comment_id: row.get(13)?,
        related_activity_id: row.get(14)?,
        related_user_id: row.get::<_, Option<String>>(15)?.map(UserId::from),
        data: serde_json::from_str(&data_raw).unwrap_or(serde_json::Value::Null),
    })
}

pub fn list(
    conn: &Connection,
    user_id: &UserId,
    limit: usize,
    unread_only: bool,
    artifact_id: Option<&str>,
) -> Result<Vec<Notification>> {
    let sql = match (unread_only, artifact_id) {
        (true, Some(_)) => {
            "SELECT id, recipient_id, artifact_id, notification_type, title, message, priority,
                    delivery_channels, delivered_channels, read, read_at, created_at,
                    scheduled_for, related_comment_id, related_activity_id, related_user_id, data
             FROM notifications WHERE recipient_id = ?1 AND artifact_id = ?2 AND read = 0
             ORDER BY created_at DESC LIMIT ?3"
        }
        (true, None) => {
            "SELECT id, recipient_id, artifact_id, notification_type, title, message, priority,
                    delivery_channels, delivered_channels, read, read_at, created_at,
                    scheduled_for, related_comment_id, related_activity_id, related_user_id, data
             FROM notifications WHERE recipient_id = ?1 AND read = 0
             ORDER BY created_at DESC LIMIT ?2"
        }
        (false, Some(_)) => {
            "SELECT id, recipient_id, artifact_id, notification_type, title, message, priority,
                    delivery_channels, delivered_channels, read, read_at, created_at,
                    scheduled_for, related_comment_id, related_activity_id, related_user_id, data
             FROM notifications WHERE recipient_id = ?1 AND artifact_id = ?2
             ORDER BY created_at DESC LIMIT ?3"
        }
        (false, None) => {
            "SELECT id, recipient_id, artifact_id, notification_type, title, message, priority,
                    delivery_channels, delivered_channels, read, read_at, created_at,
                    scheduled_for, related_comment_id, related_activity_id, related_user_id, data
             FROM notifications WHERE recipient_id = ?1
             ORDER BY created_at DESC LIMIT ?2"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = if let Some(artifact_id) = artifact_id {
        stmt.query_map(params![user_id.to_string(), artifact_id, limit as i64], row_to_notification)?
    } else {
        stmt.query_map(params![user_id.to_string(), limit as i64], row_to_notification)?
    };
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn counts(conn: &Connection, user_id: &UserId) -> Result<(u64, u64, u64)> {
    let total: u64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    let unread: u64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    let urgent: u64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0
         AND priority IN ('high', 'urgent')",
        params![user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok((total, unread, urgent))
}

#[allow(dead_code)]
pub fn get(conn: &Connection, id: &str) -> Result<Option<Notification>> {
    Ok(conn
        .query_row(
            "SELECT id, recipient_id, artifact_id, notification_type, title, message, priority,
                    delivery_channels, delivered_channels, read, read_at, created_at,
                    scheduled_for, related_comment_id, related_activity_id, related_user_id, data
             FROM notifications WHERE id = ?1",
            params![id],
            row_to_notification,
        )
        .optional()?)
}
