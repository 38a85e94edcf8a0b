//! Durable storage for Comments and Activities (SPEC_FULL.md §3), following
//! the row-mapping idiom established in `artifactor-notifications::store`.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use artifactor_core::types::{Activity, ArtifactId, Comment, UserId};

use crate::error::{HubError, Result};

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS comments (
            id            TEXT PRIMARY KEY,
            artifact_id   TEXT NOT NULL,
            author_id     TEXT NOT NULL,
            parent_id     TEXT,
            content       TEXT NOT NULL,
            content_type  TEXT NOT NULL,
            position_data TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            edited        INTEGER NOT NULL DEFAULT 0,
            resolved      INTEGER NOT NULL DEFAULT 0,
            resolved_by   TEXT,
            reactions     TEXT NOT NULL DEFAULT '{}',
            mentions      TEXT NOT NULL DEFAULT '[]'
        );
        CREATE INDEX IF NOT EXISTS idx_comments_artifact ON comments(artifact_id, created_at);

        CREATE TABLE IF NOT EXISTS activities (
            id                  TEXT PRIMARY KEY,
            artifact_id         TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            activity_type       TEXT NOT NULL,
            category            TEXT NOT NULL,
            description         TEXT NOT NULL,
            data                TEXT NOT NULL DEFAULT '{}',
            timestamp           TEXT NOT NULL,
            is_public           INTEGER NOT NULL DEFAULT 1,
            related_comment_id  TEXT,
            related_user_id     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_activities_artifact ON activities(artifact_id, timestamp DESC);",
    )
    .map_err(|e| HubError::Core(artifactor_core::ArtifactorError::Storage(e.to_string())))?;
    Ok(())
}

fn storage_err(e: rusqlite::Error) -> HubError {
    HubError::Core(artifactor_core::ArtifactorError::Storage(e.to_string()))
}

pub fn insert_comment(conn: &Connection, c: &Comment) -> Result<()> {
    conn.execute(
        "INSERT INTO comments (
            id, artifact_id, author_id, parent_id, content, content_type, position_data,
            created_at, updated_at, edited, resolved, resolved_by, reactions, mentions
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            c.id,
            c.artifact_id.as_str(),
            c.author_id.to_string(),
            c.parent_id,
            c.content,
            c.content_type,
            c.position_data.as_ref().map(|v| v.to_string()),
            c.created_at.to_rfc3339(),
            c.updated_at.to_rfc3339(),
            c.edited as i32,
            c.resolved as i32,
            c.resolved_by.as_ref().map(|u| u.to_string()),
            serde_json::to_string(&c.reactions).unwrap_or_else(|_| "{}".to_string()),
            serde_json::to_string(&c.mentions).unwrap_or_else(|_| "[]".to_string()),
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let reactions_raw: String = row.get(12)?;
    let mentions_raw: String = row.get(13)?;
    Ok(Comment {
        id: row.get(0)?,
        artifact_id: ArtifactId::from(row.get::<_, String>(1)?),
        author_id: UserId::from(row.get::<_, String>(2)?),
        parent_id: row.get(3)?,
        content: row.get(4)?,
        content_type: row.get(5)?,
        position_data: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        edited: row.get::<_, i32>(9)? != 0,
        resolved: row.get::<_, i32>(10)? != 0,
        resolved_by: row.get::<_, Option<String>>(11)?.map(UserId::from),
        reactions: serde_json::from_str::<HashMap<String, HashSet<String>>>(&reactions_raw)
            .unwrap_or_default(),
        mentions: serde_json::from_str(&mentions_raw).unwrap_or_default(),
    })
}

const COMMENT_COLUMNS: &str = "id, artifact_id, author_id, parent_id, content, content_type,
    position_data, created_at, updated_at, edited, resolved, resolved_by, reactions, mentions";

pub fn get_comment(conn: &Connection, id: &str) -> Result<Option<Comment>> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
        params![id],
        row_to_comment,
    )
    .optional()
    .map_err(storage_err)
}

pub fn list_comments(conn: &Connection, artifact_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE artifact_id = ?1 ORDER BY created_at ASC"
        ))
        .map_err(storage_err)?;
    let rows = stmt
        .query_map(params![artifact_id], row_to_comment)
        .map_err(storage_err)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Update content and mentions, bump `updated_at`/`edited`. Caller has already
/// verified the editor is the author.
pub fn update_comment(
    conn: &Connection,
    id: &str,
    content: &str,
    mentions: &[String],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE comments SET content = ?2, mentions = ?3, edited = 1, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                content,
                serde_json::to_string(mentions).unwrap_or_else(|_| "[]".to_string()),
                now.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
    if rows == 0 {
        return Err(HubError::not_found("comment", id));
    }
    Ok(())
}

pub fn delete_comment(conn: &Connection, id: &str) -> Result<()> {
    let rows = conn
        .execute("DELETE FROM comments WHERE id = ?1", params![id])
        .map_err(storage_err)?;
    if rows == 0 {
        return Err(HubError::not_found("comment", id));
    }
    Ok(())
}

pub fn insert_activity(conn: &Connection, a: &Activity) -> Result<()> {
    conn.execute(
        "INSERT INTO activities (
            id, artifact_id, user_id, activity_type, category, description, data,
            timestamp, is_public, related_comment_id, related_user_id
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            a.id,
            a.artifact_id.as_str(),
            a.user_id.to_string(),
            a.activity_type,
            a.category,
            a.description,
            a.data.to_string(),
            a.timestamp.to_rfc3339(),
            a.is_public as i32,
            a.related_comment_id,
            a.related_user_id.as_ref().map(|u| u.to_string()),
        ],
    )
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    let data_raw: String = row.get(6)?;
    Ok(Activity {
        id: row.get(0)?,
        artifact_id: ArtifactId::from(row.get::<_, String>(1)?),
        user_id: UserId::from(row.get::<_, String>(2)?),
        activity_type: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        data: serde_json::from_str(&data_raw).unwrap_or(Value::Null),
        timestamp: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        is_public: row.get::<_, i32>(8)? != 0,
        related_comment_id: row.get(9)?,
        related_user_id: row.get::<_, Option<String>>(10)?.map(UserId::from),
    })
}

pub fn list_activity(
    conn: &Connection,
    artifact_id: &str,
    limit: usize,
    offset: usize,
    types: &[String],
) -> Result<Vec<Activity>> {
    let limit = limit as i64;
    let offset = offset as i64;
    let rows = if types.is_empty() {
        let mut stmt = conn
            .prepare(
                "SELECT id, artifact_id, user_id, activity_type, category, description, data,
                        timestamp, is_public, related_comment_id, related_user_id
                 FROM activities WHERE artifact_id = ?1
                 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
            )
            .map_err(storage_err)?;
        let mapped = stmt
            .query_map(params![artifact_id, limit, offset], row_to_activity)
            .map_err(storage_err)?;
        mapped.filter_map(|r| r.ok()).collect::<Vec<_>>()
    } else {
        let placeholders: Vec<String> = (0..types.len()).map(|i| format!("?{}", i + 4)).collect();
        let sql = format!(
            "SELECT id, artifact_id, user_id, activity_type, category, description, data,
                    timestamp, is_public, related_comment_id, related_user_id
             FROM activities WHERE artifact_id = ?1 AND activity_type IN ({})
             ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
            placeholders.join(",")
        );
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&artifact_id, &limit, &offset];
        for t in types {
            bound.push(t);
        }
        let mapped = stmt
            .query_map(bound.as_slice(), row_to_activity)
            .map_err(storage_err)?;
        mapped.filter_map(|r| r.ok()).collect::<Vec<_>>()
    };
    Ok(rows)
}
