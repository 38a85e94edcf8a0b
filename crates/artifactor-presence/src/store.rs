use rusqlite::{params, Connection};

use artifactor_core::types::{ArtifactId, PresenceRecord, PresenceStatus, UserId};

use crate::error::Result;

/// Durable analytics log of presence transitions — written alongside every
/// in-memory/KV update but never read back for the live `ArtifactPresence`/
/// `UserPresence` queries (spec.md §4.4).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS presence_history (
            user_id       TEXT NOT NULL,
            artifact_id   TEXT NOT NULL,
            status        TEXT NOT NULL,
            activity      TEXT,
            session_id    TEXT NOT NULL,
            last_seen     TEXT NOT NULL,
            PRIMARY KEY (user_id, artifact_id)
        );
        CREATE INDEX IF NOT EXISTS idx_presence_history_artifact
            ON presence_history (artifact_id);",
    )?;
    Ok(())
}

fn status_str(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Active => "active",
        PresenceStatus::Away => "away",
        PresenceStatus::Offline => "offline",
    }
}

pub fn upsert(conn: &Connection, record: &PresenceRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO presence_history (user_id, artifact_id, status, activity, session_id, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, artifact_id) DO UPDATE SET
            status = excluded.status,
            activity = excluded.activity,
            session_id = excluded.session_id,
            last_seen = excluded.last_seen",
        params![
            record.user_id.to_string(),
            record.artifact_id.to_string(),
            status_str(record.status),
            record.activity,
            record.session_id.to_string(),
            record.last_seen.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn mark_offline(conn: &Connection, user_id: &UserId, artifact_id: &ArtifactId, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
    conn.execute(
        "UPDATE presence_history SET status = 'offline', last_seen = ?3
         WHERE user_id = ?1 AND artifact_id = ?2",
        params![user_id.to_string(), artifact_id.to_string(), now.to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_core::types::{ConnId, UserId};
    use chrono::Utc;

    fn sample() -> PresenceRecord {
        PresenceRecord {
            user_id: UserId::new(),
            artifact_id: ArtifactId::from("artifact-1"),
            status: PresenceStatus::Active,
            activity: Some("editing".into()),
            cursor: None,
            viewport: None,
            last_seen: Utc::now(),
            session_id: ConnId::new(),
            connection_info: None,
        }
    }

    #[test]
    fn upsert_then_mark_offline_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let record = sample();
        upsert(&conn, &record).unwrap();
        mark_offline(&conn, &record.user_id, &record.artifact_id, Utc::now()).unwrap();
        let status: String = conn
            .query_row(
                "SELECT status FROM presence_history WHERE user_id = ?1",
                params![record.user_id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "offline");
    }
}
