//! Session archival: one JSON document per session, upserted into SQLite.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::{ArchiveError, Message, PendingApproval, Session, SessionStatus, round2};

// ── Document ─────────────────────────────────────────────────────────────

/// The persisted form of a session. `conversation_history` entries are the
/// serialized [`Message`]s themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionDocument {
    pub(crate) session_id: String,
    pub(crate) session_start: DateTime<Utc>,
    #[serde(default)]
    pub(crate) session_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) session_duration: Option<f64>,
    pub(crate) total_messages: usize,
    #[serde(default)]
    pub(crate) user_inputs: Vec<String>,
    #[serde(default)]
    pub(crate) conversation_history: Vec<Message>,
    pub(crate) status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) pending_approval: Option<PendingApproval>,
}

pub(crate) fn build_session_document(session: &Session) -> SessionDocument {
    SessionDocument {
        session_id: session.id.clone(),
        session_start: session.started_at,
        session_end: session.ended_at,
        session_duration: session.duration_secs().map(round2),
        total_messages: session.total_messages(),
        user_inputs: session.user_inputs(),
        conversation_history: session.messages().to_vec(),
        status: session.status,
        pending_approval: session.pending.clone(),
    }
}

impl Session {
    /// Resume an archived session. The history is replayed through the same
    /// invariants as a live one, so a hand-edited document can be refused.
    pub(crate) fn from_document(doc: SessionDocument) -> Result<Session, ArchiveError> {
        let id = doc.session_id.clone();
        Session::restore(
            doc.session_id,
            doc.conversation_history,
            doc.session_start,
            doc.pending_approval,
        )
        .map_err(|e| ArchiveError::Corrupt {
            id,
            reason: e.to_string(),
        })
    }
}

/// Row returned by [`SessionArchive::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SessionSummary {
    pub(crate) session_id: String,
    pub(crate) session_start: DateTime<Utc>,
    pub(crate) session_end: Option<DateTime<Utc>>,
    pub(crate) status: SessionStatus,
    pub(crate) total_messages: usize,
    pub(crate) first_input: Option<String>,
}

pub(crate) trait SessionArchive {
    /// Insert or overwrite the document stored under its session id.
    fn save(&self, doc: &SessionDocument) -> Result<(), ArchiveError>;
    fn load(&self, session_id: &str) -> Result<Option<SessionDocument>, ArchiveError>;
    /// Most recently started first.
    fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, ArchiveError>;
}

pub(crate) fn save_session(archive: &dyn SessionArchive, session: &Session) -> Result<(), ArchiveError> {
    let doc = build_session_document(session);
    archive.save(&doc)?;
    tracing::debug!(
        session = %doc.session_id,
        status = doc.status.as_str(),
        messages = doc.total_messages,
        "session archived"
    );
    Ok(())
}

// ── SQLite backend ───────────────────────────────────────────────────────

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    session_start TEXT NOT NULL,
    session_end TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    total_messages INTEGER NOT NULL DEFAULT 0,
    document TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(session_start);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
";

pub(crate) struct SqliteArchive {
    conn: Connection,
}

fn ts(value: &DateTime<Utc>) -> String {
    // fixed width so TEXT ordering is chronological
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(id: &str, raw: &str) -> Result<DateTime<Utc>, ArchiveError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArchiveError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

impl SqliteArchive {
    /// Open or create the archive file, creating parent directories as needed.
    pub(crate) fn open_or_create(path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let archive = Self { conn };
        archive.apply_pragmas()?;
        archive.conn.execute_batch(SCHEMA_SQL)?;
        Ok(archive)
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self, ArchiveError> {
        let archive = Self {
            conn: Connection::open_in_memory()?,
        };
        archive.conn.execute_batch(SCHEMA_SQL)?;
        Ok(archive)
    }

    fn apply_pragmas(&self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> Result<usize, ArchiveError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }
}

impl SessionArchive for SqliteArchive {
    fn save(&self, doc: &SessionDocument) -> Result<(), ArchiveError> {
        let document = serde_json::to_string(doc)?;
        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO sessions (session_id, session_start, session_end, status, total_messages, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id) DO UPDATE SET
                session_start = excluded.session_start,
                session_end = excluded.session_end,
                status = excluded.status,
                total_messages = excluded.total_messages,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                doc.session_id,
                ts(&doc.session_start),
                doc.session_end.as_ref().map(ts),
                doc.status.as_str(),
                doc.total_messages as i64,
                document,
                now,
            ],
        )?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionDocument>, ArchiveError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, ArchiveError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, session_start, session_end, status, total_messages,
                    json_extract(document, '$.user_inputs[0]')
             FROM sessions
             ORDER BY session_start DESC, session_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit.min(i64::MAX as usize) as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, start, end, status, total, first_input) = row?;
            let status = SessionStatus::from_db_str(&status).ok_or_else(|| ArchiveError::Corrupt {
                id: id.clone(),
                reason: format!("unknown status {status:?}"),
            })?;
            let session_start = parse_ts(&id, &start)?;
            let session_end = end.as_deref().map(|raw| parse_ts(&id, raw)).transpose()?;
            summaries.push(SessionSummary {
                session_id: id,
                session_start,
                session_end,
                status,
                total_messages: total.max(0) as usize,
                first_input,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoopState, Outcome, ToolInvocation};
    use chrono::Duration;
    use serde_json::{Value, json};

    fn sample_session() -> Session {
        let mut session = Session::new();
        session.append(Message::human("list my desktop")).unwrap();
        let call = ToolInvocation {
            id: "c1".into(),
            name: "list_directory_tool".into(),
            args: json!({"path": "desktop"}),
        };
        session.append(Message::assistant("", vec![call.clone()])).unwrap();
        session
            .append(Message::tool_result(&call, &Outcome::ok(json!({"count": 0, "items": []}))))
            .unwrap();
        session.append(Message::assistant("Your desktop is empty.", vec![])).unwrap();
        session
    }

    #[test]
    fn document_has_expected_shape() {
        let mut session = sample_session();
        session.end(SessionStatus::Completed);
        let doc = build_session_document(&session);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["session_id"], session.id.as_str());
        assert_eq!(value["total_messages"], 4);
        assert_eq!(value["user_inputs"], json!(["list my desktop"]));
        assert_eq!(value["status"], "completed");
        assert!(value["session_end"].is_string());
        assert!(value["session_duration"].is_number());
        let history = value["conversation_history"].as_array().unwrap();
        let kinds: Vec<&str> = history.iter().map(|m| m["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["human", "ai", "tool", "ai"]);
        assert_eq!(history[2]["tool_call_id"], "c1");
        assert!(value.get("pending_approval").is_none());
    }

    #[test]
    fn save_is_an_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SqliteArchive::open_or_create(&dir.path().join("nested/sessions.sqlite")).unwrap();
        let mut session = sample_session();

        save_session(&archive, &session).unwrap();
        session.append(Message::human("thanks")).unwrap();
        session.end(SessionStatus::Completed);
        save_session(&archive, &session).unwrap();

        assert_eq!(archive.count().unwrap(), 1);
        let doc = archive.load(&session.id).unwrap().unwrap();
        assert_eq!(doc.total_messages, 5);
        assert_eq!(doc.status, SessionStatus::Completed);
        assert_eq!(doc.user_inputs, vec!["list my desktop", "thanks"]);
    }

    #[test]
    fn load_missing_is_none() {
        let archive = SqliteArchive::in_memory().unwrap();
        assert!(archive.load("sess_nope").unwrap().is_none());
    }

    #[test]
    fn list_orders_newest_first_and_limits() {
        let archive = SqliteArchive::in_memory().unwrap();
        let base = Utc::now();
        for (i, input) in ["first", "second", "third"].iter().enumerate() {
            let mut session = Session::new();
            session.id = format!("sess_{i}");
            session.started_at = base + Duration::seconds(i as i64);
            session.append(Message::human(*input)).unwrap();
            save_session(&archive, &session).unwrap();
        }
        let listed = archive.list(2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, "sess_2");
        assert_eq!(listed[0].first_input.as_deref(), Some("third"));
        assert_eq!(listed[1].session_id, "sess_1");
        assert_eq!(listed[0].status, SessionStatus::Active);
    }

    #[test]
    fn pending_approval_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.sqlite");
        let mut session = Session::new();
        session.append(Message::human("delete old.txt")).unwrap();
        let call = ToolInvocation {
            id: "c7".into(),
            name: "delete_file_tool".into(),
            args: json!({"file_path": "old.txt"}),
        };
        session.append(Message::assistant("", vec![call.clone()])).unwrap();
        session.pending = Some(PendingApproval {
            invocations: vec![call],
            requested_at: Utc::now(),
        });
        session.state = LoopState::AwaitingApproval;
        {
            let archive = SqliteArchive::open_or_create(&path).unwrap();
            save_session(&archive, &session).unwrap();
        }

        let archive = SqliteArchive::open_or_create(&path).unwrap();
        let doc = archive.load(&session.id).unwrap().unwrap();
        let restored = Session::from_document(doc).unwrap();
        assert_eq!(restored.state, LoopState::AwaitingApproval);
        assert_eq!(restored.pending.as_ref().unwrap().invocations[0].id, "c7");
        assert_eq!(restored.total_messages(), 2);
    }

    #[test]
    fn tampered_history_is_refused() {
        let session = sample_session();
        let mut value: Value = serde_json::to_value(build_session_document(&session)).unwrap();
        // drop the assistant message that proposed the call
        value["conversation_history"].as_array_mut().unwrap().remove(1);
        let doc: SessionDocument = serde_json::from_value(value).unwrap();
        let err = Session::from_document(doc).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn pending_batch_must_match_the_stored_history() {
        let session = sample_session();
        let mut doc = build_session_document(&session);
        // The only proposal in the history was already answered.
        doc.pending_approval = Some(PendingApproval {
            invocations: vec![ToolInvocation {
                id: "c9".into(),
                name: "delete_folder_tool".into(),
                args: json!({"folder_path": "desktop"}),
            }],
            requested_at: Utc::now(),
        });
        let err = Session::from_document(doc).unwrap_err();
        match err {
            ArchiveError::Corrupt { id, reason } => {
                assert_eq!(id, session.id);
                assert!(reason.contains("c9"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
