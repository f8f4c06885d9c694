use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::HistoryError;

// ── Messages ────────────────────────────────────────────────────────

/// One tool call proposed by the model inside an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ToolInvocation {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: Value,
}

/// A conversation entry. The serialized form doubles as the archived
/// `conversation_history` record, hence the `type` tag names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum Message {
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Human {
        content: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "ai")]
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "tool")]
    ToolResult {
        content: String,
        tool_name: String,
        tool_call_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn assistant(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn tool_result(invocation: &ToolInvocation, outcome: &Outcome) -> Self {
        Message::ToolResult {
            content: outcome.to_content(),
            tool_name: invocation.name.clone(),
            tool_call_id: invocation.id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::Human { .. } => "human",
            Message::Assistant { .. } => "ai",
            Message::ToolResult { .. } => "tool",
        }
    }

    pub(crate) fn content(&self) -> &str {
        match self {
            Message::System { content, .. }
            | Message::Human { content, .. }
            | Message::Assistant { content, .. }
            | Message::ToolResult { content, .. } => content,
        }
    }

    pub(crate) fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Message::System { timestamp, .. }
            | Message::Human { timestamp, .. }
            | Message::Assistant { timestamp, .. }
            | Message::ToolResult { timestamp, .. } => *timestamp,
        }
    }

    pub(crate) fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Uniform tool result: `{"success": bool, "error"?: string, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Outcome {
    pub(crate) success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    #[serde(flatten)]
    pub(crate) fields: Map<String, Value>,
}

impl Outcome {
    pub(crate) fn ok(fields: Value) -> Self {
        let mut map = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        map.remove("success");
        map.remove("error");
        Self {
            success: true,
            error: None,
            fields: map,
        }
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            fields: Map::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub(crate) fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            let fallback = serde_json::json!({"success": self.success, "error": self.error});
            fallback.to_string()
        })
    }
}

// ── Session ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionStatus {
    Active,
    Completed,
    Interrupted,
}

impl SessionStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub(crate) fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LoopState {
    Idle,
    AwaitingInference,
    AwaitingApproval,
    Executing,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PendingApproval {
    pub(crate) invocations: Vec<ToolInvocation>,
    pub(crate) requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) id: String,
    messages: Vec<Message>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) status: SessionStatus,
    pub(crate) state: LoopState,
    pub(crate) pending: Option<PendingApproval>,
}

pub(crate) fn new_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("sess_{}_{}", now.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

impl Session {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(now),
            messages: Vec::new(),
            started_at: now,
            ended_at: None,
            status: SessionStatus::Active,
            state: LoopState::Idle,
            pending: None,
        }
    }

    /// Rebuild a session from archived parts, replaying every message through
    /// `append` so a tampered history is rejected.
    pub(crate) fn restore(
        id: String,
        messages: Vec<Message>,
        started_at: DateTime<Utc>,
        pending: Option<PendingApproval>,
    ) -> Result<Self, HistoryError> {
        let mut session = Self {
            id,
            messages: Vec::with_capacity(messages.len()),
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            state: LoopState::Idle,
            pending: None,
        };
        for message in messages {
            session.append(message)?;
        }
        if let Some(pending) = pending {
            if !pending.invocations.is_empty() {
                session.check_pending(&pending)?;
                session.state = LoopState::AwaitingApproval;
                session.pending = Some(pending);
            }
        }
        Ok(session)
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn total_messages(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn user_inputs(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Human { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Turn boundaries: a new human message may only be accepted here.
    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.state, LoopState::Idle | LoopState::Terminated)
    }

    pub(crate) fn append(&mut self, message: Message) -> Result<(), HistoryError> {
        match &message {
            Message::System { .. } if !self.messages.is_empty() => {
                return Err(HistoryError::MisplacedSystem);
            }
            Message::ToolResult { tool_call_id, .. } => self.check_tool_result(tool_call_id)?,
            _ => {}
        }
        self.messages.push(message);
        Ok(())
    }

    fn check_tool_result(&self, id: &str) -> Result<(), HistoryError> {
        for message in self.messages.iter().rev() {
            match message {
                Message::ToolResult { tool_call_id, .. } => {
                    if tool_call_id == id {
                        return Err(HistoryError::DuplicateToolResult(id.to_string()));
                    }
                }
                Message::Assistant { tool_calls, .. } => {
                    if tool_calls.iter().any(|call| call.id == id) {
                        return Ok(());
                    }
                    break;
                }
                _ => break,
            }
        }
        Err(HistoryError::OrphanToolResult(id.to_string()))
    }

    /// Every pending invocation must be an unanswered call of the trailing
    /// assistant message, with the same tool name, listed once.
    pub(crate) fn check_pending(&self, pending: &PendingApproval) -> Result<(), HistoryError> {
        let proposed = self
            .messages
            .iter()
            .rev()
            .find(|m| !matches!(m, Message::ToolResult { .. }))
            .map(Message::tool_calls)
            .unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        for invocation in &pending.invocations {
            let stale = || HistoryError::StalePending(invocation.id.clone());
            if !seen.insert(invocation.id.as_str()) {
                return Err(stale());
            }
            if !proposed
                .iter()
                .any(|call| call.id == invocation.id && call.name == invocation.name)
            {
                return Err(stale());
            }
            self.check_tool_result(&invocation.id).map_err(|_| stale())?;
        }
        Ok(())
    }

    pub(crate) fn end(&mut self, status: SessionStatus) {
        self.ended_at = Some(Utc::now());
        self.status = status;
    }

    pub(crate) fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolInvocation {
        ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            args: json!({}),
        }
    }

    #[test]
    fn system_message_only_first() {
        let mut session = Session::new();
        session.append(Message::system("be helpful")).unwrap();
        session.append(Message::human("hi")).unwrap();
        assert_eq!(
            session.append(Message::system("again")),
            Err(HistoryError::MisplacedSystem)
        );
        assert_eq!(session.total_messages(), 2);
    }

    #[test]
    fn tool_results_must_answer_preceding_assistant() {
        let mut session = Session::new();
        session.append(Message::human("do two things")).unwrap();
        session
            .append(Message::assistant("", vec![call("a", "x"), call("b", "y")]))
            .unwrap();
        let ok = Outcome::ok(json!({"n": 1}));
        session.append(Message::tool_result(&call("a", "x"), &ok)).unwrap();
        session.append(Message::tool_result(&call("b", "y"), &ok)).unwrap();
        assert_eq!(
            session.append(Message::tool_result(&call("a", "x"), &ok)),
            Err(HistoryError::DuplicateToolResult("a".to_string()))
        );
        assert_eq!(
            session.append(Message::tool_result(&call("zzz", "x"), &ok)),
            Err(HistoryError::OrphanToolResult("zzz".to_string()))
        );
    }

    #[test]
    fn tool_result_after_human_is_orphan() {
        let mut session = Session::new();
        session.append(Message::human("hi")).unwrap();
        let err = session
            .append(Message::tool_result(&call("a", "x"), &Outcome::failure("nope")))
            .unwrap_err();
        assert_eq!(err, HistoryError::OrphanToolResult("a".to_string()));
    }

    fn pending(calls: Vec<ToolInvocation>) -> Option<PendingApproval> {
        Some(PendingApproval {
            invocations: calls,
            requested_at: Utc::now(),
        })
    }

    #[test]
    fn restore_parks_a_matching_pending_batch() {
        let messages = vec![
            Message::human("tidy up"),
            Message::assistant("", vec![call("a", "create_folder_tool"), call("b", "delete_file_tool")]),
        ];
        let session = Session::restore(
            "sess_1".into(),
            messages,
            Utc::now(),
            pending(vec![call("a", "create_folder_tool"), call("b", "delete_file_tool")]),
        )
        .unwrap();
        assert_eq!(session.state, LoopState::AwaitingApproval);
        assert_eq!(session.pending.as_ref().unwrap().invocations.len(), 2);
    }

    #[test]
    fn restore_rejects_pending_batch_that_history_never_proposed() {
        let history = || {
            vec![
                Message::human("make a folder"),
                Message::assistant("", vec![call("a", "create_folder_tool")]),
            ]
        };

        let err = Session::restore("s".into(), history(), Utc::now(), pending(vec![call("zzz", "delete_file_tool")]))
            .unwrap_err();
        assert_eq!(err, HistoryError::StalePending("zzz".to_string()));

        // Same id, different tool.
        let err = Session::restore("s".into(), history(), Utc::now(), pending(vec![call("a", "delete_file_tool")]))
            .unwrap_err();
        assert_eq!(err, HistoryError::StalePending("a".to_string()));

        let err = Session::restore(
            "s".into(),
            history(),
            Utc::now(),
            pending(vec![call("a", "create_folder_tool"), call("a", "create_folder_tool")]),
        )
        .unwrap_err();
        assert_eq!(err, HistoryError::StalePending("a".to_string()));
    }

    #[test]
    fn restore_rejects_pending_batch_already_answered_or_closed() {
        let ok = Outcome::ok(json!({}));
        let answered = vec![
            Message::human("make a folder"),
            Message::assistant("", vec![call("a", "create_folder_tool")]),
            Message::tool_result(&call("a", "create_folder_tool"), &ok),
        ];
        let err = Session::restore("s".into(), answered, Utc::now(), pending(vec![call("a", "create_folder_tool")]))
            .unwrap_err();
        assert_eq!(err, HistoryError::StalePending("a".to_string()));

        let closed = vec![
            Message::human("make a folder"),
            Message::assistant("", vec![call("a", "create_folder_tool")]),
            Message::assistant("Operation cancelled by user.", Vec::new()),
        ];
        let err = Session::restore("s".into(), closed, Utc::now(), pending(vec![call("a", "create_folder_tool")]))
            .unwrap_err();
        assert_eq!(err, HistoryError::StalePending("a".to_string()));
    }

    #[test]
    fn outcome_serializes_flat() {
        let ok = Outcome::ok(json!({"path": "/tmp/a", "size": 5, "success": false}));
        let value: Value = serde_json::from_str(&ok.to_content()).unwrap();
        assert_eq!(value, json!({"success": true, "path": "/tmp/a", "size": 5}));

        let failed = Outcome::failure("File does not exist: /tmp/x");
        let value: Value = serde_json::from_str(&failed.to_content()).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "error": "File does not exist: /tmp/x"})
        );
        let back: Outcome = serde_json::from_value(value).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn message_tags_match_history_format() {
        let msg = Message::assistant("ok", vec![call("c1", "read_file_tool")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ai");
        assert_eq!(value["tool_calls"][0]["name"], "read_file_tool");

        let plain = serde_json::to_value(Message::assistant("done", vec![])).unwrap();
        assert!(plain.get("tool_calls").is_none());

        let tool = Message::tool_result(&call("c1", "read_file_tool"), &Outcome::ok(json!({})));
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["type"], "tool");
        assert_eq!(value["tool_call_id"], "c1");
        assert_eq!(value["tool_name"], "read_file_tool");
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, tool);
    }

    #[test]
    fn restore_with_pending_parks_at_approval() {
        let messages = vec![
            Message::human("delete it"),
            Message::assistant("", vec![call("c1", "delete_file_tool")]),
        ];
        let pending = PendingApproval {
            invocations: vec![call("c1", "delete_file_tool")],
            requested_at: Utc::now(),
        };
        let session =
            Session::restore("sess_x".into(), messages, Utc::now(), Some(pending)).unwrap();
        assert_eq!(session.state, LoopState::AwaitingApproval);
        assert!(!session.is_ready());
        assert_eq!(session.user_inputs(), vec!["delete it".to_string()]);
    }

    #[test]
    fn session_ids_are_unique() {
        let now = Utc::now();
        let a = new_session_id(now);
        let b = new_session_id(now);
        assert!(a.starts_with("sess_"));
        assert_ne!(a, b);
    }

    #[test]
    fn status_round_trips_through_db_string() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Interrupted,
        ] {
            assert_eq!(SessionStatus::from_db_str(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::from_db_str("archived"), None);
    }
}
