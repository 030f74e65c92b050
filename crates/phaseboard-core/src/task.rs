use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column::COL_BACKLOG;
use crate::error::BoardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ACCEPTED: [&'static str; 6] = ["high", "medium", "low", "p0", "p1", "p2"];

    /// Scheduling rank; lower runs first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = BoardError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "high" | "p0" => Ok(Priority::High),
            "medium" | "p1" => Ok(Priority::Medium),
            "low" | "p2" => Ok(Priority::Low),
            _ => Err(BoardError::invalid("priority", raw, &Priority::ACCEPTED)),
        }
    }
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(priority = %raw, "unrecognized priority on board; treating as medium");
            Priority::Medium
        })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Ready,
    #[serde(alias = "in_progress")]
    AgentActive,
    NeedsFeedback,
    Blocked,
    Done,
    Reverted,
}

impl Status {
    /// Values accepted by an explicit status change. `reverted` is reachable
    /// only through the revert operation.
    pub const SETTABLE: [&'static str; 5] =
        ["ready", "agent_active", "needs_feedback", "blocked", "done"];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::AgentActive => "agent_active",
            Status::NeedsFeedback => "needs_feedback",
            Status::Blocked => "blocked",
            Status::Done => "done",
            Status::Reverted => "reverted",
        }
    }

    pub fn all() -> [Status; 6] {
        [
            Status::Ready,
            Status::AgentActive,
            Status::NeedsFeedback,
            Status::Blocked,
            Status::Done,
            Status::Reverted,
        ]
    }

    pub fn parse_settable(raw: &str) -> Result<Self, BoardError> {
        match raw.trim().to_lowercase().as_str() {
            "ready" => Ok(Status::Ready),
            "agent_active" => Ok(Status::AgentActive),
            "needs_feedback" => Ok(Status::NeedsFeedback),
            "blocked" => Ok(Status::Blocked),
            "done" => Ok(Status::Done),
            _ => Err(BoardError::invalid("status", raw, &Status::SETTABLE)),
        }
    }
}

impl FromStr for Status {
    type Err = BoardError;

    /// Lenient parse used for filters: every stored status plus the legacy
    /// `in_progress` spelling.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        if normalized == "in_progress" {
            return Ok(Status::AgentActive);
        }
        Status::all()
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = Status::all().iter().map(|s| s.as_str()).collect();
                BoardError::invalid("status", raw, &names)
            })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner flavour. Anything other than `human` names an agent kind
/// (`agent`, `claude`, `codex`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OwnerKind {
    Human,
    Agent(String),
}

impl From<String> for OwnerKind {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("human") {
            OwnerKind::Human
        } else if trimmed.is_empty() {
            OwnerKind::Agent("agent".to_string())
        } else {
            OwnerKind::Agent(trimmed.to_string())
        }
    }
}

impl From<OwnerKind> for String {
    fn from(kind: OwnerKind) -> Self {
        match kind {
            OwnerKind::Human => "human".to_string(),
            OwnerKind::Agent(kind) => kind,
        }
    }
}

impl From<&str> for OwnerKind {
    fn from(raw: &str) -> Self {
        OwnerKind::from(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OwnerKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub started_at: String,
}

impl Owner {
    pub fn human(name: &str, phase: &str) -> Self {
        Owner {
            id: name.to_string(),
            kind: OwnerKind::Human,
            name: name.to_string(),
            session_id: None,
            phase: phase.to_string(),
            started_at: now_rfc3339(),
        }
    }

    pub fn new(kind: OwnerKind, name: &str, session_id: Option<&str>, phase: &str) -> Self {
        let session_id = session_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let id = match (&kind, &session_id) {
            (OwnerKind::Agent(_), Some(session)) => session.clone(),
            (OwnerKind::Agent(agent), None) => format!("{}:{}", agent, name),
            (OwnerKind::Human, _) => name.to_string(),
        };
        Owner {
            id,
            kind,
            name: name.to_string(),
            session_id,
            phase: phase.to_string(),
            started_at: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Prerequisites {
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Carried in the schema; not evaluated when claiming.
    #[serde(default)]
    pub approvals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompletionCriteria {
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub tests: bool,
    #[serde(default)]
    pub review: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSession {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementEntry {
    pub iteration: u32,
    pub feedback: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub column_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub downstream: Vec<String>,
    #[serde(default)]
    pub prerequisites: Prerequisites,
    #[serde(default)]
    pub completion_criteria: CompletionCriteria,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub phases: BTreeMap<String, PhaseSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refinement_history: Vec<RefinementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: String,
    /// Single-string owner written by older boards; folded into `owner` on load.
    #[serde(default, rename = "assignee", skip_serializing)]
    pub(crate) legacy_assignee: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(id: &str, title: &str) -> Self {
        let now = now_rfc3339();
        Task {
            id: id.to_string(),
            column_id: COL_BACKLOG.to_string(),
            title: title.to_string(),
            summary: String::new(),
            workflow: None,
            priority: Priority::Medium,
            status: Status::Ready,
            owner: None,
            upstream: Vec::new(),
            downstream: Vec::new(),
            prerequisites: Prerequisites::default(),
            completion_criteria: CompletionCriteria::default(),
            checklist: Vec::new(),
            phases: BTreeMap::new(),
            commit_sha: None,
            reverted_at: None,
            refinement_count: None,
            refinement_history: Vec::new(),
            spawned_from: None,
            created_at: Some(now.clone()),
            updated_at: now,
            legacy_assignee: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn id_num(&self) -> Option<u32> {
        parse_task_number(&self.id)
    }

    pub fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }

    pub fn updated_at_parsed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }

    pub fn drop_legacy_assignee(&mut self) {
        self.legacy_assignee = None;
    }

    /// Fold legacy shapes into the current model. Returns true if anything changed.
    pub fn migrate_legacy(&mut self) -> bool {
        let Some(raw) = self.legacy_assignee.take() else {
            return false;
        };
        let name = match &raw {
            Value::String(name) => name.trim().to_string(),
            Value::Array(values) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|value| !value.is_empty())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        if self.owner.is_none() && !name.is_empty() {
            tracing::warn!(task = %self.id, assignee = %name, "migrating legacy assignee to owner");
            let mut owner = Owner::human(&name, &self.column_id);
            owner.started_at = self.updated_at.clone();
            self.owner = Some(owner);
        }
        true
    }
}

fn task_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^TASK-(\d+)$").expect("regex"))
}

pub fn parse_task_number(id: &str) -> Option<u32> {
    task_id_regex()
        .captures(id.trim())
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

pub fn format_task_id(number: u32) -> String {
    format!("TASK-{:03}", number)
}

/// Canonical form of a user-supplied task id, or None when it is not one.
pub fn validate_task_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    parse_task_number(trimmed)?;
    Some(trimmed.to_uppercase())
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn priority_aliases_canonicalize() {
        assert_eq!("p0".parse::<Priority>().expect("p0"), Priority::High);
        assert_eq!("P1".parse::<Priority>().expect("p1"), Priority::Medium);
        assert_eq!("low".parse::<Priority>().expect("low"), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn stored_unknown_priority_reads_as_medium() {
        let priority: Priority = serde_json::from_str("\"someday\"").expect("parse");
        assert_eq!(priority, Priority::Medium);
        let priority: Priority = serde_json::from_str("\"p2\"").expect("parse");
        assert_eq!(priority, Priority::Low);
    }

    #[test]
    fn settable_status_rejects_reverted_and_unknown() {
        assert_eq!(Status::parse_settable("blocked").expect("blocked"), Status::Blocked);
        assert!(Status::parse_settable("reverted").is_err());
        let err = Status::parse_settable("bogus").expect_err("bogus");
        assert!(err.to_string().contains("needs_feedback"));
    }

    #[test]
    fn legacy_in_progress_status_reads_as_agent_active() {
        let status: Status = serde_json::from_str("\"in_progress\"").expect("parse");
        assert_eq!(status, Status::AgentActive);
        assert_eq!("in_progress".parse::<Status>().expect("parse"), Status::AgentActive);
    }

    #[test]
    fn owner_kind_round_trips_through_type_field() {
        let owner = Owner::new(OwnerKind::from("claude"), "Claude", Some("sess-1"), "col-build");
        let json = serde_json::to_value(&owner).expect("json");
        assert_eq!(json["type"], "claude");
        assert_eq!(json["sessionId"], "sess-1");
        assert_eq!(json["id"], "sess-1");
        let back: Owner = serde_json::from_value(json).expect("back");
        assert_eq!(back.kind, OwnerKind::Agent("claude".to_string()));
    }

    #[test]
    fn legacy_assignee_migrates_to_human_owner() {
        let raw = serde_json::json!({
            "id": "TASK-004",
            "columnId": "col-build",
            "title": "Old",
            "assignee": "dana",
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        let mut task: Task = serde_json::from_value(raw).expect("task");
        assert!(task.legacy_assignee.is_some());
        assert!(task.migrate_legacy());
        let owner = task.owner.clone().expect("owner");
        assert_eq!(owner.kind, OwnerKind::Human);
        assert_eq!(owner.name, "dana");
        let json = serde_json::to_value(&task).expect("json");
        assert!(json.get("assignee").is_none());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = serde_json::json!({
            "id": "TASK-001",
            "columnId": "col-backlog",
            "title": "Keep",
            "estimate": 3,
            "updatedAt": "2025-01-01T00:00:00Z"
        });
        let task: Task = serde_json::from_value(raw).expect("task");
        let json = serde_json::to_value(&task).expect("json");
        assert_eq!(json["estimate"], 3);
    }

    #[test]
    fn task_ids_parse_and_format() {
        assert_eq!(parse_task_number("TASK-007"), Some(7));
        assert_eq!(parse_task_number("task-12"), Some(12));
        assert_eq!(parse_task_number("TASK-"), None);
        assert_eq!(parse_task_number("DESIGN-001"), None);
        assert_eq!(format_task_id(7), "TASK-007");
        assert_eq!(format_task_id(1234), "TASK-1234");
        assert_eq!(validate_task_id(" task-009 ").as_deref(), Some("TASK-009"));
        assert_eq!(validate_task_id("nope"), None);
    }
}
