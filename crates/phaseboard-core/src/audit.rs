use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::task::now_rfc3339;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: String,
    pub actor: Option<String>,
    pub action: String,
    pub task_id: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: &str, task_id: Option<&str>, details: Value) -> Self {
        Self {
            timestamp: now_rfc3339(),
            actor: std::env::var("PHASEBOARD_ACTOR")
                .ok()
                .or_else(|| std::env::var("USER").ok())
                .filter(|value| !value.trim().is_empty()),
            action: action.to_string(),
            task_id: task_id.map(str::to_string),
            details,
        }
    }
}

pub fn audit_log_path(board_dir: &Path) -> PathBuf {
    board_dir.join(".audit.log")
}

pub fn append_audit_event(board_dir: &Path, event: &AuditEvent) -> Result<(), AuditError> {
    fs::create_dir_all(board_dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_log_path(board_dir))?;
    let line = serde_json::to_string(event)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Most recent events first, skipping lines that do not parse.
pub fn read_recent_audit_events(board_dir: &Path, limit: usize) -> Vec<AuditEvent> {
    let Ok(raw) = fs::read_to_string(audit_log_path(board_dir)) else {
        return Vec::new();
    };
    raw.lines()
        .rev()
        .filter_map(|line| serde_json::from_str(line).ok())
        .take(limit)
        .collect()
}
