use serde::Serialize;

use crate::error::{BoardError, BoardResult};
use crate::prereq::check_prerequisites;
use crate::store::Board;
use crate::task::{Owner, OwnerKind, Status};

#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub force: bool,
    pub session_id: Option<String>,
    pub agent_type: String,
    pub name: String,
}

impl Default for ClaimRequest {
    fn default() -> Self {
        Self {
            force: false,
            session_id: None,
            agent_type: "agent".to_string(),
            name: "agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAgent {
    pub task_id: String,
    pub task_title: String,
    pub owner: Owner,
    pub phase: String,
}

fn assign_owner(
    board: &mut Board,
    task_id: &str,
    kind: OwnerKind,
    session_id: Option<&str>,
    name: &str,
) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    task.owner = Some(Owner::new(kind, name, session_id, &task.column_id));
    task.drop_legacy_assignee();
    task.status = Status::AgentActive;
    task.touch();
    true
}

/// Unconditional ownership for automation already authorized to work the task.
pub fn register_agent(
    board: &mut Board,
    task_id: &str,
    agent_type: &str,
    session_id: Option<&str>,
    name: &str,
) -> bool {
    assign_owner(board, task_id, OwnerKind::from(agent_type), session_id, name)
}

/// Gated claim. `Ok(false)` means the task does not exist; unmet
/// prerequisites are refused unless `force` is set.
pub fn claim_task(board: &mut Board, task_id: &str, request: &ClaimRequest) -> BoardResult<bool> {
    let Some(task) = board.find(task_id) else {
        return Ok(false);
    };
    if !request.force {
        let report = check_prerequisites(board, task);
        if !report.ok {
            return Err(BoardError::PrerequisiteUnmet {
                task_id: task.id.clone(),
                missing: report.missing.tasks,
            });
        }
    }
    Ok(assign_owner(
        board,
        task_id,
        OwnerKind::from(request.agent_type.as_str()),
        request.session_id.as_deref(),
        &request.name,
    ))
}

/// Idempotent release: false only when the task itself is unknown.
pub fn unregister_agent(board: &mut Board, task_id: &str) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    if task.owner.take().is_some() {
        task.touch();
    }
    true
}

pub fn set_status(board: &mut Board, task_id: &str, status: &str) -> BoardResult<bool> {
    let status = Status::parse_settable(status)?;
    let Some(task) = board.find_mut(task_id) else {
        return Ok(false);
    };
    task.status = status;
    task.touch();
    Ok(true)
}

pub fn active_agents(board: &Board) -> Vec<ActiveAgent> {
    board
        .items
        .iter()
        .filter(|task| task.status == Status::AgentActive)
        .filter_map(|task| {
            let owner = task.owner.clone()?;
            Some(ActiveAgent {
                task_id: task.id.clone(),
                task_title: task.title.clone(),
                phase: owner.phase.clone(),
                owner,
            })
        })
        .collect()
}
