use crate::column::{column_name, find_column, COL_BACKLOG};
use crate::error::{BoardError, BoardResult};
use crate::store::Board;
use crate::task::{format_task_id, now_rfc3339, Owner, PhaseSession, Priority, Status, Task};

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub summary: String,
    pub workflow: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub owner: Option<Owner>,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    pub prerequisites: Vec<String>,
    pub column_id: Option<String>,
    pub spawn_from: Option<String>,
}

impl NewTask {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: &str) -> Self {
        self.priority = Some(priority.to_string());
        self
    }
}

/// Next free task number: one past the highest id on the board or ever allocated.
pub fn next_task_number(board: &Board) -> u32 {
    board
        .items
        .iter()
        .filter_map(Task::id_num)
        .chain(std::iter::once(board.last_task_number))
        .max()
        .unwrap_or(0)
        + 1
}

fn allocate_id(board: &mut Board) -> String {
    let number = next_task_number(board);
    board.last_task_number = number;
    format_task_id(number)
}

pub fn create_task(board: &mut Board, new_task: NewTask) -> BoardResult<String> {
    let title = new_task.title.trim();
    if title.is_empty() {
        return Err(BoardError::invalid("title", "", &["a non-empty title"]));
    }
    let priority = match new_task.priority.as_deref() {
        Some(raw) => raw.parse::<Priority>()?,
        None => Priority::Medium,
    };
    let status = match new_task.status.as_deref() {
        Some(raw) => Status::parse_settable(raw)?,
        None => Status::Ready,
    };
    let column_id = new_task
        .column_id
        .clone()
        .unwrap_or_else(|| COL_BACKLOG.to_string());
    if find_column(&board.columns, &column_id).is_none() {
        let known: Vec<&str> = board.columns.iter().map(|c| c.id.as_str()).collect();
        return Err(BoardError::invalid("column", column_id, &known));
    }

    let id = allocate_id(board);
    let mut task = Task::new(&id, title);
    task.summary = new_task.summary.trim().to_string();
    task.workflow = new_task.workflow.filter(|value| !value.trim().is_empty());
    task.priority = priority;
    task.status = status;
    task.column_id = column_id;
    task.owner = new_task.owner;
    task.upstream = dedup(new_task.upstream);
    task.downstream = dedup(new_task.downstream);
    task.prerequisites.tasks = dedup(new_task.prerequisites);

    if let Some(parent) = new_task
        .spawn_from
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let parent = parent.to_uppercase();
        task.summary = if task.summary.is_empty() {
            format!("Spawned from {}", parent)
        } else {
            format!("{}\n\nSpawned from {}", task.summary, parent)
        };
        push_unique(&mut task.upstream, &parent);
        task.spawned_from = Some(parent);
    }

    tracing::debug!(task = %id, column = %task.column_id, priority = %task.priority, "task created");
    board.items.push(task);
    Ok(id)
}

pub fn get_tasks<'a>(
    board: &'a Board,
    column_id: Option<&str>,
    status: Option<Status>,
) -> Vec<&'a Task> {
    board
        .items
        .iter()
        .filter(|task| column_id.map(|col| task.column_id == col).unwrap_or(true))
        .filter(|task| status.map(|s| task.status == s).unwrap_or(true))
        .collect()
}

/// Returns false when either the task or the column is unknown.
pub fn move_to_column(board: &mut Board, task_id: &str, column_id: &str) -> bool {
    if find_column(&board.columns, column_id).is_none() {
        return false;
    }
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    task.column_id = column_id.to_string();
    task.touch();
    true
}

/// Split a task into siblings. Returns None when the task does not exist.
pub fn replace_task(
    board: &mut Board,
    task_id: &str,
    titles: &[String],
) -> BoardResult<Option<Vec<String>>> {
    let titles: Vec<&str> = titles
        .iter()
        .map(|title| title.trim())
        .filter(|title| !title.is_empty())
        .collect();
    let Some(original) = board.find(task_id) else {
        return Ok(None);
    };
    if titles.is_empty() {
        return Err(BoardError::invalid("replacement titles", "", &["at least one title"]));
    }
    let original_id = original.id.clone();
    let column_id = original.column_id.clone();
    let priority = original.priority;

    let mut new_ids = Vec::with_capacity(titles.len());
    for title in titles {
        let id = allocate_id(board);
        let mut task = Task::new(&id, title);
        task.column_id = column_id.clone();
        task.priority = priority;
        task.upstream = vec![original_id.clone()];
        board.items.push(task);
        new_ids.push(id);
    }

    if let Some(original) = board.find_mut(&original_id) {
        original.status = Status::Done;
        original.summary = format!("[SPLIT] Replaced by: {}", new_ids.join(", "));
        original.touch();
    }
    tracing::debug!(task = %original_id, replacements = ?new_ids, "task split");
    Ok(Some(new_ids))
}

pub fn add_upstream(board: &mut Board, task_id: &str, artifact_id: &str) -> bool {
    link(board, task_id, artifact_id, |task| &mut task.upstream)
}

pub fn add_downstream(board: &mut Board, task_id: &str, artifact_id: &str) -> bool {
    link(board, task_id, artifact_id, |task| &mut task.downstream)
}

fn link(
    board: &mut Board,
    task_id: &str,
    artifact_id: &str,
    field: impl FnOnce(&mut Task) -> &mut Vec<String>,
) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    if push_unique(field(task), artifact_id.trim()) {
        task.touch();
    }
    true
}

pub fn record_phase(board: &mut Board, task_id: &str, phase: &str, session_id: &str) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    task.phases.insert(
        phase.trim().to_string(),
        PhaseSession {
            session_id: session_id.trim().to_string(),
            recorded_at: Some(now_rfc3339()),
        },
    );
    task.touch();
    true
}

pub fn render_task_line(board: &Board, task: &Task) -> String {
    let title = if task.title.trim().is_empty() {
        "(no title)"
    } else {
        task.title.trim()
    };
    let column = column_name(&board.columns, &task.column_id).unwrap_or_else(|| task.column_id.clone());
    let owner = task
        .owner
        .as_ref()
        .map(|owner| format!(" @{}", owner.name))
        .unwrap_or_default();
    format!(
        "{} | {} | {} | {} | {}{}",
        task.id, column, task.status, task.priority, title, owner
    )
}

pub(crate) fn push_unique(values: &mut Vec<String>, value: &str) -> bool {
    if value.is_empty() || values.iter().any(|existing| existing == value) {
        return false;
    }
    values.push(value.to_string());
    true
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        push_unique(&mut out, value.trim());
    }
    out
}
