use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BoardResult;

pub const CURRENT_TASK_FILE: &str = "current-task";

/// Per-invocation working context. Claiming sets the current task, completing
/// clears it; the caller decides whether to persist it between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkContext {
    pub current_task: Option<String>,
}

impl WorkContext {
    pub fn with_current(task_id: &str) -> Self {
        Self {
            current_task: Some(task_id.to_string()),
        }
    }

    pub fn set_current(&mut self, task_id: &str) {
        self.current_task = Some(task_id.to_string());
    }

    pub fn clear_current(&mut self) -> Option<String> {
        self.current_task.take()
    }
}

pub fn current_task_path(board_dir: &Path) -> PathBuf {
    board_dir.join(CURRENT_TASK_FILE)
}

pub fn load_context(board_dir: &Path) -> BoardResult<WorkContext> {
    let path = current_task_path(board_dir);
    if !path.exists() {
        return Ok(WorkContext::default());
    }
    let raw = fs::read_to_string(&path)?;
    let current_task = raw
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string);
    Ok(WorkContext { current_task })
}

/// Write the context back: a one-line pointer file, removed when empty.
pub fn persist_context(board_dir: &Path, context: &WorkContext) -> BoardResult<()> {
    let path = current_task_path(board_dir);
    match &context.current_task {
        Some(task_id) => {
            fs::create_dir_all(board_dir)?;
            fs::write(&path, format!("{}\n", task_id))?;
        }
        None => {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pointer_round_trip_and_clear() {
        let temp = TempDir::new().expect("tempdir");
        let board_dir = temp.path().join(".phaseboard");
        assert_eq!(load_context(&board_dir).expect("load"), WorkContext::default());

        persist_context(&board_dir, &WorkContext::with_current("TASK-003")).expect("save");
        let loaded = load_context(&board_dir).expect("load");
        assert_eq!(loaded.current_task.as_deref(), Some("TASK-003"));

        let mut cleared = loaded;
        assert_eq!(cleared.clear_current().as_deref(), Some("TASK-003"));
        persist_context(&board_dir, &cleared).expect("clear");
        assert!(!current_task_path(&board_dir).exists());
    }

    #[test]
    fn blank_pointer_file_means_no_task() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(current_task_path(temp.path()), "\n").expect("write");
        assert!(load_context(temp.path()).expect("load").current_task.is_none());
    }
}
