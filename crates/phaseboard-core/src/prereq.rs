use serde::Serialize;

use crate::column::TERMINAL_COLUMN;
use crate::store::Board;
use crate::task::Task;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingPrerequisites {
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrerequisiteReport {
    pub ok: bool,
    pub missing: MissingPrerequisites,
}

/// Every prerequisite task must exist and sit in the terminal column.
/// Approvals are not evaluated.
pub fn check_prerequisites(board: &Board, task: &Task) -> PrerequisiteReport {
    let missing: Vec<String> = task
        .prerequisites
        .tasks
        .iter()
        .filter(|dep| {
            board
                .find(dep)
                .map(|upstream| upstream.column_id != TERMINAL_COLUMN)
                .unwrap_or(true)
        })
        .cloned()
        .collect();
    PrerequisiteReport {
        ok: missing.is_empty(),
        missing: MissingPrerequisites { tasks: missing },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{COL_BUILD, COL_DONE};
    use crate::task_ops::{create_task, move_to_column, NewTask};

    fn board_with_prereqs(prereqs: &[&str]) -> (Board, String) {
        let mut board = Board::default();
        let mut new_task = NewTask::titled("Gated");
        new_task.prerequisites = prereqs.iter().map(|p| p.to_string()).collect();
        let id = create_task(&mut board, new_task).expect("create");
        (board, id)
    }

    #[test]
    fn no_prerequisites_is_ok() {
        let (board, id) = board_with_prereqs(&[]);
        let report = check_prerequisites(&board, board.find(&id).expect("task"));
        assert!(report.ok);
        assert!(report.missing.tasks.is_empty());
    }

    #[test]
    fn unknown_and_unfinished_prerequisites_are_missing() {
        let mut board = Board::default();
        let done = create_task(&mut board, NewTask::titled("Done")).expect("done");
        let building = create_task(&mut board, NewTask::titled("Building")).expect("building");
        move_to_column(&mut board, &done, COL_DONE);
        move_to_column(&mut board, &building, COL_BUILD);
        let mut gated = NewTask::titled("Gated");
        gated.prerequisites = vec![done.clone(), building.clone(), "TASK-999".to_string()];
        let id = create_task(&mut board, gated).expect("gated");

        let report = check_prerequisites(&board, board.find(&id).expect("task"));
        assert!(!report.ok);
        assert_eq!(report.missing.tasks, vec![building, "TASK-999".to_string()]);
    }

    #[test]
    fn approvals_are_not_evaluated() {
        let (mut board, id) = board_with_prereqs(&[]);
        board
            .find_mut(&id)
            .expect("task")
            .prerequisites
            .approvals
            .push("security-review".to_string());
        assert!(check_prerequisites(&board, board.find(&id).expect("task")).ok);
    }
}
