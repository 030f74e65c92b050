use crate::error::{BoardError, BoardResult};
use crate::store::Board;
use crate::task::{now_rfc3339, Status};
use crate::vcs::Vcs;

/// Stage the reverse of a completed task's commit and mark it reverted.
///
/// `Ok(false)` when the task is unknown. Without a recorded commit, or when the
/// VCS refuses (missing tool, conflict), the board is left untouched and the
/// working tree is left for manual resolution.
pub fn revert_task(board: &mut Board, task_id: &str, vcs: &dyn Vcs) -> BoardResult<bool> {
    let Some(task) = board.find_mut(task_id) else {
        return Ok(false);
    };
    let Some(sha) = task.commit_sha.clone().filter(|sha| !sha.trim().is_empty()) else {
        return Err(BoardError::MissingCommit(task.id.clone()));
    };
    vcs.revert(&sha)?;
    task.status = Status::Reverted;
    task.reverted_at = Some(now_rfc3339());
    task.touch();
    tracing::info!(task = %task.id, commit = %sha, "task reverted (changes staged, not committed)");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_ops::{create_task, NewTask};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingVcs {
        reverted: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Vcs for RecordingVcs {
        fn commit_info(&self) -> BoardResult<String> {
            Ok("abc1234".to_string())
        }

        fn revert(&self, sha: &str) -> BoardResult<()> {
            if self.fail {
                return Err(BoardError::ExternalToolFailed {
                    tool: "git".to_string(),
                    message: "conflict".to_string(),
                });
            }
            self.reverted.borrow_mut().push(sha.to_string());
            Ok(())
        }

        fn create_pr(&self, _title: &str, _body: &str) -> BoardResult<String> {
            Ok(String::new())
        }

        fn diff_summary(&self, _timeout: Duration) -> BoardResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn revert_requires_commit_sha() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("A")).expect("a");
        let vcs = RecordingVcs::default();
        let err = revert_task(&mut board, &id, &vcs).expect_err("no sha");
        assert!(matches!(err, BoardError::MissingCommit(_)));
        assert!(vcs.reverted.borrow().is_empty());
        assert_eq!(board.find(&id).expect("task").status, Status::Ready);
    }

    #[test]
    fn revert_marks_task_reverted() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("A")).expect("a");
        board.find_mut(&id).expect("task").commit_sha = Some("abc1234".to_string());
        let vcs = RecordingVcs::default();
        assert!(revert_task(&mut board, &id, &vcs).expect("revert"));
        assert_eq!(vcs.reverted.borrow().as_slice(), ["abc1234".to_string()]);
        let task = board.find(&id).expect("task");
        assert_eq!(task.status, Status::Reverted);
        assert!(task.reverted_at.is_some());
    }

    #[test]
    fn failed_revert_leaves_task_untouched() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("A")).expect("a");
        board.find_mut(&id).expect("task").commit_sha = Some("abc1234".to_string());
        let before = board.clone();
        let vcs = RecordingVcs {
            fail: true,
            ..RecordingVcs::default()
        };
        assert!(revert_task(&mut board, &id, &vcs).is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn revert_unknown_task_is_false() {
        let mut board = Board::default();
        assert!(!revert_task(&mut board, "TASK-404", &RecordingVcs::default()).expect("ok"));
    }
}
