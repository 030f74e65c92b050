use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::column::column_name;
use crate::store::Board;
use crate::task::{now_rfc3339, RefinementEntry};
use crate::vcs::Vcs;

pub const DEFAULT_PROMPT_BUDGET: usize = 2000;
pub const DEFAULT_CONTEXT_TIMEOUT: Duration = Duration::from_secs(5);
pub const WALKTHROUGH_FILE: &str = "walkthrough.md";
const TRUNCATED_MARKER: &str = "... (truncated)";

/// Prior-work context for a refinement prompt. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefineContext {
    pub walkthrough: Option<String>,
    pub diff_summary: Option<String>,
}

/// Best-effort context: anything that fails or times out is left out.
pub fn gather_context(session_dir: Option<&Path>, vcs: &dyn Vcs, timeout: Duration) -> RefineContext {
    let walkthrough = session_dir
        .map(|dir| dir.join(WALKTHROUGH_FILE))
        .and_then(|path| fs::read_to_string(path).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    let diff_summary = match vcs.diff_summary(timeout) {
        Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(error = %err, "diff summary unavailable for refinement prompt");
            None
        }
    };
    RefineContext {
        walkthrough,
        diff_summary,
    }
}

/// Record a refinement iteration and render the prompt for it.
/// None (and no mutation) when the task is unknown.
pub fn refine_phase(
    board: &mut Board,
    task_id: &str,
    feedback: &str,
    context: &RefineContext,
    budget: usize,
) -> Option<String> {
    let phase = board.find(task_id).map(|task| {
        column_name(&board.columns, &task.column_id).unwrap_or_else(|| task.column_id.clone())
    })?;
    let task = board.find_mut(task_id)?;

    let iteration = task.refinement_count.unwrap_or(0) + 1;
    task.refinement_count = Some(iteration);
    task.refinement_history.push(RefinementEntry {
        iteration,
        feedback: feedback.trim().to_string(),
        timestamp: now_rfc3339(),
    });
    task.touch();

    let mut prior = String::new();
    if let Some(walkthrough) = &context.walkthrough {
        prior.push_str("### Walkthrough\n");
        prior.push_str(walkthrough);
        prior.push('\n');
    }
    if let Some(diff) = &context.diff_summary {
        if !prior.is_empty() {
            prior.push('\n');
        }
        prior.push_str("### Changes\n");
        prior.push_str(diff);
        prior.push('\n');
    }
    if prior.is_empty() {
        prior.push_str("(no prior work summary available)\n");
    }

    let mut out = String::new();
    out.push_str(&format!("# Refine {}: {}\n\n", task.id, task.title));
    out.push_str(&format!("- Task: {}\n", task.id));
    out.push_str(&format!("- Phase: {}\n", phase));
    out.push_str(&format!("- Iteration: {}\n", iteration));
    if !task.summary.trim().is_empty() {
        out.push_str(&format!("- Summary: {}\n", task.summary.trim()));
    }
    out.push_str("\n## Feedback\n");
    out.push_str(feedback.trim());
    out.push_str("\n\n## Prior work\n");
    out.push_str(&truncate(&prior, budget));
    out.push_str("\n## Instructions\n");
    out.push_str(&format!(
        "Revise the {} phase output for {} to address the feedback above. \
Keep what already works and note what changed.\n",
        phase, task.id
    ));
    Some(out)
}

fn truncate(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(budget).collect();
    cut.push('\n');
    cut.push_str(TRUNCATED_MARKER);
    cut.push('\n');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::COL_BUILD;
    use crate::error::{BoardError, BoardResult};
    use crate::task_ops::{create_task, move_to_column, NewTask};
    use tempfile::TempDir;

    struct DiffOnly(Option<String>);

    impl Vcs for DiffOnly {
        fn commit_info(&self) -> BoardResult<String> {
            Ok("abc1234".to_string())
        }

        fn revert(&self, _sha: &str) -> BoardResult<()> {
            Ok(())
        }

        fn create_pr(&self, _title: &str, _body: &str) -> BoardResult<String> {
            Ok(String::new())
        }

        fn diff_summary(&self, _timeout: Duration) -> BoardResult<String> {
            self.0.clone().ok_or_else(|| BoardError::ExternalToolUnavailable {
                tool: "git".to_string(),
                reason: "not installed".to_string(),
            })
        }
    }

    #[test]
    fn gather_context_is_best_effort() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join(WALKTHROUGH_FILE), "did things\n").expect("write");
        let context = gather_context(Some(temp.path()), &DiffOnly(None), Duration::from_secs(1));
        assert_eq!(context.walkthrough.as_deref(), Some("did things"));
        assert!(context.diff_summary.is_none());

        let context = gather_context(None, &DiffOnly(Some(" 1 file changed\n".to_string())), Duration::from_secs(1));
        assert!(context.walkthrough.is_none());
        assert_eq!(context.diff_summary.as_deref(), Some("1 file changed"));
    }

    #[test]
    fn refine_records_history_and_renders_prompt() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Auth")).expect("create");
        move_to_column(&mut board, &id, COL_BUILD);
        let context = RefineContext {
            walkthrough: Some("Added login".to_string()),
            diff_summary: None,
        };
        let prompt = refine_phase(&mut board, &id, "handle expiry", &context, DEFAULT_PROMPT_BUDGET)
            .expect("prompt");
        assert!(prompt.contains("- Phase: Build"));
        assert!(prompt.contains("- Iteration: 1"));
        assert!(prompt.contains("handle expiry"));
        assert!(prompt.contains("Added login"));

        refine_phase(&mut board, &id, "again", &RefineContext::default(), DEFAULT_PROMPT_BUDGET)
            .expect("second");
        let task = board.find(&id).expect("task");
        assert_eq!(task.refinement_count, Some(2));
        assert_eq!(task.refinement_history.len(), 2);
        assert_eq!(task.refinement_history[1].iteration, 2);
        assert_eq!(task.refinement_history[1].feedback, "again");
    }

    #[test]
    fn prior_work_is_truncated_at_budget() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Long")).expect("create");
        let context = RefineContext {
            walkthrough: Some("x".repeat(500)),
            diff_summary: None,
        };
        let prompt = refine_phase(&mut board, &id, "shorter", &context, 100).expect("prompt");
        assert!(prompt.contains(TRUNCATED_MARKER));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[test]
    fn unnamed_column_falls_back_to_its_id() {
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Custom")).expect("create");
        board.find_mut(&id).expect("task").column_id = "col-custom".to_string();
        let prompt = refine_phase(&mut board, &id, "fb", &RefineContext::default(), DEFAULT_PROMPT_BUDGET)
            .expect("prompt for existing task");
        assert!(prompt.contains("- Phase: col-custom"));
        assert_eq!(board.find(&id).expect("task").refinement_count, Some(1));
    }

    #[test]
    fn unknown_task_is_none_without_mutation() {
        let mut board = Board::default();
        create_task(&mut board, NewTask::titled("A")).expect("create");
        let before = board.clone();
        assert!(refine_phase(&mut board, "TASK-404", "x", &RefineContext::default(), 10).is_none());
        assert_eq!(board, before);
    }
}
