use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::archive::{archive_task, ArchiveOptions, ArchiveResult};
use crate::audit::{append_audit_event, AuditEvent};
use crate::checklist::{checklist_add, checklist_complete, checklist_list};
use crate::claim::{
    active_agents, claim_task, register_agent, set_status, unregister_agent, ActiveAgent,
    ClaimRequest,
};
use crate::column::{column_name, COL_DONE};
use crate::current::WorkContext;
use crate::error::BoardResult;
use crate::layout::BoardLayout;
use crate::metrics::{board_metrics, BoardMetrics};
use crate::prereq::{check_prerequisites, PrerequisiteReport};
use crate::refine::{gather_context, refine_phase};
use crate::revert::revert_task;
use crate::schedule::{pick_task, ranked_candidates};
use crate::store::{Board, BoardStore};
use crate::task::{ChecklistItem, Status, Task};
use crate::task_ops::{
    add_downstream, add_upstream, create_task, get_tasks, move_to_column, push_unique,
    record_phase, replace_task, NewTask,
};
use crate::vcs::{GitCli, Vcs};

/// Options for completing a task.
#[derive(Debug, Clone)]
pub struct DoneOptions {
    pub outputs: Vec<String>,
    pub create_pr: bool,
    pub capture_sha: bool,
    pub archive: bool,
}

impl Default for DoneOptions {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            create_pr: false,
            capture_sha: true,
            archive: true,
        }
    }
}

/// What `mark_done` managed to do. Optional steps that failed are reported
/// in `warnings` instead of failing the completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneOutcome {
    pub task_id: String,
    pub commit_sha: Option<String>,
    pub pull_request: Option<String>,
    pub archive: Option<ArchiveResult>,
    pub warnings: Vec<String>,
}

/// Board operations bound to one board directory. Each mutating call is a
/// locked load, mutate, save cycle.
pub struct BoardService {
    layout: BoardLayout,
    store: BoardStore,
    vcs: Box<dyn Vcs>,
}

impl BoardService {
    pub fn open(layout: BoardLayout) -> Self {
        let vcs = GitCli::new(&layout.repo_root)
            .with_git_command(layout.settings.git_command.clone())
            .with_pr_command(layout.settings.pr_command.clone());
        Self::with_vcs(layout, Box::new(vcs))
    }

    pub fn with_vcs(layout: BoardLayout, vcs: Box<dyn Vcs>) -> Self {
        let store = BoardStore::new(&layout.board_dir).with_lock_timeout(layout.settings.lock_timeout);
        Self { layout, store, vcs }
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn board(&self) -> BoardResult<Board> {
        self.store.load()
    }

    pub fn get_task(&self, task_id: &str) -> BoardResult<Option<Task>> {
        Ok(self.board()?.find(task_id).cloned())
    }

    pub fn get_tasks(&self, column_id: Option<&str>, status: Option<Status>) -> BoardResult<Vec<Task>> {
        let board = self.board()?;
        Ok(get_tasks(&board, column_id, status).into_iter().cloned().collect())
    }

    pub fn column_name(&self, column_id: &str) -> BoardResult<Option<String>> {
        Ok(column_name(&self.board()?.columns, column_id))
    }

    pub fn create(&self, new_task: NewTask) -> BoardResult<String> {
        let title = new_task.title.clone();
        let id = self.store.update(|board| create_task(board, new_task))?;
        self.audit("create", Some(&id), json!({ "title": title }));
        Ok(id)
    }

    pub fn move_to_column(&self, task_id: &str, column_id: &str) -> BoardResult<bool> {
        let moved = self
            .store
            .update(|board| Ok(move_to_column(board, task_id, column_id)))?;
        if moved {
            self.audit("move", Some(task_id), json!({ "columnId": column_id }));
        }
        Ok(moved)
    }

    pub fn replace(&self, task_id: &str, titles: &[String]) -> BoardResult<Option<Vec<String>>> {
        let replaced = self.store.update(|board| replace_task(board, task_id, titles))?;
        if let Some(ids) = &replaced {
            self.audit("replace", Some(task_id), json!({ "replacedBy": ids }));
        }
        Ok(replaced)
    }

    pub fn add_upstream(&self, task_id: &str, artifact_id: &str) -> BoardResult<bool> {
        let linked = self
            .store
            .update(|board| Ok(add_upstream(board, task_id, artifact_id)))?;
        if linked {
            self.audit("upstream", Some(task_id), json!({ "artifactId": artifact_id }));
        }
        Ok(linked)
    }

    pub fn add_downstream(&self, task_id: &str, artifact_id: &str) -> BoardResult<bool> {
        let linked = self
            .store
            .update(|board| Ok(add_downstream(board, task_id, artifact_id)))?;
        if linked {
            self.audit("downstream", Some(task_id), json!({ "artifactId": artifact_id }));
        }
        Ok(linked)
    }

    pub fn record_phase(&self, task_id: &str, phase: &str, session_id: &str) -> BoardResult<bool> {
        let recorded = self
            .store
            .update(|board| Ok(record_phase(board, task_id, phase, session_id)))?;
        if recorded {
            self.audit(
                "record_phase",
                Some(task_id),
                json!({ "phase": phase, "sessionId": session_id }),
            );
        }
        Ok(recorded)
    }

    pub fn register_agent(
        &self,
        task_id: &str,
        agent_type: &str,
        session_id: Option<&str>,
        name: &str,
    ) -> BoardResult<bool> {
        let registered = self
            .store
            .update(|board| Ok(register_agent(board, task_id, agent_type, session_id, name)))?;
        if registered {
            self.audit("register", Some(task_id), json!({ "type": agent_type, "name": name }));
        }
        Ok(registered)
    }

    /// Gated claim. On success the claimed task becomes the current task in `context`.
    pub fn claim(
        &self,
        task_id: &str,
        request: &ClaimRequest,
        context: &mut WorkContext,
    ) -> BoardResult<bool> {
        let claimed = self.store.update(|board| {
            if claim_task(board, task_id, request)? {
                Ok(board.find(task_id).map(|task| task.id.clone()))
            } else {
                Ok(None)
            }
        })?;
        let Some(id) = claimed else {
            return Ok(false);
        };
        context.set_current(&id);
        tracing::info!(task = %id, name = %request.name, forced = request.force, "task claimed");
        self.audit(
            "claim",
            Some(&id),
            json!({ "type": request.agent_type, "name": request.name, "force": request.force }),
        );
        Ok(true)
    }

    pub fn unregister_agent(&self, task_id: &str) -> BoardResult<bool> {
        let released = self
            .store
            .update(|board| Ok(unregister_agent(board, task_id)))?;
        if released {
            self.audit("unregister", Some(task_id), Value::Null);
        }
        Ok(released)
    }

    pub fn set_status(&self, task_id: &str, status: &str) -> BoardResult<bool> {
        let updated = self.store.update(|board| set_status(board, task_id, status))?;
        if updated {
            self.audit("status", Some(task_id), json!({ "status": status.trim() }));
        }
        Ok(updated)
    }

    pub fn active_agents(&self) -> BoardResult<Vec<ActiveAgent>> {
        Ok(active_agents(&self.board()?))
    }

    pub fn check_prerequisites(&self, task_id: &str) -> BoardResult<Option<PrerequisiteReport>> {
        let board = self.board()?;
        Ok(board.find(task_id).map(|task| check_prerequisites(&board, task)))
    }

    pub fn pick(&self) -> BoardResult<Option<Task>> {
        Ok(pick_task(&self.board()?).cloned())
    }

    /// Pick and claim in one locked cycle, so no other writer can take the
    /// picked task in between. Unless the request is forced, candidates with
    /// unmet prerequisites are passed over for the next one in rank order.
    pub fn pick_and_claim(
        &self,
        request: &ClaimRequest,
        context: &mut WorkContext,
    ) -> BoardResult<Option<Task>> {
        let picked = self.store.update(|board| {
            let next = ranked_candidates(board)
                .into_iter()
                .find(|task| request.force || check_prerequisites(board, task).ok)
                .map(|task| task.id.clone());
            let Some(id) = next else {
                return Ok(None);
            };
            claim_task(board, &id, request)?;
            Ok(board.find(&id).cloned())
        })?;
        if let Some(task) = &picked {
            context.set_current(&task.id);
            self.audit("claim", Some(&task.id), json!({ "picked": true, "name": request.name }));
        }
        Ok(picked)
    }

    pub fn checklist_add(&self, task_id: &str, text: &str) -> BoardResult<bool> {
        let added = self.store.update(|board| Ok(checklist_add(board, task_id, text)))?;
        if added {
            self.audit("checklist_add", Some(task_id), json!({ "text": text }));
        }
        Ok(added)
    }

    pub fn checklist_complete(&self, task_id: &str, index: i64) -> BoardResult<bool> {
        let completed = self
            .store
            .update(|board| Ok(checklist_complete(board, task_id, index)))?;
        if completed {
            self.audit("checklist_complete", Some(task_id), json!({ "index": index }));
        }
        Ok(completed)
    }

    pub fn checklist_list(&self, task_id: &str) -> BoardResult<Option<Vec<ChecklistItem>>> {
        Ok(checklist_list(&self.board()?, task_id))
    }

    pub fn archive(&self, task_id: &str) -> BoardResult<Option<ArchiveResult>> {
        let options = ArchiveOptions {
            repo_root: self.layout.repo_root.clone(),
            archive_dir: self.layout.archive_dir.clone(),
            artifact_dirs: self.layout.settings.artifact_dirs.clone(),
        };
        let archived = self
            .store
            .update(|board| archive_task(board, task_id, &options))?;
        if let Some(result) = &archived {
            self.audit(
                "archive",
                Some(&result.task_id),
                json!({ "path": result.archive_path, "artifacts": result.artifacts }),
            );
        }
        Ok(archived)
    }

    /// Complete a task: move it to Done, optionally record HEAD, open a pull
    /// request and archive it. `Ok(None)` when the task is unknown, in which
    /// case the context is left alone. Otherwise the current task is cleared
    /// whatever happened to the optional steps.
    pub fn mark_done(
        &self,
        task_id: &str,
        options: &DoneOptions,
        context: &mut WorkContext,
    ) -> BoardResult<Option<DoneOutcome>> {
        if !self.board()?.contains(task_id) {
            return Ok(None);
        }
        let mut warnings = Vec::new();

        let commit_sha = if options.capture_sha {
            match self.vcs.commit_info() {
                Ok(sha) if !sha.trim().is_empty() => Some(sha.trim().to_string()),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(task = %task_id, error = %err, "commit sha not captured");
                    warnings.push(format!("commit sha not captured: {}", err));
                    None
                }
            }
        } else {
            None
        };

        let completed = self.store.update(|board| {
            let Some(task) = board.find_mut(task_id) else {
                return Ok(None);
            };
            task.column_id = COL_DONE.to_string();
            task.status = Status::Done;
            task.owner = None;
            if let Some(sha) = &commit_sha {
                task.commit_sha = Some(sha.clone());
            }
            for output in &options.outputs {
                push_unique(&mut task.downstream, output.trim());
            }
            task.touch();
            Ok(Some((task.id.clone(), task.title.clone(), task.summary.clone())))
        })?;
        let Some((id, title, summary)) = completed else {
            return Ok(None);
        };
        self.audit(
            "done",
            Some(&id),
            json!({ "commitSha": commit_sha, "outputs": options.outputs }),
        );

        let pull_request = if options.create_pr {
            let body = if summary.trim().is_empty() {
                format!("Task: {}", id)
            } else {
                format!("{}\n\nTask: {}", summary.trim(), id)
            };
            match self.vcs.create_pr(&format!("{}: {}", id, title), &body) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(task = %id, error = %err, "pull request not created");
                    warnings.push(format!("pull request not created: {}", err));
                    None
                }
            }
        } else {
            None
        };

        let archive = if options.archive {
            match self.archive(&id) {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(task = %id, error = %err, "task not archived");
                    warnings.push(format!("task not archived: {}", err));
                    None
                }
            }
        } else {
            None
        };

        context.clear_current();
        Ok(Some(DoneOutcome {
            task_id: id,
            commit_sha,
            pull_request,
            archive,
            warnings,
        }))
    }

    pub fn revert(&self, task_id: &str) -> BoardResult<bool> {
        let reverted = self
            .store
            .update(|board| revert_task(board, task_id, self.vcs.as_ref()))?;
        if reverted {
            self.audit("revert", Some(task_id), Value::Null);
        }
        Ok(reverted)
    }

    /// Record a refinement round and return its prompt. Context is gathered
    /// before the board lock is taken.
    pub fn refine(
        &self,
        task_id: &str,
        feedback: &str,
        session_dir: Option<&Path>,
    ) -> BoardResult<Option<String>> {
        if !self.board()?.contains(task_id) {
            return Ok(None);
        }
        let settings = &self.layout.settings;
        let context = gather_context(session_dir, self.vcs.as_ref(), settings.context_timeout);
        let prompt = self.store.update(|board| {
            Ok(refine_phase(board, task_id, feedback, &context, settings.prompt_budget))
        })?;
        if prompt.is_some() {
            self.audit("refine", Some(task_id), json!({ "feedback": feedback.trim() }));
        }
        Ok(prompt)
    }

    pub fn metrics(&self) -> BoardResult<BoardMetrics> {
        Ok(board_metrics(&self.board()?))
    }

    fn audit(&self, action: &str, task_id: Option<&str>, details: Value) {
        let event = AuditEvent::new(action, task_id, details);
        if let Err(err) = append_audit_event(&self.layout.board_dir, &event) {
            tracing::warn!(action = %action, error = %err, "audit event not recorded");
        }
    }
}
