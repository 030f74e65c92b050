//! Outcome lines for humans and JSON payloads for automation.
//!
//! JSON goes to stdout alone; refusals and warnings go to stderr so a caller
//! piping `--json` output never sees prose mixed into the payload.

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use phaseboard_core::claim::ActiveAgent;
use phaseboard_core::service::DoneOutcome;
use phaseboard_core::store::Board;
use phaseboard_core::task::{ChecklistItem, Task};
use phaseboard_core::task_ops::render_task_line;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("serialize output")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", body).context("write output")?;
    Ok(())
}

pub fn line(message: impl AsRef<str>) {
    println!("{}", message.as_ref());
}

pub fn refusal(message: impl AsRef<str>) {
    eprintln!("{}", message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    eprintln!("warning: {}", message.as_ref());
}

pub fn not_found(task_id: &str) {
    refusal(format!("Task not found: {}", task_id.trim()));
}

pub fn task_list(board: &Board, tasks: &[Task]) {
    if tasks.is_empty() {
        line("No tasks.");
        return;
    }
    for task in tasks {
        line(render_task_line(board, task));
    }
}

pub fn agent_list(agents: &[ActiveAgent]) {
    if agents.is_empty() {
        line("No active agents.");
        return;
    }
    for agent in agents {
        let session = agent
            .owner
            .session_id
            .as_deref()
            .map(|session| format!(" session={}", session))
            .unwrap_or_default();
        line(format!(
            "{} | {} | {} | {}{}",
            agent.task_id, agent.phase, agent.owner.name, agent.task_title, session
        ));
    }
}

pub fn checklist(task_id: &str, items: &[ChecklistItem]) {
    if items.is_empty() {
        line(format!("{} has no checklist items.", task_id));
        return;
    }
    for (index, item) in items.iter().enumerate() {
        let mark = if item.done { "x" } else { " " };
        line(format!("{}. [{}] {}", index, mark, item.text));
    }
}

pub fn done(outcome: &DoneOutcome) {
    line(format!("Completed {}", outcome.task_id));
    if let Some(sha) = &outcome.commit_sha {
        line(format!("commit: {}", sha));
    }
    if let Some(pr) = outcome.pull_request.as_deref().filter(|pr| !pr.trim().is_empty()) {
        line(format!("pull request: {}", pr.trim()));
    }
    if let Some(archive) = &outcome.archive {
        line(format!(
            "archived: {} ({} artifact{})",
            archive.archive_path.display(),
            archive.artifacts.len(),
            if archive.artifacts.len() == 1 { "" } else { "s" }
        ));
    }
    for message in &outcome.warnings {
        warning(message);
    }
}
