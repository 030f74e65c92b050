mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use phaseboard_core::claim::ClaimRequest;
use phaseboard_core::column::{canonical_column_ids, COL_BACKLOG};
use phaseboard_core::current::{load_context, persist_context};
use phaseboard_core::layout::resolve_layout;
use phaseboard_core::service::{BoardService, DoneOptions};
use phaseboard_core::task::{validate_task_id, Owner, Status};
use phaseboard_core::task_ops::NewTask;
use phaseboard_core::BoardError;

#[derive(Parser)]
#[command(name = "phaseboard", version, about = "Six-phase task board for agents and humans")]
struct Cli {
    /// Repository root or board directory (default: discovered from the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks, optionally filtered by column and status
    List {
        #[arg(long)]
        column: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Create a task in the backlog (or another column)
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        workflow: Option<String>,
        /// Human owner assigned at creation
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        column: Option<String>,
        #[arg(long = "spawn-from")]
        spawn_from: Option<String>,
        #[arg(long = "upstream", num_args = 1..)]
        upstream: Vec<String>,
        /// Task ids that must reach Done before this task can be claimed
        #[arg(long = "prereq", num_args = 1..)]
        prereqs: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Complete a task: move to Done, capture HEAD, optionally open a PR, archive
    Done {
        task_id: String,
        #[arg(long, num_args = 1..)]
        outputs: Vec<String>,
        #[arg(long = "create-pr")]
        create_pr: bool,
        #[arg(long = "no-sha")]
        no_sha: bool,
        #[arg(long = "no-archive")]
        no_archive: bool,
        #[arg(long)]
        json: bool,
    },
    /// Set a task status
    Status { task_id: String, status: String },
    /// Link an upstream artifact or task
    Upstream { task_id: String, artifact_id: String },
    /// Link a downstream output
    Downstream { task_id: String, artifact_id: String },
    /// Move a task to another column
    Move { task_id: String, column_id: String },
    /// Show the next task to work, optionally claiming it
    ///
    /// With --claim, candidates whose prerequisites are unmet are skipped
    /// unless --force is given.
    Pick {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        claim: bool,
        #[command(flatten)]
        agent: AgentArgs,
        #[arg(long)]
        json: bool,
    },
    /// Claim a task (refused while prerequisites are unmet unless --force)
    Claim {
        task_id: String,
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Assign an agent without checking prerequisites
    Register {
        task_id: String,
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Release a task's owner
    Unregister { task_id: String },
    /// List tasks with an active agent
    ActiveAgents {
        #[arg(long)]
        json: bool,
    },
    /// Record the session that worked a phase
    RecordPhase {
        task_id: String,
        phase: String,
        session_id: String,
    },
    /// Print the current task
    CurrentTask,
    /// Show unmet prerequisites for a task
    Prereqs {
        task_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Manage a task checklist
    Checklist {
        #[command(subcommand)]
        command: ChecklistCommand,
    },
    /// Split a task into new sibling tasks
    Replace {
        task_id: String,
        #[arg(long = "with", required = true, num_args = 1..)]
        titles: Vec<String>,
    },
    /// Stage the revert of a completed task's commit
    Revert { task_id: String },
    /// Record feedback on a task and print a refinement prompt
    Refine {
        task_id: String,
        #[arg(long)]
        feedback: String,
        #[arg(long = "session-dir")]
        session_dir: Option<PathBuf>,
    },
    /// Dump the board document as JSON
    GetBoard,
    /// Dump one task as JSON
    GetTask { task_id: String },
    /// Board statistics as JSON
    GetMetrics,
    /// Print the canonical form of a task id
    ValidateTaskId { task_id: String },
    /// Print a column's display name
    GetColumnName { column_id: String },
}

#[derive(Subcommand)]
enum ChecklistCommand {
    Add { task_id: String, text: String },
    Complete {
        task_id: String,
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    List {
        task_id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct AgentArgs {
    #[arg(long = "session-id")]
    session_id: Option<String>,
    /// Owner type: human, agent, or a specific agent kind
    #[arg(long = "type", default_value = "agent")]
    agent_type: String,
    #[arg(long, default_value = "agent")]
    name: String,
}

impl AgentArgs {
    fn request(&self, force: bool) -> ClaimRequest {
        ClaimRequest {
            force,
            session_id: self.session_id.clone(),
            agent_type: self.agent_type.clone(),
            name: self.name.clone(),
        }
    }
}

/// How a command ended when it did not fail outright.
enum Outcome {
    Success,
    Refused,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PHASEBOARD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Refused) => ExitCode::from(1),
        Err(err) => {
            let refused = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<BoardError>())
                .map(BoardError::is_refusal)
                .unwrap_or(false);
            if refused {
                output::refusal(format!("{}", err));
                ExitCode::from(1)
            } else {
                output::refusal(format!("error: {:#}", err));
                ExitCode::from(2)
            }
        }
    }
}

fn found(found: bool, task_id: &str, message: impl FnOnce() -> String) -> Outcome {
    if found {
        output::line(message());
        Outcome::Success
    } else {
        output::not_found(task_id);
        Outcome::Refused
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let layout = resolve_layout(cli.root.as_deref(), &cwd);
    tracing::debug!(board = %layout.board_dir.display(), "resolved board");
    let service = BoardService::open(layout);
    let board_dir = service.layout().board_dir.clone();

    match cli.command {
        Command::List {
            column,
            status,
            json,
        } => {
            let status = status.as_deref().map(str::parse::<Status>).transpose()?;
            let tasks = service.get_tasks(column.as_deref(), status)?;
            if json {
                output::print_json(&tasks)?;
            } else {
                output::task_list(&service.board()?, &tasks);
            }
            Ok(Outcome::Success)
        }
        Command::Create {
            title,
            summary,
            priority,
            workflow,
            assignee,
            column,
            spawn_from,
            upstream,
            prereqs,
            json,
        } => {
            let phase = column.clone().unwrap_or_else(|| COL_BACKLOG.to_string());
            let owner = assignee
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| Owner::human(name, &phase));
            let id = service.create(NewTask {
                title,
                summary,
                workflow,
                priority,
                status: None,
                owner,
                upstream,
                downstream: Vec::new(),
                prerequisites: prereqs,
                column_id: column,
                spawn_from,
            })?;
            if json {
                output::print_json(&json!({ "taskId": id }))?;
            } else {
                output::line(format!("Created {}", id));
            }
            Ok(Outcome::Success)
        }
        Command::Done {
            task_id,
            outputs,
            create_pr,
            no_sha,
            no_archive,
            json,
        } => {
            let mut context = load_context(&board_dir)?;
            let options = DoneOptions {
                outputs,
                create_pr,
                capture_sha: !no_sha,
                archive: !no_archive,
            };
            let Some(outcome) = service.mark_done(&task_id, &options, &mut context)? else {
                output::not_found(&task_id);
                return Ok(Outcome::Refused);
            };
            persist_context(&board_dir, &context)?;
            if json {
                output::print_json(&outcome)?;
            } else {
                output::done(&outcome);
            }
            Ok(Outcome::Success)
        }
        Command::Status { task_id, status } => {
            let updated = service.set_status(&task_id, &status)?;
            Ok(found(updated, &task_id, || {
                format!("{} status: {}", task_id, status.trim())
            }))
        }
        Command::Upstream {
            task_id,
            artifact_id,
        } => {
            let linked = service.add_upstream(&task_id, &artifact_id)?;
            Ok(found(linked, &task_id, || {
                format!("{} upstream: {}", task_id, artifact_id)
            }))
        }
        Command::Downstream {
            task_id,
            artifact_id,
        } => {
            let linked = service.add_downstream(&task_id, &artifact_id)?;
            Ok(found(linked, &task_id, || {
                format!("{} downstream: {}", task_id, artifact_id)
            }))
        }
        Command::Move { task_id, column_id } => {
            if service.move_to_column(&task_id, &column_id)? {
                output::line(format!("Moved {} to {}", task_id, column_id));
                return Ok(Outcome::Success);
            }
            if service.get_task(&task_id)?.is_none() {
                output::not_found(&task_id);
            } else {
                output::refusal(format!("Unknown column: {}", column_id));
            }
            Ok(Outcome::Refused)
        }
        Command::Pick {
            force,
            claim,
            agent,
            json,
        } => {
            let picked = if claim {
                let mut context = load_context(&board_dir)?;
                let picked = service.pick_and_claim(&agent.request(force), &mut context)?;
                persist_context(&board_dir, &context)?;
                picked
            } else {
                service.pick()?
            };
            match (picked, json) {
                (Some(task), true) => output::print_json(&task)?,
                (Some(task), false) => {
                    let verb = if claim { "Claimed" } else { "Next" };
                    output::line(format!("{}: {} | {} | {}", verb, task.id, task.priority, task.title));
                }
                (None, true) => output::print_json(&serde_json::Value::Null)?,
                (None, false) => output::line("No ready tasks in the backlog."),
            }
            Ok(Outcome::Success)
        }
        Command::Claim {
            task_id,
            force,
            agent,
        } => {
            let mut context = load_context(&board_dir)?;
            let claimed = service.claim(&task_id, &agent.request(force), &mut context)?;
            if claimed {
                persist_context(&board_dir, &context)?;
            }
            Ok(found(claimed, &task_id, || {
                format!("Claimed {} as {}", task_id, agent.name)
            }))
        }
        Command::Register { task_id, agent } => {
            let registered = service.register_agent(
                &task_id,
                &agent.agent_type,
                agent.session_id.as_deref(),
                &agent.name,
            )?;
            Ok(found(registered, &task_id, || {
                format!("Registered {} on {}", agent.name, task_id)
            }))
        }
        Command::Unregister { task_id } => {
            let released = service.unregister_agent(&task_id)?;
            Ok(found(released, &task_id, || format!("Released {}", task_id)))
        }
        Command::ActiveAgents { json } => {
            let agents = service.active_agents()?;
            if json {
                output::print_json(&agents)?;
            } else {
                output::agent_list(&agents);
            }
            Ok(Outcome::Success)
        }
        Command::RecordPhase {
            task_id,
            phase,
            session_id,
        } => {
            let recorded = service.record_phase(&task_id, &phase, &session_id)?;
            Ok(found(recorded, &task_id, || {
                format!("{} {}: {}", task_id, phase, session_id)
            }))
        }
        Command::CurrentTask => {
            match load_context(&board_dir)?.current_task {
                Some(task_id) => output::line(task_id),
                None => output::line("No current task."),
            }
            Ok(Outcome::Success)
        }
        Command::Prereqs { task_id, json } => {
            let Some(report) = service.check_prerequisites(&task_id)? else {
                output::not_found(&task_id);
                return Ok(Outcome::Refused);
            };
            if json {
                output::print_json(&report)?;
            } else if report.ok {
                output::line(format!("{}: prerequisites met", task_id));
            } else {
                output::line(format!(
                    "{}: waiting on {}",
                    task_id,
                    report.missing.tasks.join(", ")
                ));
            }
            Ok(Outcome::Success)
        }
        Command::Checklist { command } => run_checklist(&service, command),
        Command::Replace { task_id, titles } => {
            let Some(ids) = service.replace(&task_id, &titles)? else {
                output::not_found(&task_id);
                return Ok(Outcome::Refused);
            };
            output::line(format!("Replaced {} with {}", task_id, ids.join(", ")));
            Ok(Outcome::Success)
        }
        Command::Revert { task_id } => {
            let reverted = service.revert(&task_id)?;
            Ok(found(reverted, &task_id, || {
                format!("Reverted {} (changes staged, review and commit)", task_id)
            }))
        }
        Command::Refine {
            task_id,
            feedback,
            session_dir,
        } => {
            let Some(prompt) = service.refine(&task_id, &feedback, session_dir.as_deref())? else {
                output::not_found(&task_id);
                return Ok(Outcome::Refused);
            };
            print!("{}", prompt);
            Ok(Outcome::Success)
        }
        Command::GetBoard => {
            output::print_json(&service.board()?)?;
            Ok(Outcome::Success)
        }
        Command::GetTask { task_id } => match service.get_task(&task_id)? {
            Some(task) => {
                output::print_json(&task)?;
                Ok(Outcome::Success)
            }
            None => {
                output::not_found(&task_id);
                Ok(Outcome::Refused)
            }
        },
        Command::GetMetrics => {
            output::print_json(&service.metrics()?)?;
            Ok(Outcome::Success)
        }
        Command::ValidateTaskId { task_id } => match validate_task_id(&task_id) {
            Some(canonical) => {
                output::line(canonical);
                Ok(Outcome::Success)
            }
            None => {
                output::refusal(format!("Invalid task id: {} (expected TASK-<number>)", task_id.trim()));
                Ok(Outcome::Refused)
            }
        },
        Command::GetColumnName { column_id } => match service.column_name(&column_id)? {
            Some(name) => {
                output::line(name);
                Ok(Outcome::Success)
            }
            None => {
                output::refusal(format!(
                    "Unknown column: {} (expected one of: {})",
                    column_id,
                    canonical_column_ids().join(", ")
                ));
                Ok(Outcome::Refused)
            }
        },
    }
}

fn run_checklist(service: &BoardService, command: ChecklistCommand) -> Result<Outcome> {
    match command {
        ChecklistCommand::Add { task_id, text } => {
            let added = service.checklist_add(&task_id, &text)?;
            Ok(found(added, &task_id, || format!("{}: added \"{}\"", task_id, text)))
        }
        ChecklistCommand::Complete { task_id, index } => {
            if service.checklist_complete(&task_id, index)? {
                output::line(format!("{}: item {} done", task_id, index));
                return Ok(Outcome::Success);
            }
            if service.get_task(&task_id)?.is_none() {
                output::not_found(&task_id);
            } else {
                output::refusal(format!("{}: no checklist item at index {}", task_id, index));
            }
            Ok(Outcome::Refused)
        }
        ChecklistCommand::List { task_id, json } => {
            let Some(items) = service.checklist_list(&task_id)? else {
                output::not_found(&task_id);
                return Ok(Outcome::Refused);
            };
            if json {
                output::print_json(&items)?;
            } else {
                output::checklist(&task_id, &items);
            }
            Ok(Outcome::Success)
        }
    }
}
