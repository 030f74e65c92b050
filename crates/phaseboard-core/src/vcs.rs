use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Version-control and code-hosting capabilities the board consumes.
pub trait Vcs {
    /// Abbreviated HEAD commit of the working repository.
    fn commit_info(&self) -> BoardResult<String>;
    /// Stage the reverse of `sha` without committing it.
    fn revert(&self, sha: &str) -> BoardResult<()>;
    /// Open a pull request; returns whatever the tool printed (usually a URL).
    fn create_pr(&self, title: &str, body: &str) -> BoardResult<String>;
    /// Short summary of uncommitted changes, bounded by `timeout`.
    fn diff_summary(&self, timeout: Duration) -> BoardResult<String>;
}

#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
    git_command: Vec<String>,
    pr_command: Vec<String>,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            git_command: vec!["git".to_string()],
            pr_command: vec!["gh".to_string(), "pr".to_string(), "create".to_string()],
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_git_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.git_command = command;
        }
        self
    }

    pub fn with_pr_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.pr_command = command;
        }
        self
    }

    fn git(&self, args: &[&str], timeout: Duration) -> BoardResult<String> {
        let mut argv = self.git_command.clone();
        argv.extend(args.iter().map(|arg| arg.to_string()));
        run_tool(&self.repo_root, &argv, timeout)
    }
}

impl Vcs for GitCli {
    fn commit_info(&self) -> BoardResult<String> {
        let sha = self.git(&["rev-parse", "--short", "HEAD"], self.timeout)?;
        if sha.is_empty() {
            return Err(BoardError::ExternalToolFailed {
                tool: "git".to_string(),
                message: "rev-parse returned no commit".to_string(),
            });
        }
        Ok(sha)
    }

    fn revert(&self, sha: &str) -> BoardResult<()> {
        self.git(&["revert", "--no-commit", sha], self.timeout)?;
        Ok(())
    }

    fn create_pr(&self, title: &str, body: &str) -> BoardResult<String> {
        let mut argv = self.pr_command.clone();
        argv.extend([
            "--title".to_string(),
            title.to_string(),
            "--body".to_string(),
            body.to_string(),
        ]);
        run_tool(&self.repo_root, &argv, self.timeout)
    }

    fn diff_summary(&self, timeout: Duration) -> BoardResult<String> {
        self.git(&["diff", "--stat", "HEAD"], timeout)
    }
}

/// Run an external tool in `cwd`, killing it once `timeout` elapses.
/// Returns trimmed stdout on success.
pub fn run_tool(cwd: &Path, argv: &[String], timeout: Duration) -> BoardResult<String> {
    let Some((program, args)) = argv.split_first() else {
        return Err(BoardError::ExternalToolUnavailable {
            tool: String::new(),
            reason: "empty command".to_string(),
        });
    };
    let resolved = which::which(program).map_err(|err| BoardError::ExternalToolUnavailable {
        tool: program.clone(),
        reason: err.to_string(),
    })?;

    let mut child = Command::new(resolved)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| BoardError::ExternalToolUnavailable {
            tool: program.clone(),
            reason: err.to_string(),
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BoardError::ExternalToolFailed {
                tool: program.clone(),
                message: format!("timed out after {:?}", timeout),
            });
        }
        thread::sleep(Duration::from_millis(20));
    };

    let stdout = stdout.and_then(|handle| handle.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|handle| handle.join().ok()).unwrap_or_default();
    if !status.success() {
        let message = if stderr.trim().is_empty() {
            format!("exited with {}", status)
        } else {
            stderr.trim().to_string()
        };
        return Err(BoardError::ExternalToolFailed {
            tool: program.clone(),
            message,
        });
    }
    Ok(stdout.trim().to_string())
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    })
}
