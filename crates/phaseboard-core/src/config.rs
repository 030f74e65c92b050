use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::refine::{DEFAULT_CONTEXT_TIMEOUT, DEFAULT_PROMPT_BUDGET};
use crate::store::DEFAULT_LOCK_TIMEOUT;

pub const DEFAULT_BOARD_DIR: &str = ".phaseboard";
pub const DEFAULT_ARTIFACT_DIRS: [&str; 4] = [
    "docs/design",
    "docs/bugs",
    "docs/research",
    "docs/walkthroughs",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoardConfig {
    /// Board directory, relative to the repository root.
    pub board_dir: Option<String>,
    /// Archive directory, relative to the repository root. Defaults to `<board_dir>/archive`.
    pub archive_dir: Option<String>,
    /// Directories searched for artifacts linked from tasks.
    pub artifact_dirs: Option<Vec<String>>,
    /// Version-control command line, e.g. "git" or "git -c core.pager=cat".
    pub git_command: Option<String>,
    /// Pull-request command line; `--title` and `--body` are appended.
    pub pr_command: Option<String>,
    pub context_timeout_secs: Option<u64>,
    pub lock_timeout_ms: Option<u64>,
    pub prompt_budget: Option<usize>,
}

impl BoardConfig {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: BoardConfig) -> BoardConfig {
        BoardConfig {
            board_dir: self.board_dir.or(fallback.board_dir),
            archive_dir: self.archive_dir.or(fallback.archive_dir),
            artifact_dirs: self.artifact_dirs.or(fallback.artifact_dirs),
            git_command: self.git_command.or(fallback.git_command),
            pr_command: self.pr_command.or(fallback.pr_command),
            context_timeout_secs: self.context_timeout_secs.or(fallback.context_timeout_secs),
            lock_timeout_ms: self.lock_timeout_ms.or(fallback.lock_timeout_ms),
            prompt_budget: self.prompt_budget.or(fallback.prompt_budget),
        }
    }
}

/// Effective settings after project, global, and built-in defaults are layered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub board_dir: String,
    pub archive_dir: String,
    pub artifact_dirs: Vec<String>,
    pub git_command: Vec<String>,
    pub pr_command: Vec<String>,
    pub context_timeout: Duration,
    pub lock_timeout: Duration,
    pub prompt_budget: usize,
}

impl Settings {
    pub fn from_config(config: BoardConfig) -> Self {
        let board_dir = non_empty(config.board_dir).unwrap_or_else(|| DEFAULT_BOARD_DIR.to_string());
        let archive_dir =
            non_empty(config.archive_dir).unwrap_or_else(|| format!("{}/archive", board_dir));
        Settings {
            archive_dir,
            artifact_dirs: config.artifact_dirs.unwrap_or_else(|| {
                DEFAULT_ARTIFACT_DIRS.iter().map(|dir| dir.to_string()).collect()
            }),
            git_command: split_command(config.git_command.as_deref(), "git"),
            pr_command: split_command(config.pr_command.as_deref(), "gh pr create"),
            context_timeout: config
                .context_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONTEXT_TIMEOUT),
            lock_timeout: config
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT),
            prompt_budget: config.prompt_budget.unwrap_or(DEFAULT_PROMPT_BUDGET),
            board_dir,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_config(BoardConfig::default())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_command(raw: Option<&str>, default: &str) -> Vec<String> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty()).unwrap_or(default);
    match shell_words::split(raw) {
        Ok(words) if !words.is_empty() => words,
        Ok(_) => default.split_whitespace().map(str::to_string).collect(),
        Err(err) => {
            tracing::warn!(command = %raw, error = %err, "unparseable command in config; using default");
            default.split_whitespace().map(str::to_string).collect()
        }
    }
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".phaseboard.toml", ".phaseboardrc"]
}

pub fn config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".phaseboard.toml")
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    for key in ["HOME", "USERPROFILE"] {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
    }
    None
}

pub fn resolve_phaseboard_home_dir() -> Option<PathBuf> {
    if let Ok(value) = std::env::var("PHASEBOARD_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir().map(|home| home.join(".phaseboard"))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_phaseboard_home_dir().map(|home| home.join("config.toml"))
}

pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|candidate| {
            config_filename_candidates()
                .iter()
                .any(|name| candidate.join(name).is_file())
        })
        .map(Path::to_path_buf)
}

fn read_config_file(path: &Path) -> Option<BoardConfig> {
    let text = fs::read_to_string(path).ok()?;
    match toml::from_str::<BoardConfig>(&text) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed config");
            None
        }
    }
}

pub fn load_config(repo_root: &Path) -> Option<BoardConfig> {
    config_filename_candidates()
        .iter()
        .map(|name| repo_root.join(name))
        .filter(|path| path.is_file())
        .find_map(|path| read_config_file(&path))
}

pub fn load_global_config() -> Option<BoardConfig> {
    let path = global_config_path()?;
    if !path.is_file() {
        return None;
    }
    read_config_file(&path)
}

pub fn resolve_settings(repo_root: &Path) -> Settings {
    let project = load_config(repo_root).unwrap_or_default();
    let global = load_global_config().unwrap_or_default();
    Settings::from_config(project.or(global))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
        let _guard = crate::test_env::lock();
        f()
    }

    struct EnvGuard {
        phaseboard_home: Option<OsString>,
    }

    impl EnvGuard {
        fn capture() -> Self {
            Self {
                phaseboard_home: std::env::var_os("PHASEBOARD_HOME"),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.phaseboard_home.as_ref() {
                Some(value) => std::env::set_var("PHASEBOARD_HOME", value),
                None => std::env::remove_var("PHASEBOARD_HOME"),
            }
        }
    }

    #[test]
    fn project_config_is_read_from_repo_root() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(
            config_path(temp.path()),
            "board_dir = \"board\"\nartifact_dirs = [\"notes\"]\n",
        )
        .expect("write config");
        let loaded = load_config(temp.path()).expect("load config");
        assert_eq!(
            loaded,
            BoardConfig {
                board_dir: Some("board".to_string()),
                artifact_dirs: Some(vec!["notes".to_string()]),
                ..BoardConfig::default()
            }
        );
    }

    #[test]
    fn settings_fill_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.board_dir, ".phaseboard");
        assert_eq!(settings.archive_dir, ".phaseboard/archive");
        assert_eq!(settings.git_command, vec!["git".to_string()]);
        assert_eq!(settings.pr_command, vec!["gh", "pr", "create"]);
        assert_eq!(settings.artifact_dirs.len(), 4);
        assert_eq!(settings.prompt_budget, DEFAULT_PROMPT_BUDGET);
    }

    #[test]
    fn settings_follow_board_dir_and_split_commands() {
        let settings = Settings::from_config(BoardConfig {
            board_dir: Some("ops/board".to_string()),
            git_command: Some("git -c 'core.pager=cat'".to_string()),
            ..BoardConfig::default()
        });
        assert_eq!(settings.archive_dir, "ops/board/archive");
        assert_eq!(settings.git_command, vec!["git", "-c", "core.pager=cat"]);
    }

    #[test]
    fn malformed_config_is_ignored() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(config_path(temp.path()), "board_dir = [").expect("write");
        assert!(load_config(temp.path()).is_none());
    }

    #[test]
    fn project_config_overrides_global_then_default() {
        with_env_lock(|| {
            let _env = EnvGuard::capture();
            let repo = TempDir::new().expect("repo tempdir");
            let home = TempDir::new().expect("home tempdir");
            std::env::set_var("PHASEBOARD_HOME", home.path());

            assert_eq!(resolve_settings(repo.path()).prompt_budget, DEFAULT_PROMPT_BUDGET);

            fs::write(home.path().join("config.toml"), "prompt_budget = 500\nlock_timeout_ms = 50\n")
                .expect("global config");
            let settings = resolve_settings(repo.path());
            assert_eq!(settings.prompt_budget, 500);
            assert_eq!(settings.lock_timeout, Duration::from_millis(50));

            fs::write(repo.path().join(".phaseboard.toml"), "prompt_budget = 900\n")
                .expect("project config");
            let settings = resolve_settings(repo.path());
            assert_eq!(settings.prompt_budget, 900);
            assert_eq!(settings.lock_timeout, Duration::from_millis(50));
        });
    }
}
