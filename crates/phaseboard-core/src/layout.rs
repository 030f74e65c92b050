use std::path::{Path, PathBuf};

use crate::config::{find_config_root, resolve_settings, Settings, DEFAULT_BOARD_DIR};
use crate::store::BOARD_FILE;

/// Where a board lives on disk and the settings that apply to it.
#[derive(Debug, Clone)]
pub struct BoardLayout {
    pub repo_root: PathBuf,
    pub board_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub settings: Settings,
}

impl BoardLayout {
    pub fn for_repo(repo_root: &Path, settings: Settings) -> Self {
        let board_dir = repo_root.join(&settings.board_dir);
        let archive_dir = repo_root.join(&settings.archive_dir);
        Self {
            repo_root: repo_root.to_path_buf(),
            board_dir,
            archive_dir,
            settings,
        }
    }
}

/// Resolve the board for an explicit `--root` or, failing that, for the
/// working directory.
///
/// An explicit root may name either the repository or a board directory
/// (one that already holds `board.json`, or is named `.phaseboard`).
pub fn resolve_layout(explicit_root: Option<&Path>, cwd: &Path) -> BoardLayout {
    let repo_root = match explicit_root {
        Some(root) => repo_root_from_explicit(root),
        None => locate_repo_root(cwd),
    };
    let settings = resolve_settings(&repo_root);
    BoardLayout::for_repo(&repo_root, settings)
}

fn repo_root_from_explicit(root: &Path) -> PathBuf {
    let is_board_dir = root.join(BOARD_FILE).is_file() || is_named(root, DEFAULT_BOARD_DIR);
    if is_board_dir {
        if let Some(parent) = root.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            return parent.to_path_buf();
        }
    }
    root.to_path_buf()
}

/// Nearest ancestor with a config file or a board directory; otherwise `start`.
pub fn locate_repo_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    if let Some(config_root) = find_config_root(&start) {
        return config_root;
    }
    for candidate in start.ancestors() {
        if is_named(candidate, DEFAULT_BOARD_DIR) {
            return candidate.parent().unwrap_or(candidate).to_path_buf();
        }
        if candidate.join(DEFAULT_BOARD_DIR).is_dir() {
            return candidate.to_path_buf();
        }
    }
    start
}

fn is_named(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|segment| segment.to_str())
        .map(|segment| segment == name)
        .unwrap_or(false)
}
