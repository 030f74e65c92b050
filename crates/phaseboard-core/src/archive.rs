use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::error::BoardResult;
use crate::store::Board;
use crate::task::Task;

pub const SNAPSHOT_NAME: &str = "task.json";

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub repo_root: PathBuf,
    pub archive_dir: PathBuf,
    /// Directories (relative to `repo_root`) that may hold linked artifacts.
    pub artifact_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResult {
    pub task_id: String,
    pub archive_path: PathBuf,
    pub artifacts: Vec<String>,
}

pub fn archive_path(archive_dir: &Path, task_id: &str) -> PathBuf {
    archive_dir.join(format!("{}.tar.gz", task_id))
}

/// Snapshot a task and its linked artifacts into `<id>.tar.gz`, then drop it
/// from the board. None when the task is not on the board (including when it
/// was already archived).
pub fn archive_task(
    board: &mut Board,
    task_id: &str,
    options: &ArchiveOptions,
) -> BoardResult<Option<ArchiveResult>> {
    let Some(task) = board.find(task_id).cloned() else {
        return Ok(None);
    };
    let ids: Vec<&str> = task
        .upstream
        .iter()
        .chain(task.downstream.iter())
        .map(String::as_str)
        .collect();
    let artifacts = discover_artifacts(&options.repo_root, &options.artifact_dirs, &ids);

    fs::create_dir_all(&options.archive_dir)?;
    let target = archive_path(&options.archive_dir, &task.id);
    let partial = target.with_extension("gz.partial");
    if let Err(err) = write_archive(&partial, &task, &options.repo_root, &artifacts) {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    fs::rename(&partial, &target)?;

    board.items.retain(|item| item.id != task.id);
    tracing::info!(task = %task.id, path = %target.display(), artifacts = artifacts.len(), "task archived");
    Ok(Some(ArchiveResult {
        task_id: task.id,
        archive_path: target,
        artifacts: artifacts
            .iter()
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .collect(),
    }))
}

fn write_archive(path: &Path, task: &Task, repo_root: &Path, artifacts: &[PathBuf]) -> BoardResult<()> {
    let file = File::create(path)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let snapshot = serde_json::to_vec_pretty(task)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(snapshot.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    builder.append_data(&mut header, SNAPSHOT_NAME, snapshot.as_slice())?;

    for relative in artifacts {
        builder.append_path_with_name(repo_root.join(relative), relative)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Resolve link identifiers to files under the artifact directories.
///
/// An identifier that is itself a relative path to a file inside an artifact
/// directory is taken as-is. Any other identifier matches files whose name is
/// the identifier, optionally followed by a separator and a slug
/// (`DESIGN-001` matches `DESIGN-001-auth.md`, not `DESIGN-0010.md`).
/// Returned paths are relative to `repo_root`, sorted and unique.
pub fn discover_artifacts(repo_root: &Path, artifact_dirs: &[String], ids: &[&str]) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = artifact_dirs
        .iter()
        .map(|dir| repo_root.join(dir))
        .filter(|dir| dir.is_dir())
        .collect();
    if roots.is_empty() {
        return Vec::new();
    }
    let mut files = Vec::new();
    for root in &roots {
        collect_files(root, &mut files);
    }

    let mut found = BTreeSet::new();
    for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        if !is_plain_relative(id) {
            tracing::debug!(link = %id, "skipping link that escapes the repository");
            continue;
        }
        let direct = repo_root.join(id);
        if direct.is_file() && roots.iter().any(|root| direct.starts_with(root)) {
            if let Ok(relative) = direct.strip_prefix(repo_root) {
                found.insert(relative.to_path_buf());
            }
            continue;
        }
        for file in files.iter().filter(|file| name_matches(file, id)) {
            if let Ok(relative) = file.strip_prefix(repo_root) {
                found.insert(relative.to_path_buf());
            }
        }
    }
    found.into_iter().collect()
}

/// Only `Normal` and `.` components; `..` or an absolute root never resolves
/// under an artifact directory.
fn is_plain_relative(link: &str) -> bool {
    Path::new(link)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn name_matches(path: &Path, id: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    let id = id.to_lowercase();
    let Some(rest) = name.strip_prefix(&id) else {
        return false;
    };
    match rest.chars().next() {
        None => true,
        Some(next) => !next.is_ascii_alphanumeric(),
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = read_dir.filter_map(|entry| entry.ok()).map(|entry| entry.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_ops::{add_downstream, add_upstream, create_task, NewTask};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn options(root: &Path) -> ArchiveOptions {
        ArchiveOptions {
            repo_root: root.to_path_buf(),
            archive_dir: root.join(".phaseboard").join("archive"),
            artifact_dirs: vec!["docs/design".to_string(), "docs/walkthroughs".to_string()],
        }
    }

    fn entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let file = File::open(path).expect("open archive");
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut out = Vec::new();
        for entry in archive.entries().expect("entries") {
            let mut entry = entry.expect("entry");
            let name = entry.path().expect("path").to_string_lossy().to_string();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).expect("read");
            out.push((name, body));
        }
        out
    }

    #[test]
    fn discover_matches_ids_and_relative_paths() {
        let temp = TempDir::new().expect("tempdir");
        let design = temp.path().join("docs").join("design");
        let walkthroughs = temp.path().join("docs").join("walkthroughs");
        fs::create_dir_all(&design).expect("design");
        fs::create_dir_all(&walkthroughs).expect("walkthroughs");
        fs::write(design.join("DESIGN-001-auth.md"), "auth").expect("write");
        fs::write(design.join("DESIGN-0010.md"), "other").expect("write");
        fs::write(walkthroughs.join("notes.md"), "notes").expect("write");
        fs::write(temp.path().join("README.md"), "outside").expect("write");

        let dirs = vec!["docs/design".to_string(), "docs/walkthroughs".to_string()];
        let found = discover_artifacts(
            temp.path(),
            &dirs,
            &["DESIGN-001", "docs/walkthroughs/notes.md", "README.md", "TASK-001"],
        );
        assert_eq!(
            found,
            vec![
                PathBuf::from("docs/design/DESIGN-001-auth.md"),
                PathBuf::from("docs/walkthroughs/notes.md"),
            ]
        );
    }

    #[test]
    fn archive_writes_snapshot_and_removes_task() {
        let temp = TempDir::new().expect("tempdir");
        let design = temp.path().join("docs").join("design");
        fs::create_dir_all(&design).expect("design");
        fs::write(design.join("DESIGN-002.md"), "# design").expect("write");

        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Ship")).expect("create");
        add_upstream(&mut board, &id, "DESIGN-002");
        add_downstream(&mut board, &id, "PR-77");
        let snapshot = board.find(&id).cloned().expect("task");

        let result = archive_task(&mut board, &id, &options(temp.path()))
            .expect("archive")
            .expect("found");
        assert!(board.find(&id).is_none());
        assert_eq!(result.artifacts, vec!["docs/design/DESIGN-002.md".to_string()]);
        assert!(result.archive_path.ends_with("TASK-001.tar.gz"));

        let entries = entries(&result.archive_path);
        let (name, body) = &entries[0];
        assert_eq!(name, SNAPSHOT_NAME);
        let restored: Task = serde_json::from_slice(body).expect("snapshot");
        assert_eq!(restored, snapshot);
        assert!(entries
            .iter()
            .any(|(name, body)| name == "docs/design/DESIGN-002.md" && body == b"# design"));
    }

    #[test]
    fn links_escaping_artifact_dirs_are_ignored() {
        let temp = TempDir::new().expect("tempdir");
        let design = temp.path().join("docs").join("design");
        fs::create_dir_all(&design).expect("design");
        fs::write(design.join("DESIGN-003.md"), "# design").expect("write");
        fs::write(temp.path().join("secret.txt"), "secret").expect("write");

        let dirs = vec!["docs/design".to_string()];
        let escaping = "docs/design/../../secret.txt";
        assert!(discover_artifacts(temp.path(), &dirs, &[escaping, "docs/design/../secret.txt"]).is_empty());

        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Escape")).expect("create");
        add_upstream(&mut board, &id, escaping);
        add_upstream(&mut board, &id, "DESIGN-003");
        let result = archive_task(&mut board, &id, &options(temp.path()))
            .expect("archive")
            .expect("found");
        assert!(board.find(&id).is_none());
        assert_eq!(result.artifacts, vec!["docs/design/DESIGN-003.md".to_string()]);
        assert!(!entries(&result.archive_path)
            .iter()
            .any(|(name, _)| name.contains("secret")));
    }

    #[test]
    fn archiving_twice_reports_missing_task() {
        let temp = TempDir::new().expect("tempdir");
        let mut board = Board::default();
        let id = create_task(&mut board, NewTask::titled("Once")).expect("create");
        assert!(archive_task(&mut board, &id, &options(temp.path())).expect("first").is_some());
        assert!(archive_task(&mut board, &id, &options(temp.path())).expect("second").is_none());
    }
}
