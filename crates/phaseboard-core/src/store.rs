use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::column::{default_columns, Column};
use crate::error::{BoardError, BoardResult};
use crate::task::Task;

pub const BOARD_FILE: &str = "board.json";
pub const LOCK_FILE: &str = "board.lock";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    #[serde(default = "default_board_version")]
    pub version: u32,
    #[serde(default, deserialize_with = "lenient_columns")]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub items: Vec<Task>,
    /// Highest task number ever allocated, so archived ids stay retired.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_task_number: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            version: default_board_version(),
            columns: default_columns(),
            items: Vec::new(),
            last_task_number: 0,
        }
    }
}

impl Board {
    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.items.iter().find(|task| task.id.eq_ignore_ascii_case(task_id.trim()))
    }

    pub fn find_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.items
            .iter_mut()
            .find(|task| task.id.eq_ignore_ascii_case(task_id.trim()))
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.find(task_id).is_some()
    }

    /// Restore schema invariants after a load. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.columns.is_empty() {
            self.columns = default_columns();
            changed = true;
        }
        for task in &mut self.items {
            changed |= task.migrate_legacy();
        }
        changed
    }
}

fn default_board_version() -> u32 {
    1
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn lenient_columns<'de, D>(deserializer: D) -> Result<Vec<Column>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "malformed columns on board; using defaults");
        Vec::new()
    }))
}

/// A board together with the fingerprint of the bytes it was read from.
#[derive(Debug, Clone)]
pub struct LoadedBoard {
    pub board: Board,
    fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BoardStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl BoardStore {
    pub fn new(board_dir: &Path) -> Self {
        Self {
            path: board_dir.join(BOARD_FILE),
            lock_path: board_dir.join(LOCK_FILE),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BoardResult<Board> {
        Ok(self.load_tracked()?.board)
    }

    pub fn load_tracked(&self) -> BoardResult<LoadedBoard> {
        let Some(raw) = self.read_raw()? else {
            return Ok(LoadedBoard {
                board: Board::default(),
                fingerprint: None,
            });
        };
        let mut board: Board =
            serde_json::from_slice(&raw).map_err(|err| BoardError::CorruptState {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        board.normalize();
        Ok(LoadedBoard {
            board,
            fingerprint: Some(fingerprint(&raw)),
        })
    }

    pub fn save(&self, board: &Board) -> BoardResult<()> {
        let _lock = BoardLock::acquire(&self.lock_path, self.lock_timeout)?;
        self.write(board)
    }

    /// Save only if the document on disk is still the one `loaded` came from.
    pub fn save_checked(&self, loaded: &LoadedBoard) -> BoardResult<()> {
        let _lock = BoardLock::acquire(&self.lock_path, self.lock_timeout)?;
        let current = self.read_raw()?.map(|raw| fingerprint(&raw));
        if current != loaded.fingerprint {
            return Err(BoardError::Conflict(self.path.clone()));
        }
        self.write(&loaded.board)
    }

    /// Locked load, mutate, save. The board is written only when `mutate`
    /// succeeds and actually changed something.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut Board) -> BoardResult<T>) -> BoardResult<T> {
        let _lock = BoardLock::acquire(&self.lock_path, self.lock_timeout)?;
        let loaded = self.load_tracked()?;
        let mut board = loaded.board.clone();
        let result = mutate(&mut board)?;
        if board != loaded.board || loaded.fingerprint.is_none() {
            self.write(&board)?;
        }
        Ok(result)
    }

    fn read_raw(&self) -> BoardResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => {
                tracing::warn!(path = %self.path.display(), "board document is empty; using defaults");
                Ok(None)
            }
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, board: &Board) -> BoardResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut body = serde_json::to_string_pretty(board)?;
        body.push('\n');
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), items = board.items.len(), "board saved");
        Ok(())
    }
}

fn fingerprint(raw: &[u8]) -> String {
    format!("{:x}", Sha256::digest(raw))
}

/// Exclusive advisory lock held for the span of one read-modify-write.
#[derive(Debug)]
struct BoardLock {
    file: File,
}

impl BoardLock {
    fn acquire(path: &Path, timeout: Duration) -> BoardResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let start = Instant::now();
        loop {
            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file });
            }
            if start.elapsed() >= timeout {
                return Err(BoardError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for BoardLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
