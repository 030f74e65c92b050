use serde::{Deserialize, Serialize};

pub const COL_BACKLOG: &str = "col-backlog";
pub const COL_UNDERSTAND: &str = "col-understand";
pub const COL_PLAN: &str = "col-plan";
pub const COL_BUILD: &str = "col-build";
pub const COL_VERIFY: &str = "col-verify";
pub const COL_DONE: &str = "col-done";

/// Terminal column: prerequisites resolve here and archival starts from here.
pub const TERMINAL_COLUMN: &str = COL_DONE;

const DEFAULT_COLUMNS: [(&str, &str); 6] = [
    (COL_BACKLOG, "Backlog"),
    (COL_UNDERSTAND, "Understand"),
    (COL_PLAN, "Plan"),
    (COL_BUILD, "Build"),
    (COL_VERIFY, "Verify"),
    (COL_DONE, "Done"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: u32,
}

pub fn default_columns() -> Vec<Column> {
    DEFAULT_COLUMNS
        .iter()
        .enumerate()
        .map(|(idx, (id, name))| Column {
            id: (*id).to_string(),
            name: (*name).to_string(),
            position: idx as u32,
        })
        .collect()
}

pub fn canonical_column_ids() -> Vec<&'static str> {
    DEFAULT_COLUMNS.iter().map(|(id, _)| *id).collect()
}

pub fn find_column<'a>(columns: &'a [Column], column_id: &str) -> Option<&'a Column> {
    columns.iter().find(|column| column.id == column_id)
}

/// Display name for a column id, falling back to the canonical names when the
/// board carries custom columns that do not list it.
pub fn column_name(columns: &[Column], column_id: &str) -> Option<String> {
    if let Some(column) = find_column(columns, column_id) {
        return Some(column.name.clone());
    }
    DEFAULT_COLUMNS
        .iter()
        .find(|(id, _)| *id == column_id)
        .map(|(_, name)| (*name).to_string())
}
