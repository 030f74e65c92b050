use std::collections::BTreeMap;

use serde::Serialize;

use crate::claim::active_agents;
use crate::store::Board;
use crate::task::Status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnCount {
    pub column_id: String,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMetrics {
    pub total: usize,
    pub by_column: Vec<ColumnCount>,
    pub by_status: BTreeMap<String, usize>,
    pub active_agents: usize,
    pub checklist_done: usize,
    pub checklist_total: usize,
}

pub fn board_metrics(board: &Board) -> BoardMetrics {
    let mut columns: Vec<_> = board.columns.iter().collect();
    columns.sort_by_key(|column| column.position);
    let by_column = columns
        .into_iter()
        .map(|column| ColumnCount {
            column_id: column.id.clone(),
            name: column.name.clone(),
            count: board
                .items
                .iter()
                .filter(|task| task.column_id == column.id)
                .count(),
        })
        .collect();

    let mut by_status: BTreeMap<String, usize> = Status::all()
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    for task in &board.items {
        *by_status.entry(task.status.as_str().to_string()).or_insert(0) += 1;
    }

    let checklist = board.items.iter().flat_map(|task| task.checklist.iter());
    let (checklist_done, checklist_total) =
        checklist.fold((0, 0), |(done, total), item| (done + usize::from(item.done), total + 1));

    BoardMetrics {
        total: board.items.len(),
        by_column,
        by_status,
        active_agents: active_agents(board).len(),
        checklist_done,
        checklist_total,
    }
}
