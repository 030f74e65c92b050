use std::cmp::Ordering;

use crate::column::COL_BACKLOG;
use crate::store::Board;
use crate::task::{Status, Task};

/// Ready backlog tasks, highest priority first, then the one waiting
/// longest. Unparseable timestamps sort as oldest.
pub fn ranked_candidates(board: &Board) -> Vec<&Task> {
    let mut candidates: Vec<&Task> = board
        .items
        .iter()
        .filter(|task| task.column_id == COL_BACKLOG && task.status == Status::Ready)
        .collect();
    candidates.sort_by(|a, b| compare_for_pick(a, b));
    candidates
}

/// Next task to work.
pub fn pick_task(board: &Board) -> Option<&Task> {
    ranked_candidates(board).into_iter().next()
}

fn compare_for_pick(a: &Task, b: &Task) -> Ordering {
    a.priority
        .rank()
        .cmp(&b.priority.rank())
        .then_with(|| a.updated_at_parsed().cmp(&b.updated_at_parsed()))
}
