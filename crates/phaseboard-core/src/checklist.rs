use crate::store::Board;
use crate::task::ChecklistItem;

pub fn checklist_add(board: &mut Board, task_id: &str, text: &str) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    task.checklist.push(ChecklistItem {
        text: text.trim().to_string(),
        done: false,
    });
    task.touch();
    true
}

/// Index is signed so callers can pass raw user input; negatives fail like
/// any other out-of-range index.
pub fn checklist_complete(board: &mut Board, task_id: &str, index: i64) -> bool {
    let Some(task) = board.find_mut(task_id) else {
        return false;
    };
    let Ok(index) = usize::try_from(index) else {
        return false;
    };
    let Some(item) = task.checklist.get_mut(index) else {
        return false;
    };
    item.done = true;
    task.touch();
    true
}

pub fn checklist_list(board: &Board, task_id: &str) -> Option<Vec<ChecklistItem>> {
    board.find(task_id).map(|task| task.checklist.clone())
}
