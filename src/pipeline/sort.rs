//! Display ordering for task records.

use std::cmp::Ordering;

use crate::models::Task;

/// Compare two tasks by, in order of precedence:
/// 1. completion (incomplete first)
/// 2. priority (higher first)
/// 3. due date (earlier first; undated after every dated task)
/// 4. upstream `order` (ascending)
pub fn compare(a: &Task, b: &Task) -> Ordering {
    a.is_completed
        .cmp(&b.is_completed)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| match (a.due_date(), b.due_date()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.order.cmp(&b.order))
}

/// Stable sort; tasks equal on every key keep their input order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare);
}
