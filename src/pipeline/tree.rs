//! Parent/child linking over a sorted, limited window of tasks.
//!
//! Works on indices into the window so the caller decides how nodes are
//! materialised. Every index ends up either as a root or as the child of
//! exactly one other index.

use std::collections::{HashMap, HashSet};

use crate::models::Task;

/// Resolved hierarchy for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    /// Root indices in window (sorted) order.
    pub roots: Vec<usize>,
    /// Child indices per index, in window order.
    pub children: Vec<Vec<usize>>,
}

/// Link `tasks` into a forest.
///
/// A task attaches to its parent only when the parent is present in the same
/// window. Tasks whose parent fell outside the window become roots. Tasks
/// stuck in a parent cycle are promoted to roots at the first member in
/// window order, which breaks the cycle there.
pub fn link(tasks: &[Task]) -> Links {
    // Pass 1: index by id. The first occurrence wins for duplicated ids.
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        index.entry(task.id.as_str()).or_insert(i);
    }

    // Pass 2: resolve each task's parent within the window.
    let mut parent: Vec<Option<usize>> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            task.parent_id
                .as_deref()
                .and_then(|pid| index.get(pid).copied())
                .filter(|&p| p != i)
        })
        .collect();

    let mut children = child_lists(&parent);

    let mut reached = vec![false; tasks.len()];
    for i in 0..tasks.len() {
        if parent[i].is_none() {
            mark(i, &children, &mut reached);
        }
    }

    // Anything unreached hangs off a cycle.
    for i in 0..tasks.len() {
        if reached[i] {
            continue;
        }
        if let Some(p) = parent[i].take() {
            children[p].retain(|&c| c != i);
        }
        mark(i, &children, &mut reached);
    }

    let roots = (0..tasks.len()).filter(|&i| parent[i].is_none()).collect();
    Links { roots, children }
}

/// True for every index some other task in the window names as parent.
///
/// Used by the flat rendition, where `children` are never populated.
pub fn parent_flags(tasks: &[Task]) -> Vec<bool> {
    let referenced: HashSet<&str> = tasks
        .iter()
        .filter_map(|t| t.parent_id.as_deref().filter(|pid| *pid != t.id))
        .collect();
    tasks
        .iter()
        .map(|t| referenced.contains(t.id.as_str()))
        .collect()
}

fn child_lists(parent: &[Option<usize>]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); parent.len()];
    for (i, p) in parent.iter().enumerate() {
        if let Some(p) = p {
            children[*p].push(i);
        }
    }
    children
}

fn mark(start: usize, children: &[Vec<usize>], reached: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(i) = stack.pop() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        stack.extend(children[i].iter().copied());
    }
}
