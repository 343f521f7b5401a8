//! View pipeline: turns the flat record list from the upstream into the
//! filtered, sorted, limited and nested view a panel renders.
//!
//! Stages run in a fixed order:
//! 1. [`filter`] drops records any active predicate rejects
//! 2. [`sort`] orders what remains
//! 3. the result is truncated to the panel limit
//! 4. [`tree`] links children under parents present in the window
//!
//! [`build`] is a pure function. It performs no I/O and holds no state, so
//! refreshes call it without any locking.

pub mod filter;
pub mod sort;
pub mod tree;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Label, Project, Task};

pub use filter::{DueFilter, FilterSet, Predicate};
pub use sort::{compare, sort_tasks};

/// Record count a panel shows when no positive limit is configured.
pub const DEFAULT_LIMIT: usize = 20;

/// How one panel shapes its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSpec {
    pub filters: FilterSet,
    /// Maximum number of records kept after sorting. Zero means
    /// [`DEFAULT_LIMIT`]; the view is never unbounded.
    pub limit: usize,
    /// Build the parent/child hierarchy. When false every record is a root.
    pub nest: bool,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self {
            filters: FilterSet::default(),
            limit: DEFAULT_LIMIT,
            nest: true,
        }
    }
}

impl ViewSpec {
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

/// Projects and labels used to decorate view nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Associations {
    /// Keyed by project id
    pub projects: HashMap<String, Project>,
    /// Keyed by label name, which is what tasks reference
    pub labels: HashMap<String, Label>,
}

impl Associations {
    pub fn new(projects: Vec<Project>, labels: Vec<Label>) -> Self {
        Self {
            projects: projects.into_iter().map(|p| (p.id.clone(), p)).collect(),
            labels: labels.into_iter().map(|l| (l.name.clone(), l)).collect(),
        }
    }

    fn project_for(&self, task: &Task) -> Option<Project> {
        task.project_id
            .as_deref()
            .and_then(|id| self.projects.get(id))
            .cloned()
    }

    fn labels_for(&self, task: &Task) -> Vec<Label> {
        task.labels
            .iter()
            .filter_map(|name| self.labels.get(name))
            .cloned()
            .collect()
    }
}

/// One rendered task and its subtasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskNode {
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    /// Some record in the window names this task as parent
    pub has_subtasks: bool,
    pub children: Vec<TaskNode>,
}

/// Run the full pipeline over `records`.
///
/// `today` anchors the due-date buckets; callers pass the local date so the
/// function itself stays deterministic.
pub fn build(
    records: Vec<Task>,
    spec: &ViewSpec,
    assoc: &Associations,
    today: NaiveDate,
) -> Vec<TaskNode> {
    let mut window = spec.filters.apply(records, today);
    sort_tasks(&mut window);
    window.truncate(spec.effective_limit());

    if spec.nest {
        nested(window, assoc)
    } else {
        flat(window, assoc)
    }
}

fn flat(window: Vec<Task>, assoc: &Associations) -> Vec<TaskNode> {
    let flags = tree::parent_flags(&window);
    window
        .into_iter()
        .zip(flags)
        .map(|(task, has_subtasks)| leaf(task, has_subtasks, assoc))
        .collect()
}

fn nested(window: Vec<Task>, assoc: &Associations) -> Vec<TaskNode> {
    let links = tree::link(&window);
    let mut slots: Vec<Option<Task>> = window.into_iter().map(Some).collect();
    let mut built: Vec<Option<TaskNode>> = slots.iter().map(|_| None).collect();
    let mut seen = vec![false; slots.len()];

    let mut roots = Vec::with_capacity(links.roots.len());
    for &root in &links.roots {
        // Post-order walk: children are built before the parent that owns them.
        let mut stack = vec![(root, false)];
        while let Some((i, expanded)) = stack.pop() {
            if expanded {
                let Some(task) = slots[i].take() else {
                    continue;
                };
                let children: Vec<TaskNode> = links.children[i]
                    .iter()
                    .filter_map(|&c| built[c].take())
                    .collect();
                let mut node = leaf(task, !children.is_empty(), assoc);
                node.children = children;
                built[i] = Some(node);
            } else if !seen[i] {
                seen[i] = true;
                stack.push((i, true));
                stack.extend(links.children[i].iter().rev().map(|&c| (c, false)));
            }
        }
        if let Some(node) = built[root].take() {
            roots.push(node);
        }
    }
    roots
}

fn leaf(task: Task, has_subtasks: bool, assoc: &Associations) -> TaskNode {
    TaskNode {
        project: assoc.project_for(&task),
        labels: assoc.labels_for(&task),
        has_subtasks,
        children: Vec::new(),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Due;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn task(id: &str, priority: u8, due: Option<(i32, u32, u32)>) -> Task {
        let mut t = Task::new(id, id);
        t.priority = priority;
        t.due = due.map(|(y, m, d)| Due::on(NaiveDate::from_ymd_opt(y, m, d).unwrap()));
        t
    }

    fn child(id: &str, parent: &str) -> Task {
        let mut t = task(id, 1, None);
        t.parent_id = Some(parent.to_string());
        t
    }

    fn root_ids(nodes: &[TaskNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.task.id.as_str()).collect()
    }

    fn count_nodes(nodes: &[TaskNode]) -> usize {
        nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
    }

    #[test]
    fn test_build_sorts_scenario() {
        let records = vec![
            task("C", 1, None),
            task("A", 4, Some((2024, 1, 1))),
            task("B", 4, Some((2024, 1, 2))),
        ];
        let spec = ViewSpec::default();
        let nodes = build(records, &spec, &Associations::default(), today());
        assert_eq!(root_ids(&nodes), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_build_missing_parent_is_lone_root() {
        let records = vec![child("X", "missing")];
        let nodes = build(
            records,
            &ViewSpec::default(),
            &Associations::default(),
            today(),
        );
        assert_eq!(root_ids(&nodes), vec!["X"]);
        assert!(nodes[0].children.is_empty());
        assert!(!nodes[0].has_subtasks);
    }

    #[test]
    fn test_limit_applies_before_hierarchy() {
        // The parent sorts last and falls outside a 2-record window.
        let records = vec![
            task("parent", 1, None),
            {
                let mut c = child("kid", "parent");
                c.priority = 4;
                c
            },
            task("other", 3, None),
        ];
        let spec = ViewSpec {
            limit: 2,
            ..ViewSpec::default()
        };
        let nodes = build(records, &spec, &Associations::default(), today());
        assert_eq!(root_ids(&nodes), vec!["kid", "other"]);
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let records: Vec<Task> = (0..30).map(|i| task(&format!("t{i}"), 1, None)).collect();
        let spec = ViewSpec {
            limit: 0,
            ..ViewSpec::default()
        };
        let nodes = build(records, &spec, &Associations::default(), today());
        assert_eq!(nodes.len(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_hierarchy_keeps_every_record_once() {
        let records = vec![
            task("p", 4, None),
            child("c1", "p"),
            child("c2", "p"),
            child("gc", "c1"),
            child("orphan", "gone"),
        ];
        let nodes = build(
            records,
            &ViewSpec::default(),
            &Associations::default(),
            today(),
        );
        assert_eq!(count_nodes(&nodes), 5);
        assert_eq!(root_ids(&nodes), vec!["p", "orphan"]);

        let p = &nodes[0];
        assert!(p.has_subtasks);
        assert_eq!(root_ids(&p.children), vec!["c1", "c2"]);
        assert_eq!(root_ids(&p.children[0].children), vec!["gc"]);
    }

    #[test]
    fn test_flat_rendition_keeps_subtask_flag() {
        let records = vec![task("p", 4, None), child("c", "p")];
        let spec = ViewSpec {
            nest: false,
            ..ViewSpec::default()
        };
        let nodes = build(records, &spec, &Associations::default(), today());
        assert_eq!(root_ids(&nodes), vec!["p", "c"]);
        assert!(nodes[0].has_subtasks);
        assert!(nodes.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn test_associations_decorate_nodes() {
        let mut t = task("t", 1, None);
        t.project_id = Some("p1".into());
        t.labels = vec!["home".into(), "unknown".into()];

        let project: Project =
            serde_json::from_value(serde_json::json!({"id": "p1", "name": "Inbox"})).unwrap();
        let label: Label =
            serde_json::from_value(serde_json::json!({"id": "l1", "name": "home"})).unwrap();
        let assoc = Associations::new(vec![project], vec![label]);

        let nodes = build(vec![t], &ViewSpec::default(), &assoc, today());
        assert_eq!(nodes[0].project.as_ref().map(|p| p.name.as_str()), Some("Inbox"));
        assert_eq!(nodes[0].labels.len(), 1);
        assert_eq!(nodes[0].labels[0].name, "home");
    }

    #[test]
    fn test_build_is_permutation_invariant() {
        let records = vec![
            task("a", 4, Some((2024, 1, 3))),
            child("b", "a"),
            task("c", 2, None),
            task("d", 2, Some((2024, 2, 1))),
        ];
        let spec = ViewSpec::default();
        let expected = build(records.clone(), &spec, &Associations::default(), today());

        let mut reversed = records.clone();
        reversed.reverse();
        let mut rotated = records;
        rotated.rotate_left(2);

        for input in [reversed, rotated] {
            let nodes = build(input, &spec, &Associations::default(), today());
            assert_eq!(nodes, expected);
        }
    }

    #[test]
    fn test_deep_subtask_chain_builds_without_recursion() {
        const DEPTH: usize = 5_000;
        let records: Vec<Task> = (0..DEPTH)
            .map(|i| {
                if i == 0 {
                    task("n0", 1, None)
                } else {
                    child(&format!("n{i}"), &format!("n{}", i - 1))
                }
            })
            .collect();
        let spec = ViewSpec {
            limit: DEPTH,
            ..ViewSpec::default()
        };
        let mut nodes = build(records, &spec, &Associations::default(), today());
        assert_eq!(root_ids(&nodes), vec!["n0"]);

        // Walk down and dismantle the chain one level at a time.
        let mut node = nodes.pop().unwrap();
        let mut depth = 1;
        while let Some(next) = node.children.pop() {
            assert!(node.has_subtasks);
            assert!(node.children.is_empty());
            assert_eq!(next.task.id, format!("n{depth}"));
            node = next;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert!(!node.has_subtasks);
    }
}
