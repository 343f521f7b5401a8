//! Record predicates.
//!
//! Every active predicate must accept a record for it to pass. Predicates
//! are independent, so the order they run in never changes the result.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Error;
use crate::models::{PRIORITY_MAX, PRIORITY_MIN, Task};

/// Due-date bucket a panel can restrict itself to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueFilter {
    #[default]
    All,
    Today,
    Overdue,
    /// Due today or later
    Upcoming,
    /// No due date at all
    None,
}

impl DueFilter {
    pub fn accepts(self, due: Option<NaiveDate>, today: NaiveDate) -> bool {
        match self {
            DueFilter::All => true,
            DueFilter::Today => due == Some(today),
            DueFilter::Overdue => due.is_some_and(|d| d < today),
            DueFilter::Upcoming => due.is_some_and(|d| d >= today),
            DueFilter::None => due.is_none(),
        }
    }
}

impl fmt::Display for DueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DueFilter::All => "all",
            DueFilter::Today => "today",
            DueFilter::Overdue => "overdue",
            DueFilter::Upcoming => "upcoming",
            DueFilter::None => "none",
        };
        f.write_str(s)
    }
}

impl FromStr for DueFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(DueFilter::All),
            "today" => Ok(DueFilter::Today),
            "overdue" => Ok(DueFilter::Overdue),
            "upcoming" => Ok(DueFilter::Upcoming),
            "none" => Ok(DueFilter::None),
            other => Err(Error::Config(format!("unknown due filter: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for DueFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Panel-configured filter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub show_completed: bool,
    /// Minimum priority (1-4); `None` or out-of-range disables the check
    pub priority_min: Option<u8>,
    pub due: DueFilter,
    /// Only these IDs pass; empty disables the check
    pub ids: Vec<String>,
}

/// One active predicate of a [`FilterSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    HideCompleted,
    MinPriority(u8),
    Due(DueFilter),
    Allowlist(HashSet<String>),
}

impl Predicate {
    pub fn accepts(&self, task: &Task, today: NaiveDate) -> bool {
        match self {
            Predicate::HideCompleted => !task.is_completed,
            Predicate::MinPriority(min) => task.priority >= *min,
            Predicate::Due(bucket) => bucket.accepts(task.due_date(), today),
            Predicate::Allowlist(ids) => ids.contains(&task.id),
        }
    }
}

impl FilterSet {
    /// The predicates this configuration switches on.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if !self.show_completed {
            predicates.push(Predicate::HideCompleted);
        }
        if let Some(min) = self
            .priority_min
            .filter(|p| (PRIORITY_MIN..=PRIORITY_MAX).contains(p))
        {
            predicates.push(Predicate::MinPriority(min));
        }
        if self.due != DueFilter::All {
            predicates.push(Predicate::Due(self.due));
        }
        if !self.ids.is_empty() {
            predicates.push(Predicate::Allowlist(self.ids.iter().cloned().collect()));
        }
        predicates
    }

    /// Keep only records every active predicate accepts, preserving order.
    pub fn apply(&self, tasks: Vec<Task>, today: NaiveDate) -> Vec<Task> {
        let predicates = self.predicates();
        if predicates.is_empty() {
            return tasks;
        }
        tasks
            .into_iter()
            .filter(|task| predicates.iter().all(|p| p.accepts(task, today)))
            .collect()
    }
}
