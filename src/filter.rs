// View filtering and ordering for tasks

use crate::models::Task;
use feruca::Collator;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Completion status filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn accepts(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

/// Ordering applied to the derived view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest first
    #[default]
    Created,
    /// High, medium, low
    Priority,
    Alphabetical,
}

impl SortOrder {
    pub fn compare(self, collator: &mut Collator, a: &Task, b: &Task) -> Ordering {
        match self {
            SortOrder::Created => b.created_at.cmp(&a.created_at),
            SortOrder::Priority => b.priority.rank().cmp(&a.priority.rank()),
            SortOrder::Alphabetical => collator.collate(a.title.as_str(), b.title.as_str()),
        }
    }
}

/// Filter, search and sort selection used to derive the visible task list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub filter: StatusFilter,
    pub sort: SortOrder,
    pub search: String,
}

impl ViewQuery {
    /// Status filter AND (empty query OR title/description match)
    pub fn matches(&self, task: &Task, needle: Option<&str>) -> bool {
        if !self.filter.accepts(task) {
            return false;
        }
        match needle {
            Some(needle) => task.matches_query(needle),
            None => true,
        }
    }

    /// Filter and sort `tasks` into a fresh vector. Sorting is stable, so equal
    /// keys keep their order from `tasks`.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        let needle = (!self.search.is_empty()).then(|| self.search.to_lowercase());
        let mut view: Vec<Task> = tasks
            .iter()
            .filter(|t| self.matches(t, needle.as_deref()))
            .cloned()
            .collect();
        let mut collator = Collator::default();
        view.sort_by(|a, b| self.sort.compare(&mut collator, a, b));
        view
    }

    pub fn is_narrowed(&self) -> bool {
        !self.search.is_empty() || self.filter != StatusFilter::All
    }
}

/// Compare titles with the CLDR root collation: accents and case are
/// secondary to the base letters, lowercase sorts before uppercase.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    Collator::default().collate(a, b)
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Active => write!(f, "active"),
            StatusFilter::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(eyre::eyre!("Unknown filter: {} (expected all, active or completed)", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Created => write!(f, "created"),
            SortOrder::Priority => write!(f, "priority"),
            SortOrder::Alphabetical => write!(f, "alphabetical"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(SortOrder::Created),
            "priority" => Ok(SortOrder::Priority),
            "alphabetical" => Ok(SortOrder::Alphabetical),
            other => Err(eyre::eyre!(
                "Unknown sort: {} (expected created, priority or alphabetical)",
                other
            )),
        }
    }
}
