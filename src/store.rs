// Task store: authoritative task list, view selection and persistence

use crate::filter::{SortOrder, StatusFilter, ViewQuery};
use crate::models::{Priority, Stats, Task, TaskPatch, normalize_description};
use crate::slot::{Slot, validate_key};
use chrono::Utc;
use eyre::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Key the task list is stored under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "taskManager_tasks";

/// Change notification delivered to subscribers after each mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added(String),
    Updated(String),
    Toggled { id: String, completed: bool },
    Deleted(String),
    /// Filter, sort or search selection changed
    ViewChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What an empty view should tell the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    NoTasks,
    NoResults,
    /// Only reachable with an unnarrowed active filter, which the empty-state
    /// order never yields; kept so every presentation message has a variant.
    AllComplete,
}

type Subscriber = Box<dyn FnMut(&StoreEvent)>;

/// Owns the task list and keeps it mirrored into a durable slot
///
/// Every mutation writes the whole list back to the slot before returning.
/// Write failures are logged and remembered but never abort the mutation.
pub struct TaskStore<S: Slot> {
    slot: S,
    key: String,
    tasks: Vec<Task>,
    query: ViewQuery,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    load_diagnostic: Option<String>,
    last_write_error: Option<String>,
}

impl<S: Slot> TaskStore<S> {
    /// Open a store over `slot` using the default storage key
    pub fn open(slot: S) -> Self {
        Self::hydrate(slot, DEFAULT_STORAGE_KEY.to_string())
    }

    /// Open a store over `slot` using a custom storage key
    pub fn open_with_key(slot: S, key: &str) -> Result<Self> {
        validate_key(key)?;
        Ok(Self::hydrate(slot, key.to_string()))
    }

    fn hydrate(slot: S, key: String) -> Self {
        let mut store = Self {
            slot,
            key,
            tasks: Vec::new(),
            query: ViewQuery::default(),
            subscribers: Vec::new(),
            next_subscription: 0,
            load_diagnostic: None,
            last_write_error: None,
        };

        match load_tasks(&store.slot, &store.key) {
            Ok(tasks) => {
                info!(key = %store.key, count = tasks.len(), "Loaded tasks");
                store.tasks = tasks;
            }
            Err(e) => {
                warn!(key = %store.key, error = ?e, "Failed to load tasks, starting empty");
                store.load_diagnostic = Some(format!("{:#}", e));
            }
        }

        store
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a task at the front of the list
    ///
    /// Returns `None` without touching the list or the slot when the title is
    /// blank.
    pub fn add(&mut self, title: &str, description: Option<&str>, priority: Priority) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            debug!("add: blank title, skipping");
            return None;
        }

        let task = Task::new(title.to_string(), normalize_description(description), priority);
        let id = task.id.clone();
        self.tasks.insert(0, task);
        debug!(id = %id, "add: created task");

        self.persist();
        self.notify(&StoreEvent::Added(id.clone()));
        Some(id)
    }

    /// Merge `patch` into the task with `id`
    ///
    /// Titles are not validated here; use `TaskPatch::edit` to build patches
    /// from user input. Returns false if no task has this id.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "update: no such task");
            return false;
        };
        patch.apply(task);

        self.persist();
        self.notify(&StoreEvent::Updated(id.to_string()));
        true
    }

    /// Flip completion, stamping or clearing `completed_at`
    pub fn toggle(&mut self, id: &str) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "toggle: no such task");
            return false;
        };

        task.completed = !task.completed;
        task.completed_at = if task.completed {
            // completed_at never precedes created_at
            Some(Utc::now().max(task.created_at))
        } else {
            None
        };
        let completed = task.completed;

        self.persist();
        self.notify(&StoreEvent::Toggled {
            id: id.to_string(),
            completed,
        });
        true
    }

    /// Remove a task permanently
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "delete: no such task");
            return false;
        };
        self.tasks.remove(pos);

        self.persist();
        self.notify(&StoreEvent::Deleted(id.to_string()));
        true
    }

    // ========================================================================
    // View selection (session-local, not persisted)
    // ========================================================================

    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.query.filter = filter;
        self.notify(&StoreEvent::ViewChanged);
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.query.sort = sort;
        self.notify(&StoreEvent::ViewChanged);
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.query.search = query.into();
        self.notify(&StoreEvent::ViewChanged);
    }

    pub fn filter(&self) -> StatusFilter {
        self.query.filter
    }

    pub fn sort(&self) -> SortOrder {
        self.query.sort
    }

    pub fn search_query(&self) -> &str {
        &self.query.search
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Filtered, searched and sorted projection of the task list
    pub fn view(&self) -> Vec<Task> {
        self.query.apply(&self.tasks)
    }

    /// Counts over the full list, ignoring the current view selection
    pub fn stats(&self) -> Stats {
        Stats::from_tasks(&self.tasks)
    }

    /// The authoritative list, newest insert first
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Classify an empty view. `None` while the view has tasks.
    pub fn empty_state(&self) -> Option<EmptyState> {
        if !self.view().is_empty() {
            return None;
        }
        let stats = self.stats();
        let state = if stats.total == 0 {
            EmptyState::NoTasks
        } else if self.query.is_narrowed() {
            EmptyState::NoResults
        } else if self.query.filter == StatusFilter::Active && stats.active == 0 {
            EmptyState::AllComplete
        } else {
            EmptyState::NoResults
        };
        Some(state)
    }

    /// Diagnostic recorded when the stored list could not be loaded
    pub fn load_diagnostic(&self) -> Option<&str> {
        self.load_diagnostic.as_deref()
    }

    /// Error from the most recent failed write, cleared by the next success
    pub fn last_write_error(&self) -> Option<&str> {
        self.last_write_error.as_deref()
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn into_slot(self) -> S {
        self.slot
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let callback: Subscriber = Box::new(callback);
        self.subscribers.push((id, callback));
        id
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn notify(&mut self, event: &StoreEvent) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(event);
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the current list to the slot, reporting failure to the caller
    pub fn flush(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.tasks).context("Failed to serialize tasks")?;
        self.slot
            .write(&self.key, &json)
            .with_context(|| format!("Failed to write tasks to slot {}", self.key))?;
        debug!(key = %self.key, count = self.tasks.len(), "Persisted tasks");
        Ok(())
    }

    fn persist(&mut self) {
        match self.flush() {
            Ok(()) => self.last_write_error = None,
            Err(e) => {
                error!(key = %self.key, error = ?e, "Failed to persist tasks");
                self.last_write_error = Some(format!("{:#}", e));
            }
        }
    }
}

/// Read and decode the task list stored under `key`
///
/// A missing value is an empty list. Later duplicates of an id are dropped.
pub fn load_tasks<S: Slot + ?Sized>(slot: &S, key: &str) -> Result<Vec<Task>> {
    let Some(json) = slot.read(key)? else {
        return Ok(Vec::new());
    };

    let mut tasks: Vec<Task> = serde_json::from_str(&json).context("Stored task list is not valid")?;
    // Older payloads may carry "" for a missing description
    for task in tasks.iter_mut() {
        task.description = normalize_description(task.description.as_deref());
    }

    let mut seen = HashSet::new();
    let total = tasks.len();
    let tasks: Vec<Task> = tasks.into_iter().filter(|t| seen.insert(t.id.clone())).collect();
    if tasks.len() != total {
        warn!(key, dropped = total - tasks.len(), "Dropped tasks with duplicate ids");
    }

    Ok(tasks)
}
