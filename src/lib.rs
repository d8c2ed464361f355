// todostore - single-user task list with a durable key-value slot

pub mod config;
pub mod filter;
pub mod models;
pub mod slot;
pub mod sqlite;
pub mod store;

// Re-export main types for convenience
pub use config::{Backend, Config};
pub use filter::{SortOrder, StatusFilter, ViewQuery};
pub use models::{Priority, Stats, Task, TaskPatch};
pub use slot::{FileSlot, MemorySlot, Slot};
pub use sqlite::SqliteSlot;
pub use store::{DEFAULT_STORAGE_KEY, EmptyState, StoreEvent, SubscriptionId, TaskStore};
