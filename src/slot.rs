// Durable key-value slots

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A durable key-value slot holding serialized values under fixed keys
pub trait Slot {
    /// Read the value stored under `key`, `None` if nothing was ever written
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

impl<S: Slot + ?Sized> Slot for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }
}

/// Process-local slot, lost when dropped
#[derive(Debug, Default, Clone)]
pub struct MemorySlot {
    values: HashMap<String, String>,
    writes: usize,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-seeded with a single value
    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value.into());
        Self { values, writes: 0 }
    }

    /// Number of writes performed since creation
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Slot for MemorySlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// One `{key}.json` file per key inside a directory
///
/// Writes go to a temp file that is renamed over the target while holding an
/// exclusive lock on `{key}.lock`.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create slot directory")?;
        Ok(Self { dir })
    }

    pub fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_file(&self, key: &str) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(format!("{}.lock", key)))
            .context("Failed to open slot lock file")
    }
}

impl Slot for FileSlot {
    fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.value_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let lock = self.lock_file(key)?;
        lock.lock_shared().context("Failed to acquire shared slot lock")?;
        let value = fs::read_to_string(&path).with_context(|| format!("Failed to read slot file {:?}", path))?;
        Ok(Some(value))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.value_path(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));

        let lock = self.lock_file(key)?;
        lock.lock_exclusive().context("Failed to acquire slot lock")?;

        let mut tmp = File::create(&tmp_path).context("Failed to create temp slot file")?;
        tmp.write_all(value.as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &path).context("Failed to replace slot file")?;

        debug!(key, bytes = value.len(), "Wrote slot file");
        // Lock is released when `lock` is dropped
        Ok(())
    }
}

/// Slot keys end up in file names and table rows
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Slot key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Slot key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid slot key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_slot_counts_writes() {
        let mut slot = MemorySlot::new();
        assert!(slot.read("k").unwrap().is_none());

        slot.write("k", "[]").unwrap();
        slot.write("k", "[1]").unwrap();
        assert_eq!(slot.read("k").unwrap().as_deref(), Some("[1]"));
        assert_eq!(slot.writes(), 2);
    }

    #[test]
    fn test_memory_slot_with_value() {
        let slot = MemorySlot::with_value("k", "hello");
        assert_eq!(slot.read("k").unwrap().as_deref(), Some("hello"));
        assert_eq!(slot.writes(), 0);
    }

    #[test]
    fn test_file_slot_missing_key() {
        let temp = TempDir::new().unwrap();
        let slot = FileSlot::open(temp.path()).unwrap();
        assert!(slot.read("tasks").unwrap().is_none());
    }

    #[test]
    fn test_file_slot_write_and_reopen() {
        let temp = TempDir::new().unwrap();
        let mut slot = FileSlot::open(temp.path().join("nested")).unwrap();
        slot.write("tasks", "[\"a\"]").unwrap();
        slot.write("tasks", "[\"b\"]").unwrap();

        let reopened = FileSlot::open(temp.path().join("nested")).unwrap();
        assert_eq!(reopened.read("tasks").unwrap().as_deref(), Some("[\"b\"]"));
        assert!(!temp.path().join("nested/tasks.json.tmp").exists());
    }

    #[test]
    fn test_file_slot_rejects_bad_key() {
        let temp = TempDir::new().unwrap();
        let mut slot = FileSlot::open(temp.path()).unwrap();
        assert!(slot.write("../escape", "x").is_err());
        assert!(slot.read("").is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("taskManager_tasks").is_ok());
        assert!(validate_key("tasks-v2").is_ok());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_boxed_slot() {
        let mut slot: Box<dyn Slot> = Box::new(MemorySlot::new());
        slot.write("k", "v").unwrap();
        assert_eq!(slot.read("k").unwrap().as_deref(), Some("v"));
    }
}
