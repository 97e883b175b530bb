//! Persistence for Selections patched during healing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::domain::{Result, Selection};

#[async_trait]
pub trait SelectionStore: Send + Sync {
    /// Replace the stored Selection for `(segment, run_date)`.
    async fn save(&self, selection: &Selection, run_date: NaiveDate) -> Result<()>;

    async fn load(&self, segment_id: &str, run_date: NaiveDate) -> Result<Option<Selection>>;
}

/// In-memory store; the default for a single run.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    selections: Mutex<HashMap<(String, NaiveDate), Selection>>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.selections.lock().await.len()
    }
}

#[async_trait]
impl SelectionStore for MemorySelectionStore {
    async fn save(&self, selection: &Selection, run_date: NaiveDate) -> Result<()> {
        self.selections
            .lock()
            .await
            .insert((selection.segment_id.clone(), run_date), selection.clone());
        Ok(())
    }

    async fn load(&self, segment_id: &str, run_date: NaiveDate) -> Result<Option<Selection>> {
        Ok(self
            .selections
            .lock()
            .await
            .get(&(segment_id.to_string(), run_date))
            .cloned())
    }
}

/// Stores `<dir>/<date>/<segment>/selection.json`.
#[derive(Debug, Clone)]
pub struct JsonSelectionStore {
    dir: PathBuf,
}

impl JsonSelectionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, segment_id: &str, run_date: NaiveDate) -> PathBuf {
        self.dir
            .join(run_date.format("%Y-%m-%d").to_string())
            .join(segment_id)
            .join("selection.json")
    }
}

#[async_trait]
impl SelectionStore for JsonSelectionStore {
    async fn save(&self, selection: &Selection, run_date: NaiveDate) -> Result<()> {
        let path = self.path_for(&selection.segment_id, run_date);
        write_selection(selection, &path).await
    }

    async fn load(&self, segment_id: &str, run_date: NaiveDate) -> Result<Option<Selection>> {
        let path = self.path_for(segment_id, run_date);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        read_selection(&path).await.map(Some)
    }
}

/// Write a Selection as pretty JSON, creating parent directories.
pub async fn write_selection(selection: &Selection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(selection)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn read_selection(path: &Path) -> Result<Selection> {
    let json = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Item, SelectedItem, Tier};
    use chrono::{TimeZone, Utc};

    fn selection() -> Selection {
        let published = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).single().expect("ts");
        let item = Item::new("https://example.com/a", "A", "Blog", "ai", published);
        let mut entry = SelectedItem::new(item, Tier::Full, "🔐 Security", 8);
        entry.summary = "Patched summary.".into();
        Selection::new("builders", vec![entry]).with_pool_size(40)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    #[tokio::test]
    async fn test_memory_store_replaces() {
        let store = MemorySelectionStore::new();
        let mut s = selection();
        store.save(&s, date()).await.expect("save");
        s.items[0].summary = "Second.".into();
        store.save(&s, date()).await.expect("save");
        assert_eq!(store.len().await, 1);
        let loaded = store.load("builders", date()).await.expect("load").expect("some");
        assert_eq!(loaded.items[0].summary, "Second.");
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonSelectionStore::new(dir.path());
        assert!(store.load("builders", date()).await.expect("load").is_none());

        store.save(&selection(), date()).await.expect("save");
        let loaded = store.load("builders", date()).await.expect("load").expect("some");
        assert_eq!(loaded, selection());
        assert_eq!(loaded.pool_size, 40);
        assert!(dir
            .path()
            .join("2026-10-18/builders/selection.json")
            .exists());
    }
}
