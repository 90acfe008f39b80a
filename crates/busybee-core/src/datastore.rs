use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::item::{Item, Recurrence};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub items_path: PathBuf,
    pub recurrences_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let items_path = data_dir.join("items.data");
        let recurrences_path = data_dir.join("recurrences.data");

        if !items_path.exists() {
            fs::write(&items_path, "")?;
        }
        if !recurrences_path.exists() {
            fs::write(&recurrences_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            items = %items_path.display(),
            recurrences = %recurrences_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            items_path,
            recurrences_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_items(&self) -> anyhow::Result<Vec<Item>> {
        load_jsonl(&self.items_path).context("failed to load items.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_recurrences(&self) -> anyhow::Result<Vec<Recurrence>> {
        load_jsonl(&self.recurrences_path).context("failed to load recurrences.data")
    }

    #[tracing::instrument(skip(self, items))]
    pub fn save_items(&self, items: &[Item]) -> anyhow::Result<()> {
        let mut sorted = items.to_vec();
        sorted.sort_by_key(|item| item.id);
        save_jsonl_atomic(&self.items_path, &sorted).context("failed to save items.data")
    }

    #[tracing::instrument(skip(self, recurrences))]
    pub fn save_recurrences(&self, recurrences: &[Recurrence]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.recurrences_path, recurrences)
            .context("failed to save recurrences.data")
    }

    pub fn next_id(&self, items: &[Item]) -> u64 {
        items.iter().map(|item| item.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self))]
    pub fn get_item(&self, id: u64) -> anyhow::Result<Option<Item>> {
        Ok(self.load_items()?.into_iter().find(|item| item.id == id))
    }

    #[tracing::instrument(skip(self, item), fields(id = item.id, uuid = %item.uuid))]
    pub fn create_item(&self, item: Item) -> anyhow::Result<()> {
        let mut items = self.load_items()?;
        if items.iter().any(|existing| existing.id == item.id) {
            return Err(anyhow!("item id {} already exists", item.id));
        }
        items.push(item);
        self.save_items(&items)
    }

    #[tracing::instrument(skip(self, item), fields(id = item.id))]
    pub fn update_item(&self, item: &Item) -> anyhow::Result<()> {
        let mut items = self.load_items()?;
        let slot = items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or_else(|| anyhow!("item not found: {}", item.id))?;
        *slot = item.clone();
        self.save_items(&items)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_item(&self, id: u64) -> anyhow::Result<Item> {
        let mut items = self.load_items()?;
        let idx = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| anyhow!("item not found: {id}"))?;
        let removed = items.remove(idx);
        self.save_items(&items)?;
        Ok(removed)
    }

    #[tracing::instrument(skip(self), fields(recurrence_id = %id))]
    pub fn get_recurrence(&self, id: Uuid) -> anyhow::Result<Option<Recurrence>> {
        Ok(self
            .load_recurrences()?
            .into_iter()
            .find(|recurrence| recurrence.id == id))
    }

    #[tracing::instrument(skip(self, recurrence), fields(recurrence_id = %recurrence.id))]
    pub fn create_recurrence(&self, recurrence: Recurrence) -> anyhow::Result<()> {
        let mut recurrences = self.load_recurrences()?;
        recurrences.push(recurrence);
        self.save_recurrences(&recurrences)
    }

    #[tracing::instrument(skip(self), fields(recurrence_id = %id))]
    pub fn delete_recurrence(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut recurrences = self.load_recurrences()?;
        let before = recurrences.len();
        recurrences.retain(|recurrence| recurrence.id != id);
        let removed = recurrences.len() != before;
        if removed {
            self.save_recurrences(&recurrences)?;
        }
        Ok(removed)
    }

    /// Drops recurrence records no item points at anymore.
    #[tracing::instrument(skip(self))]
    pub fn purge_orphan_recurrences(&self) -> anyhow::Result<usize> {
        let items = self.load_items()?;
        let recurrences = self.load_recurrences()?;
        let before_count = recurrences.len();
        let kept: Vec<Recurrence> = recurrences
            .into_iter()
            .filter(|recurrence| {
                items
                    .iter()
                    .any(|item| item.recurrence_id == Some(recurrence.id))
            })
            .collect();
        let purged = before_count - kept.len();
        if purged > 0 {
            info!(
                before = before_count,
                after = kept.len(),
                "purged orphan recurrences"
            );
            self.save_recurrences(&kept)?;
        }
        Ok(purged)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::DataStore;
    use crate::item::{Item, ItemKind, Recurrence};
    use crate::recurrence::{Frequency, RecurrenceRule};

    #[test]
    fn item_crud_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let now = Utc::now();

        let mut item = Item::new(ItemKind::Task, "Water plants".to_string(), now, 1);
        item.categories.insert("home".to_string());
        store.create_item(item.clone()).expect("create");
        assert!(store.create_item(item.clone()).is_err(), "duplicate id rejected");

        item.complete = true;
        store.update_item(&item).expect("update");
        let loaded = store.get_item(1).expect("get").expect("present");
        assert!(loaded.complete);
        assert!(loaded.categories.contains("home"));

        store.delete_item(1).expect("delete");
        assert!(store.get_item(1).expect("get").is_none());
        assert!(store.delete_item(1).is_err());
    }

    #[test]
    fn orphan_recurrences_are_purged() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let now = Utc::now();

        let rule = RecurrenceRule::new(Frequency::Weekly, 2).expect("rule");
        let linked = Recurrence::new(rule, now);
        let orphan = Recurrence::new(rule, now);
        store.create_recurrence(linked.clone()).expect("linked");
        store.create_recurrence(orphan.clone()).expect("orphan");

        let mut item = Item::new(ItemKind::Event, "Standup".to_string(), now, 1);
        item.recurrence_id = Some(linked.id);
        store.create_item(item).expect("create");

        assert_eq!(store.purge_orphan_recurrences().expect("purge"), 1);
        assert!(store.get_recurrence(linked.id).expect("get").is_some());
        assert!(store.get_recurrence(orphan.id).expect("get").is_none());
    }
}
