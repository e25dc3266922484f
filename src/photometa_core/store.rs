use crate::photometa_core::media::{EntryId, ImageMetadataEntry};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Entries {
    by_id: HashMap<EntryId, ImageMetadataEntry>,
    /// Submission order, for stable snapshots.
    order: Vec<EntryId>,
    /// Ids removed by the user; late writes for them are dropped.
    removed: HashSet<EntryId>,
}

/// The collection of entries shared by the pipeline workers and readers.
///
/// Entries are always replaced as whole values, so a reader never sees a
/// half-written record. Readers get clones, never references into the store.
#[derive(Default)]
pub struct EntryStore {
    inner: Mutex<Entries>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panicking writer cannot leave an entry half-replaced
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace the entry with this id.
    ///
    /// A terminal entry is final: replacing it with a different status is
    /// refused and `false` is returned. Writes for removed ids are refused
    /// too, so a pipeline still running cannot bring an entry back.
    pub fn upsert(&self, entry: ImageMetadataEntry) -> bool {
        let mut entries = self.lock();

        if entries.removed.contains(&entry.id) {
            log::debug!(
                "Dropping {} update for removed {}",
                entry.status.as_str(),
                entry.basic_info.file_name
            );
            return false;
        }

        if let Some(existing) = entries.by_id.get(&entry.id) {
            if existing.status.is_terminal() && existing.status != entry.status {
                log::warn!(
                    "Refusing to move {} from {} to {}",
                    existing.basic_info.file_name,
                    existing.status.as_str(),
                    entry.status.as_str()
                );
                return false;
            }
        } else {
            entries.order.push(entry.id);
        }

        entries.by_id.insert(entry.id, entry);
        true
    }

    pub fn get(&self, id: &EntryId) -> Option<ImageMetadataEntry> {
        self.lock().by_id.get(id).cloned()
    }

    /// All entries in submission order.
    pub fn snapshot(&self) -> Vec<ImageMetadataEntry> {
        let entries = self.lock();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub fn remove(&self, id: &EntryId) -> Option<ImageMetadataEntry> {
        let mut entries = self.lock();
        let removed = entries.by_id.remove(id)?;
        entries.order.retain(|other| other != id);
        entries.removed.insert(*id);
        Some(removed)
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        let ids: Vec<EntryId> = entries.order.drain(..).collect();
        entries.removed.extend(ids);
        entries.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
