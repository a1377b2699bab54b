use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::kv::KeyValueSlot;
use crate::models::{AddOutcome, CompanyEntry, FieldUpdate, NewEntry, Status};
use crate::store::CollectionStore;

/// Slot the whole collection is serialized into.
pub const STORAGE_KEY: &str = "companies";

/// In-memory collection mirrored in full to a key-value slot after every change.
pub struct LocalStore<S: KeyValueSlot> {
    slot: S,
    entries: Vec<CompanyEntry>,
}

impl<S: KeyValueSlot> LocalStore<S> {
    /// Reads the stored collection, assigns ids to records saved without one
    /// and writes the result straight back.
    pub fn load(slot: S) -> Result<Self> {
        let mut entries: Vec<CompanyEntry> = match slot.get(STORAGE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("Failed to parse stored companies")?,
            None => Vec::new(),
        };

        let mut backfilled = 0;
        for entry in entries.iter_mut().filter(|e| e.id.is_empty()) {
            entry.id = new_id();
            backfilled += 1;
        }
        if backfilled > 0 {
            info!(backfilled, "assigned ids to stored entries");
        }

        let store = Self { slot, entries };
        store.persist()?;
        debug!(count = store.entries.len(), "loaded local collection");
        Ok(store)
    }

    pub fn entries(&self) -> &[CompanyEntry] {
        &self.entries
    }

    pub fn add(&mut self, new: NewEntry) -> Result<AddOutcome> {
        if new.is_blank() {
            debug!("ignoring add with blank name");
            return Ok(AddOutcome::Blank);
        }
        if self.entries.iter().any(|e| e.name == new.name) {
            debug!(name = %new.name, "ignoring add with duplicate name");
            return Ok(AddOutcome::Duplicate);
        }

        let id = new_id();
        self.entries.push(CompanyEntry {
            id: id.clone(),
            name: new.name,
            status: Status::default(),
            note: new.note,
            interview_date: new.interview_date,
            created_at: None,
        });
        self.persist()?;
        Ok(AddOutcome::Added(id))
    }

    pub fn update(&mut self, id: &str, update: &FieldUpdate) -> Result<bool> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        update.apply(entry);
        self.persist()?;
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.entries).context("Failed to serialize companies")?;
        self.slot.set(STORAGE_KEY, &raw)?;
        debug!(count = self.entries.len(), "persisted local collection");
        Ok(())
    }
}

impl<S: KeyValueSlot> CollectionStore for LocalStore<S> {
    fn name(&self) -> &'static str {
        "local"
    }

    fn entries(&mut self) -> Result<Vec<CompanyEntry>> {
        Ok(self.entries.clone())
    }

    fn add(&mut self, entry: NewEntry) -> Result<AddOutcome> {
        LocalStore::add(self, entry)
    }

    fn update(&mut self, id: &str, update: FieldUpdate) -> Result<bool> {
        LocalStore::update(self, id, &update)
    }

    fn delete(&mut self, id: &str) -> Result<bool> {
        LocalStore::delete(self, id)
    }

    fn sorts_view(&self) -> bool {
        true
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
