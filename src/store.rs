use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Backend, Config};
use crate::kv::Database;
use crate::local::LocalStore;
use crate::mirror::RemoteMirror;
use crate::models::{AddOutcome, CompanyEntry, FieldUpdate, NewEntry};
use crate::remote::DocumentStore;

/// How long a one-shot command waits for the first remote snapshot.
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// The collection capability shared by the local and remote backends.
///
/// Mutations report silent rejections through their return values rather
/// than as errors; `Err` is reserved for storage and transport failures.
pub trait CollectionStore {
    fn name(&self) -> &'static str;

    /// Current records in natural order: insertion order locally, creation
    /// time order for the remote mirror.
    fn entries(&mut self) -> Result<Vec<CompanyEntry>>;

    fn add(&mut self, entry: NewEntry) -> Result<AddOutcome>;

    /// `true` when a local record matched, or a remote request was issued.
    fn update(&mut self, id: &str, update: FieldUpdate) -> Result<bool>;

    fn delete(&mut self, id: &str) -> Result<bool>;

    /// Whether rows are shown through the sort view.
    fn sorts_view(&self) -> bool;
}

pub fn open(config: &Config) -> Result<Box<dyn CollectionStore>> {
    match config.backend {
        Backend::Local => {
            let db = Database::open(config.db_path.as_deref())?;
            info!(path = %db.path().display(), "using local store");
            Ok(Box::new(LocalStore::load(db)?))
        }
        Backend::Remote => {
            let remote = DocumentStore::new(&config.remote)?;
            let mut mirror = RemoteMirror::connect(remote)?;
            if !mirror.wait_for_snapshot(FIRST_SNAPSHOT_TIMEOUT) {
                warn!("no snapshot from remote collection yet, showing an empty list");
            }
            Ok(Box::new(mirror))
        }
    }
}
