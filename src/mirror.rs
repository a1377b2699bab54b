use anyhow::Result;
use std::time::Duration;
use tracing::debug;

use crate::models::{AddOutcome, CompanyEntry, FieldUpdate, NewEntry};
use crate::remote::{RemoteCollection, Subscription, CREATED_AT};
use crate::store::CollectionStore;

/// Local copy of a remote collection, kept current only by its snapshot feed.
///
/// Mutations are forwarded to the remote and never applied locally; they show
/// up once the remote delivers a snapshot containing them. Writes go out in
/// call order on the calling thread.
pub struct RemoteMirror<R: RemoteCollection> {
    remote: R,
    subscription: Subscription,
    entries: Vec<CompanyEntry>,
}

impl<R: RemoteCollection> RemoteMirror<R> {
    pub fn connect(remote: R) -> Result<Self> {
        let subscription = remote.subscribe(CREATED_AT, true)?;
        Ok(Self {
            remote,
            subscription,
            entries: Vec::new(),
        })
    }

    pub fn entries(&self) -> &[CompanyEntry] {
        &self.entries
    }

    /// Adopts the newest delivered snapshot, if any. Returns whether the
    /// mirror changed.
    pub fn refresh(&mut self) -> bool {
        match self.subscription.try_latest() {
            Some(snapshot) => self.replace(snapshot),
            None => false,
        }
    }

    /// Waits up to `timeout` for the next snapshot.
    pub fn wait_for_snapshot(&mut self, timeout: Duration) -> bool {
        match self.subscription.wait_latest(timeout) {
            Some(snapshot) => {
                self.replace(snapshot);
                true
            }
            None => false,
        }
    }

    fn replace(&mut self, snapshot: Vec<CompanyEntry>) -> bool {
        let changed = self.entries != snapshot;
        debug!(count = snapshot.len(), changed, "applied remote snapshot");
        self.entries = snapshot;
        changed
    }

    pub fn add(&self, new: NewEntry) -> Result<AddOutcome> {
        if new.is_blank() {
            debug!("ignoring add with blank name");
            return Ok(AddOutcome::Blank);
        }
        let id = self.remote.create(&new)?;
        Ok(AddOutcome::Added(id))
    }

    pub fn update(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        self.remote.update(id, update)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.remote.delete(id)
    }
}

impl<R: RemoteCollection> CollectionStore for RemoteMirror<R> {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn entries(&mut self) -> Result<Vec<CompanyEntry>> {
        self.refresh();
        Ok(self.entries.clone())
    }

    fn add(&mut self, entry: NewEntry) -> Result<AddOutcome> {
        RemoteMirror::add(self, entry)
    }

    fn update(&mut self, id: &str, update: FieldUpdate) -> Result<bool> {
        RemoteMirror::update(self, id, &update)?;
        Ok(true)
    }

    fn delete(&mut self, id: &str) -> Result<bool> {
        RemoteMirror::delete(self, id)?;
        Ok(true)
    }

    fn sorts_view(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Status;
    use crate::remote::Snapshot;
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Sender};
    use std::sync::Arc;

    /// In-process remote: documents live in a vector, and `publish` sends the
    /// current state to every subscriber the way a remote feed would.
    #[derive(Default)]
    pub(crate) struct FakeRemote {
        docs: RefCell<Vec<CompanyEntry>>,
        subscribers: RefCell<Vec<Sender<Snapshot>>>,
        cancelled: RefCell<Vec<Arc<AtomicBool>>>,
        next_id: RefCell<u32>,
        pub(crate) fail_writes: RefCell<bool>,
    }

    impl FakeRemote {
        pub(crate) fn publish(&self) {
            let snapshot = self.docs.borrow().clone();
            for tx in self.subscribers.borrow().iter() {
                let _ = tx.send(snapshot.clone());
            }
        }

        fn doc_count(&self) -> usize {
            self.docs.borrow().len()
        }

        fn check_writable(&self) -> Result<()> {
            if *self.fail_writes.borrow() {
                return Err(anyhow!("remote unavailable"));
            }
            Ok(())
        }
    }

    impl RemoteCollection for Rc<FakeRemote> {
        fn create(&self, entry: &NewEntry) -> Result<String> {
            self.check_writable()?;
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            let id = format!("doc{}", next);
            self.docs.borrow_mut().push(CompanyEntry {
                id: id.clone(),
                name: entry.name.clone(),
                status: Status::default(),
                note: entry.note.clone(),
                interview_date: entry.interview_date.clone(),
                created_at: Some(Utc.timestamp_opt(1_700_000_000 + *next as i64, 0).unwrap()),
            });
            Ok(id)
        }

        fn update(&self, id: &str, update: &FieldUpdate) -> Result<()> {
            self.check_writable()?;
            if let Some(doc) = self.docs.borrow_mut().iter_mut().find(|d| d.id == id) {
                update.apply(doc);
            }
            Ok(())
        }

        fn delete(&self, id: &str) -> Result<()> {
            self.check_writable()?;
            self.docs.borrow_mut().retain(|d| d.id != id);
            Ok(())
        }

        fn subscribe(&self, order_by: &str, ascending: bool) -> Result<Subscription> {
            assert_eq!(order_by, CREATED_AT);
            assert!(ascending);
            let (tx, rx) = mpsc::channel();
            let cancel = Arc::new(AtomicBool::new(false));
            self.subscribers.borrow_mut().push(tx);
            self.cancelled.borrow_mut().push(Arc::clone(&cancel));
            Ok(Subscription::new(rx, cancel))
        }
    }

    #[test]
    fn test_mutations_wait_for_the_feed() {
        let remote = Rc::new(FakeRemote::default());
        let mut mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();

        let outcome = mirror.add(NewEntry::new("Acme Co.").with_note("n")).unwrap();
        assert_eq!(outcome, AddOutcome::Added("doc1".to_string()));
        assert_eq!(remote.doc_count(), 1);
        assert!(mirror.entries().is_empty());
        assert!(!mirror.refresh());

        remote.publish();
        assert!(mirror.refresh());
        assert_eq!(mirror.entries().len(), 1);
        assert_eq!(mirror.entries()[0].name, "Acme Co.");
        assert_eq!(mirror.entries()[0].status, Status::SubmissionInProgress);

        mirror
            .update("doc1", &FieldUpdate::Status(Status::ThirdInterview))
            .unwrap();
        assert_eq!(mirror.entries()[0].status, Status::SubmissionInProgress);
        remote.publish();
        mirror.refresh();
        assert_eq!(mirror.entries()[0].status, Status::ThirdInterview);
        assert_eq!(mirror.entries()[0].note, "n");

        mirror.delete("doc1").unwrap();
        assert_eq!(mirror.entries().len(), 1);
        remote.publish();
        mirror.refresh();
        assert!(mirror.entries().is_empty());
    }

    #[test]
    fn test_blank_add_never_reaches_remote() {
        let remote = Rc::new(FakeRemote::default());
        let mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        assert_eq!(mirror.add(NewEntry::new("  ")).unwrap(), AddOutcome::Blank);
        assert_eq!(remote.doc_count(), 0);
    }

    #[test]
    fn test_remote_allows_duplicate_names() {
        let remote = Rc::new(FakeRemote::default());
        let mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        mirror.add(NewEntry::new("Acme Co.")).unwrap();
        mirror.add(NewEntry::new("Acme Co.")).unwrap();
        assert_eq!(remote.doc_count(), 2);
    }

    #[test]
    fn test_snapshot_order_is_kept_and_newest_wins() {
        let remote = Rc::new(FakeRemote::default());
        let mut mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        for name in ["Umbrella", "Acme Co."] {
            mirror.add(NewEntry::new(name)).unwrap();
            remote.publish();
        }
        assert!(mirror.wait_for_snapshot(Duration::from_millis(10)));
        let names: Vec<&str> = mirror.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Umbrella", "Acme Co."]);
    }

    #[test]
    fn test_failed_write_leaves_mirror_untouched() {
        let remote = Rc::new(FakeRemote::default());
        let mut mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        mirror.add(NewEntry::new("Acme Co.")).unwrap();
        remote.publish();
        mirror.refresh();
        let before = mirror.entries().to_vec();

        *remote.fail_writes.borrow_mut() = true;
        assert!(mirror.update("doc1", &FieldUpdate::Note("x".to_string())).is_err());
        assert!(mirror.delete("doc1").is_err());
        assert!(!mirror.refresh());
        assert_eq!(mirror.entries(), before.as_slice());
    }

    #[test]
    fn test_dropping_mirror_releases_subscription() {
        let remote = Rc::new(FakeRemote::default());
        {
            let _mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        }
        assert!(remote.cancelled.borrow()[0].load(Ordering::Relaxed));
    }
}
