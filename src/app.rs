use anyhow::Result;
use tracing::info;

use crate::models::{AddOutcome, CompanyEntry, FieldUpdate, NewEntry, SortKey, SortOrder};
use crate::prompt::Prompt;
use crate::sort::sorted_view;
use crate::store::CollectionStore;

pub const ADDED_NOTICE: &str = "Company added!";
pub const DELETE_QUESTION: &str = "Delete this company entry?";

/// Controller owning all view state. Every write goes through its methods,
/// and `rows` recomputes the display order from current state on each call.
pub struct App {
    store: Box<dyn CollectionStore>,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub draft: NewEntry,
}

impl App {
    pub fn new(store: Box<dyn CollectionStore>) -> Self {
        Self {
            store,
            sort_key: SortKey::default(),
            sort_order: SortOrder::default(),
            draft: NewEntry::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn sorts_view(&self) -> bool {
        self.store.sorts_view()
    }

    pub fn rows(&mut self) -> Result<Vec<CompanyEntry>> {
        let entries = self.store.entries()?;
        if self.store.sorts_view() {
            Ok(sorted_view(&entries, self.sort_key, self.sort_order))
        } else {
            Ok(entries)
        }
    }

    pub fn find(&mut self, id: &str) -> Result<Option<CompanyEntry>> {
        Ok(self.store.entries()?.into_iter().find(|e| e.id == id))
    }

    /// Adds the draft. The draft is cleared only when the add happened.
    pub fn submit_draft(&mut self, prompt: &mut dyn Prompt) -> Result<AddOutcome> {
        let outcome = self.store.add(self.draft.clone())?;
        if let AddOutcome::Added(id) = &outcome {
            info!(id = %id, backend = self.store.name(), "added entry");
            self.draft = NewEntry::default();
            prompt.acknowledge(ADDED_NOTICE);
        }
        Ok(outcome)
    }

    pub fn update_field(&mut self, id: &str, update: FieldUpdate) -> Result<bool> {
        let field = update.field();
        let matched = self.store.update(id, update)?;
        if matched {
            info!(id, field = field.key(), "updated entry");
        }
        Ok(matched)
    }

    /// Deletes after the user confirms; declining leaves everything as is.
    pub fn delete(&mut self, id: &str, prompt: &mut dyn Prompt) -> Result<bool> {
        if !prompt.confirm(DELETE_QUESTION) {
            return Ok(false);
        }
        let removed = self.store.delete(id)?;
        if removed {
            info!(id, "deleted entry");
        }
        Ok(removed)
    }

    pub fn set_sort(&mut self, key: SortKey, order: SortOrder) {
        self.sort_key = key;
        self.sort_order = order;
    }

    pub fn cycle_sort_key(&mut self) {
        self.sort_key = self.sort_key.cycle();
    }

    pub fn toggle_order(&mut self) {
        self.sort_order = self.sort_order.toggle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Database;
    use crate::local::LocalStore;
    use crate::mirror::tests::FakeRemote;
    use crate::mirror::RemoteMirror;
    use crate::models::Status;
    use crate::prompt::Answered;
    use std::rc::Rc;

    fn local_app() -> App {
        let store = LocalStore::load(Database::open_in_memory().unwrap()).unwrap();
        App::new(Box::new(store))
    }

    fn add(app: &mut App, name: &str, date: &str) -> String {
        app.draft = NewEntry::new(name).with_interview_date(date);
        match app.submit_draft(&mut Answered::yes()).unwrap() {
            AddOutcome::Added(id) => id,
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_add_update_delete_end_to_end() {
        let mut app = local_app();
        let mut prompt = Answered::yes();

        app.draft = NewEntry::new("Acme Co.");
        let AddOutcome::Added(id) = app.submit_draft(&mut prompt).unwrap() else {
            panic!("add was rejected");
        };
        assert_eq!(prompt.notices, [ADDED_NOTICE]);
        assert_eq!(app.draft, NewEntry::default());

        let rows = app.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Acme Co.");
        assert_eq!(rows[0].status, Status::SubmissionInProgress);
        assert_eq!(rows[0].note, "");
        assert_eq!(rows[0].interview_date, "");

        assert!(app.update_field(&id, FieldUpdate::Status(Status::FirstInterview)).unwrap());
        let rows = app.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, Status::FirstInterview);
        assert_eq!(rows[0].name, "Acme Co.");
        assert_eq!(rows[0].note, "");
        assert_eq!(rows[0].interview_date, "");

        assert!(app.delete(&id, &mut prompt).unwrap());
        assert!(app.rows().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_add_keeps_draft_and_stays_quiet() {
        let mut app = local_app();
        add(&mut app, "Acme Co.", "");

        let mut prompt = Answered::yes();
        app.draft = NewEntry::new("Acme Co.").with_note("second try");
        assert_eq!(app.submit_draft(&mut prompt).unwrap(), AddOutcome::Duplicate);
        assert_eq!(app.draft.note, "second try");

        app.draft = NewEntry::new(" ");
        assert_eq!(app.submit_draft(&mut prompt).unwrap(), AddOutcome::Blank);
        assert!(prompt.notices.is_empty());
        assert_eq!(app.rows().unwrap().len(), 1);
    }

    #[test]
    fn test_declined_delete_keeps_entry() {
        let mut app = local_app();
        let id = add(&mut app, "Acme Co.", "");
        assert!(!app.delete(&id, &mut Answered::default()).unwrap());
        assert_eq!(app.rows().unwrap().len(), 1);
        assert!(!app.delete("missing", &mut Answered::yes()).unwrap());
        assert_eq!(app.rows().unwrap().len(), 1);
    }

    #[test]
    fn test_rows_follow_sort_state() {
        let mut app = local_app();
        add(&mut app, "Umbrella", "2025-04-01");
        add(&mut app, "acme", "");
        add(&mut app, "Globex", "2025-03-01");

        let names = |app: &mut App| -> Vec<String> {
            app.rows().unwrap().into_iter().map(|e| e.name).collect()
        };
        assert_eq!(names(&mut app), ["acme", "Globex", "Umbrella"]);

        app.toggle_order();
        assert_eq!(names(&mut app), ["Umbrella", "Globex", "acme"]);

        app.set_sort(SortKey::InterviewDate, SortOrder::Asc);
        assert_eq!(names(&mut app), ["acme", "Globex", "Umbrella"]);

        app.cycle_sort_key();
        assert_eq!(app.sort_key, SortKey::Status);
        app.cycle_sort_key();
        assert_eq!(app.sort_key, SortKey::Name);
    }

    #[test]
    fn test_remote_rows_ignore_sort_state() {
        let remote = Rc::new(FakeRemote::default());
        let mirror = RemoteMirror::connect(Rc::clone(&remote)).unwrap();
        let mut app = App::new(Box::new(mirror));
        assert!(!app.sorts_view());
        assert_eq!(app.backend_name(), "remote");

        add(&mut app, "Umbrella", "");
        add(&mut app, "Acme Co.", "");
        assert!(app.rows().unwrap().is_empty());

        remote.publish();
        app.set_sort(SortKey::Name, SortOrder::Asc);
        let names: Vec<String> = app.rows().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["Umbrella", "Acme Co."]);

        let id = app.rows().unwrap()[0].id.clone();
        assert!(app.update_field(&id, FieldUpdate::Note("x".to_string())).unwrap());
        assert_eq!(app.find(&id).unwrap().map(|e| e.note), Some(String::new()));
        remote.publish();
        assert_eq!(app.find(&id).unwrap().map(|e| e.note), Some("x".to_string()));
    }
}
