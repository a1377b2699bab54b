use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::models::{CompanyEntry, FieldUpdate, NewEntry, Status};

/// Field the mirror orders its subscription by.
pub const CREATED_AT: &str = "createdAt";

/// Full, ordered contents of the remote collection at one point in time.
pub type Snapshot = Vec<CompanyEntry>;

/// A remote document collection with create/update/delete and a live feed.
pub trait RemoteCollection {
    /// Creates a document holding `name`, `note`, `date` and a creation
    /// timestamp; returns the identifier the remote assigned.
    fn create(&self, entry: &NewEntry) -> Result<String>;

    /// Writes exactly one field of one document.
    fn update(&self, id: &str, update: &FieldUpdate) -> Result<()>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Opens a feed of full snapshots ordered by `order_by`.
    fn subscribe(&self, order_by: &str, ascending: bool) -> Result<Subscription>;
}

/// Receiving end of a snapshot feed. Dropping it releases the feed.
pub struct Subscription {
    rx: Receiver<Snapshot>,
    cancel: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new(rx: Receiver<Snapshot>, cancel: Arc<AtomicBool>) -> Self {
        Self { rx, cancel }
    }

    /// Drains everything already delivered and returns the newest snapshot.
    pub fn try_latest(&self) -> Option<Snapshot> {
        self.rx.try_iter().last()
    }

    /// Blocks until a snapshot arrives or `timeout` passes, then also drains
    /// anything queued behind it.
    pub fn wait_latest(&self, timeout: Duration) -> Option<Snapshot> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => Some(self.try_latest().unwrap_or(first)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// --- Document store over HTTP ---

/// Client for a document-store REST API (`documents` resources with typed
/// field values).
#[derive(Clone)]
pub struct DocumentStore {
    base_url: String,
    project: String,
    collection: String,
    api_key: Option<String>,
    poll_interval: Duration,
    client: reqwest::blocking::Client,
}

impl DocumentStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let project = config.project.clone().ok_or_else(|| {
            anyhow!("SHORTLIST_REMOTE_PROJECT is not set. Set it with: export SHORTLIST_REMOTE_PROJECT=your-project-id")
        })?;
        let client = reqwest::blocking::Client::builder()
            .user_agent("shortlist")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: config.base_url.clone(),
            project,
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval,
            client,
        })
    }

    fn database_path(&self) -> String {
        format!("{}/projects/{}/databases/(default)/documents", self.base_url, self.project)
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.database_path(), self.collection)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    fn with_key(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key)]),
            None => request,
        }
    }

    fn check(response: reqwest::blocking::Response, label: &str) -> Result<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        Err(anyhow!("{} failed with status {}: {}", label, status, error_text))
    }

    /// Runs the ordered collection query once.
    pub fn query(&self, order_by: &str, ascending: bool) -> Result<Snapshot> {
        let body = query_body(&self.collection, order_by, ascending);
        let response = self
            .with_key(self.client.post(format!("{}:runQuery", self.database_path())))
            .json(&body)
            .send()
            .context("Failed to send query to document store")?;
        let rows: Vec<QueryRow> = Self::check(response, "Query")?
            .json()
            .context("Failed to parse query response")?;

        rows.into_iter()
            .filter_map(|row| row.document)
            .map(|doc| doc.into_entry())
            .collect()
    }
}

impl RemoteCollection for DocumentStore {
    fn create(&self, entry: &NewEntry) -> Result<String> {
        let body = create_body(entry, Utc::now());
        debug!(name = %entry.name, "creating remote document");
        let response = self
            .with_key(self.client.post(self.collection_url()))
            .json(&body)
            .send()
            .context("Failed to send create to document store")?;
        let doc: Document = Self::check(response, "Create")?
            .json()
            .context("Failed to parse created document")?;
        Ok(doc.id().to_string())
    }

    fn update(&self, id: &str, update: &FieldUpdate) -> Result<()> {
        let field = update.field().remote_key();
        let body = update_body(update);
        debug!(id, field, "updating remote document");
        let response = self
            .with_key(self.client.patch(self.document_url(id)))
            .query(&update_params(update))
            .json(&body)
            .send()
            .context("Failed to send update to document store")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(id, "update target no longer exists");
            return Ok(());
        }
        Self::check(response, "Update")?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        debug!(id, "deleting remote document");
        let response = self
            .with_key(self.client.delete(self.document_url(id)))
            .send()
            .context("Failed to send delete to document store")?;
        Self::check(response, "Delete")?;
        Ok(())
    }

    /// The REST surface has no push channel, so the feed is a poller.
    fn subscribe(&self, order_by: &str, ascending: bool) -> Result<Subscription> {
        let store = self.clone();
        let order_by = order_by.to_string();
        spawn_poller(self.poll_interval, move || store.query(&order_by, ascending))
    }
}

/// Runs `query` on a worker thread every `interval` until the subscription
/// is cancelled or dropped. The first successful result is always sent;
/// after that only results that differ from the last one sent.
fn spawn_poller<F>(interval: Duration, mut query: F) -> Result<Subscription>
where
    F: FnMut() -> Result<Snapshot> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    thread::Builder::new()
        .name("shortlist-poll".to_string())
        .spawn(move || {
            let mut last: Option<Snapshot> = None;
            while !flag.load(Ordering::Relaxed) {
                match query() {
                    Ok(snapshot) if last.as_ref() != Some(&snapshot) => {
                        debug!(count = snapshot.len(), "remote snapshot changed");
                        if tx.send(snapshot.clone()).is_err() {
                            break;
                        }
                        last = Some(snapshot);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Polling remote collection failed: {:#}", e),
                }
                sleep_unless_cancelled(interval, &flag);
            }
            debug!("remote subscription closed");
        })
        .context("Failed to start subscription thread")?;

    Ok(Subscription::new(rx, cancel))
}

fn sleep_unless_cancelled(total: Duration, flag: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while !flag.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

/// New documents carry exactly these four fields; status is left unset and
/// reads back as the first stage.
fn create_body(entry: &NewEntry, created_at: DateTime<Utc>) -> Value {
    let created_at = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    json!({
        "fields": {
            "name": string_value(&entry.name),
            "note": string_value(&entry.note),
            "date": string_value(&entry.interview_date),
            CREATED_AT: { "timestampValue": created_at },
        }
    })
}

fn update_body(update: &FieldUpdate) -> Value {
    let field = update.field().remote_key();
    json!({ "fields": { field: string_value(update.value()) } })
}

/// The mask limits the write to one field; the precondition keeps a deleted
/// document from being recreated.
fn update_params(update: &FieldUpdate) -> [(&'static str, &'static str); 2] {
    [
        ("updateMask.fieldPaths", update.field().remote_key()),
        ("currentDocument.exists", "true"),
    ]
}

fn query_body(collection: &str, order_by: &str, ascending: bool) -> Value {
    let direction = if ascending { "ASCENDING" } else { "DESCENDING" };
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{
                "field": { "fieldPath": order_by },
                "direction": direction,
            }],
        }
    })
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    /// Full resource name; the id is its last path segment.
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn text(&self, key: &str) -> String {
        self.fields
            .get(key)
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn into_entry(self) -> Result<CompanyEntry> {
        let created_at = match self
            .fields
            .get(CREATED_AT)
            .and_then(|v| v.get("timestampValue"))
            .and_then(Value::as_str)
        {
            Some(ts) => Some(
                DateTime::parse_from_rfc3339(ts)
                    .with_context(|| format!("Invalid createdAt '{}' on {}", ts, self.name))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        let status = match self.text("status") {
            s if s.is_empty() => Status::default(),
            s => Status::from_label(&s),
        };
        Ok(CompanyEntry {
            id: self.id().to_string(),
            name: self.text("name"),
            status,
            note: self.text("note"),
            interview_date: self.text("date"),
            created_at,
        })
    }
}
