//! In-memory document cache with snapshot-based dirty detection.
//!
//! The collection owns one shared observable cell per document id, plus one
//! recorded snapshot digest per id marking the last state confirmed by the
//! remote store. "Dirty" is always judged against that snapshot, never
//! against the last value pushed into the cell: local mutations that converge
//! back to the snapshot hash are clean again.
//!
//! There is no per-document eviction. The collection is an unbounded,
//! session-lifetime cache; [`DocumentCollection::clear`] is the only way to
//! drop entries.

pub mod hash;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::document::Document;
use crate::error::Error;

pub use hash::snapshot_digest;

/// The single shared observable cell representing one document's live value.
///
/// Every caller that resolves the same id receives a clone of the same cell,
/// so an update from any source (local edit, remote change notification) is
/// visible to all observers.
#[derive(Debug, Clone)]
pub struct DocumentCell {
    tx: Arc<watch::Sender<Document>>,
}

impl DocumentCell {
    fn new(document: Document) -> Self {
        let (tx, _rx) = watch::channel(document);
        Self { tx: Arc::new(tx) }
    }

    /// The current value held by the cell.
    pub fn get(&self) -> Document {
        self.tx.borrow().clone()
    }

    /// Subscribe to subsequent values pushed into the cell.
    pub fn watch(&self) -> watch::Receiver<Document> {
        self.tx.subscribe()
    }

    /// Push a new value into the cell, waking all observers.
    pub fn set(&self, document: Document) {
        self.tx.send_replace(document);
    }

    /// True iff both handles point at the identical underlying cell.
    pub fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    cells: HashMap<String, DocumentCell>,
    snapshots: HashMap<String, String>,
}

impl CollectionState {
    fn is_dirty(&self, document: &Document) -> bool {
        if document.is_pre_document() {
            return true;
        }
        let Some(id) = document.id() else {
            return true;
        };
        match self.snapshots.get(id) {
            None => true,
            Some(recorded) => *recorded != snapshot_digest(document),
        }
    }
}

/// The set of known documents, keyed by `_id`.
///
/// Cheaply cloneable; clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct DocumentCollection {
    state: Arc<Mutex<CollectionState>>,
    ids: Arc<watch::Sender<Vec<String>>>,
}

impl Default for DocumentCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentCollection {
    pub fn new() -> Self {
        let (ids, _rx) = watch::channel(Vec::new());
        Self { state: Arc::new(Mutex::new(CollectionState::default())), ids: Arc::new(ids) }
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True iff a cell exists for `id`.
    pub fn is_known(&self, id: &str) -> bool {
        self.state().cells.contains_key(id)
    }

    /// Whether `document` diverges from the last recorded snapshot.
    ///
    /// `None` is treated as "nothing to do" and reports clean rather than
    /// erroring, so absent references can be forwarded through synchronous
    /// call chains. Every pre-document is dirty by definition, as is any
    /// document whose id has no recorded snapshot.
    pub fn is_dirty(&self, document: Option<&Document>) -> bool {
        let Some(document) = document else {
            return false;
        };
        self.state().is_dirty(document)
    }

    /// Overwrite the snapshot for the document's id with the digest of its
    /// current fields (revision stripped). Returns the digest, or `None`
    /// when the document carries no id.
    pub fn record_snapshot(&self, document: &Document) -> Option<String> {
        let id = document.id()?.to_string();
        let digest = snapshot_digest(document);
        self.state().snapshots.insert(id, digest.clone());
        Some(digest)
    }

    /// The existing cell for `id`, if any.
    pub fn cell(&self, id: &str) -> Option<DocumentCell> {
        self.state().cells.get(id).cloned()
    }

    /// Resolve a full document into the collection.
    ///
    /// Known and dirty: the new value is pushed into the existing cell and a
    /// fresh snapshot is recorded. Known and clean: the existing cell is
    /// returned untouched. Unknown: a new cell is created, the id-set is
    /// re-emitted, and a snapshot is recorded.
    pub fn resolve(&self, document: Document) -> Result<DocumentCell, Error> {
        let id = document.id().ok_or(Error::MissingId)?.to_string();
        let mut state = self.state();

        if let Some(cell) = state.cells.get(&id).cloned() {
            if state.is_dirty(&document) {
                state.snapshots.insert(id.clone(), snapshot_digest(&document));
                drop(state);
                cell.set(document);
                tracing::debug!(%id, "document cell updated");
            }
            return Ok(cell);
        }

        state.snapshots.insert(id.clone(), snapshot_digest(&document));
        let cell = DocumentCell::new(document);
        state.cells.insert(id.clone(), cell.clone());

        let mut ids: Vec<String> = state.cells.keys().cloned().collect();
        ids.sort();
        drop(state);

        self.ids.send_replace(ids);
        tracing::debug!(%id, "document added to collection");
        Ok(cell)
    }

    /// Subscribe to the ordered set of known ids, re-emitted on every
    /// insertion. Sorted for determinism only; the order carries no meaning.
    pub fn ids(&self) -> watch::Receiver<Vec<String>> {
        self.ids.subscribe()
    }

    /// The current id-set.
    pub fn ids_now(&self) -> Vec<String> {
        self.ids.borrow().clone()
    }

    /// Drop every entry and snapshot and reset the id-set to empty.
    pub fn clear(&self) {
        let mut state = self.state();
        state.cells.clear();
        state.snapshots.clear();
        drop(state);

        self.ids.send_replace(Vec::new());
        tracing::debug!("document collection cleared");
    }
}
