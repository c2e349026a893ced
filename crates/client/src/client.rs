//! Document access façade.
//!
//! [`CouchClient`] is the public entry point. It owns the document
//! collection, the configuration cells, and the transport; it spawns the
//! configuration combine loop and the change-feed controller on creation.
//! Every resolution funnels through the collection, so concurrent callers
//! asking for the same id always converge on the identical cell.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::watch;

use seiche_core::{
    ConfigCells, DatabaseConfig, Document, DocumentCell, DocumentCollection, DocumentRef, Error, Headers,
    WatcherConfig,
};

use crate::changes::ChangeFeedController;
use crate::transport::{HttpRequest, HttpTransport, Transport};
use crate::urls::{self, DesignResource};

/// Reactive client for one CouchDB database.
///
/// Dropping the client tears everything down: the configuration cells close,
/// which ends the combine loop, which in turn stops the change-feed
/// controller and disconnects any live feed.
pub struct CouchClient {
    documents: DocumentCollection,
    cells: ConfigCells,
    config: watch::Receiver<WatcherConfig>,
    transport: Arc<dyn Transport>,
    watched: Mutex<HashSet<String>>,
}

impl CouchClient {
    /// Build a client over the real HTTP transport.
    ///
    /// Must be called from within a tokio runtime; the combine loop and the
    /// feed controller are spawned immediately.
    pub fn new(config: DatabaseConfig) -> Result<Self, Error> {
        let transport = Arc::new(HttpTransport::new(&config.user_agent, config.timeout())?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(config: DatabaseConfig, transport: Arc<dyn Transport>) -> Self {
        let documents = DocumentCollection::new();
        let cells = ConfigCells::new(config.host, config.database, config.headers, config.port);
        let config_rx = cells.combine(documents.ids());

        ChangeFeedController::new(transport.clone(), documents.clone(), config_rx.clone()).spawn();

        Self { documents, cells, config: config_rx, transport, watched: Mutex::new(HashSet::new()) }
    }

    /// The document collection backing this client.
    pub fn documents(&self) -> &DocumentCollection {
        &self.documents
    }

    /// Live view of the combined configuration tuple.
    pub fn config(&self) -> watch::Receiver<WatcherConfig> {
        self.config.clone()
    }

    pub fn set_database(&self, database: impl Into<String>) {
        self.cells.set_database(database);
    }

    pub fn set_host(&self, host: impl Into<String>) {
        self.cells.set_host(host);
    }

    pub fn set_port(&self, port: u16) {
        self.cells.set_port(port);
    }

    pub fn set_headers(&self, headers: Headers) {
        self.cells.set_headers(headers);
    }

    /// Resolve a document reference into its shared cell.
    ///
    /// Resolution order:
    /// 1. bare id, known: existing cell, no network
    /// 2. bare id, unknown: GET by id
    /// 3. full document, known and dirty: PUT, capture the new revision,
    ///    record a fresh snapshot, push into the cell
    /// 4. full document, known and clean: existing cell, no network
    /// 5. pre-document: POST; unknown stored document: GET by id
    pub async fn doc(&self, reference: impl Into<DocumentRef>) -> Result<DocumentCell, Error> {
        match reference.into() {
            DocumentRef::Id(id) => {
                if let Some(cell) = self.documents.cell(&id) {
                    return Ok(cell);
                }
                self.fetch_by_id(&id).await
            }
            DocumentRef::Doc(document) => {
                let known = document.id().is_some_and(|id| self.documents.is_known(id));
                if document.is_stored() && known {
                    if self.documents.is_dirty(Some(&document)) {
                        self.write(document).await
                    } else {
                        self.documents.resolve(document)
                    }
                } else if document.is_pre_document() {
                    self.create(document).await
                } else {
                    // A stored document the cache has never seen: read the
                    // authoritative remote copy instead of trusting the body.
                    let id = document.id().ok_or(Error::MissingId)?.to_string();
                    self.fetch_by_id(&id).await
                }
            }
        }
    }

    /// Invoke a named view or list on a design document.
    ///
    /// Stateless one-shot: the configuration tuple is snapshotted once, the
    /// single response is delivered as-is. No cache or feed participation.
    pub async fn design(
        &self,
        design_name: &str,
        resource: DesignResource,
        resource_name: &str,
        options: Option<&BTreeMap<String, String>>,
    ) -> Result<Value, Error> {
        let tuple = self.config.borrow().clone();
        let url = urls::design_url(&tuple, design_name, resource, resource_name, options)?;
        let request = HttpRequest::get(url, tuple.headers);
        self.transport.fetch(&request).await
    }

    async fn fetch_by_id(&self, id: &str) -> Result<DocumentCell, Error> {
        let tuple = self.config.borrow().clone();
        let url = urls::document_url(&tuple, Some(id))?;
        let request = HttpRequest::get(url, tuple.headers);

        let value = match self.transport.fetch(&request).await {
            Err(Error::Http { status: 404 }) => return Err(Error::NotFound { id: id.to_string() }),
            other => other?,
        };
        let document = Document::try_from(value)?;

        tracing::debug!(%id, "document fetched");
        self.admit(document)
    }

    async fn write(&self, mut document: Document) -> Result<DocumentCell, Error> {
        let id = document.id().ok_or(Error::MissingId)?.to_string();
        let tuple = self.config.borrow().clone();
        let url = urls::document_url(&tuple, Some(&id))?;
        let request = HttpRequest::new(Method::PUT, url, tuple.headers, Some(document.clone().into_value()));

        let response = match self.transport.fetch(&request).await {
            Err(Error::Http { status: 409 }) => return Err(Error::WriteConflict { id }),
            Err(Error::Http { status: 404 }) => return Err(Error::NotFound { id }),
            other => other?,
        };
        if let Some(rev) = response.get("rev").and_then(Value::as_str) {
            document.set_rev(rev);
        }

        tracing::debug!(%id, rev = ?document.rev(), "document written");
        // Still dirty against the pre-write snapshot, so this pushes the
        // value into the cell and records the fresh snapshot.
        self.documents.resolve(document)
    }

    async fn create(&self, document: Document) -> Result<DocumentCell, Error> {
        let tuple = self.config.borrow().clone();
        let url = urls::document_url(&tuple, None)?;
        let request = HttpRequest::new(Method::POST, url, tuple.headers, Some(document.clone().into_value()));

        let response = match self.transport.fetch(&request).await {
            Err(Error::Http { status: 409 }) => {
                return Err(Error::WriteConflict { id: document.id().unwrap_or_default().to_string() });
            }
            other => other?,
        };

        let mut document = document;
        if let Some(id) = response.get("id").and_then(Value::as_str) {
            document.set_id(id);
        }
        if let Some(rev) = response.get("rev").and_then(Value::as_str) {
            document.set_rev(rev);
        }

        tracing::debug!(id = ?document.id(), "document created");
        self.admit(document)
    }

    /// Insert a remotely confirmed document into the collection and, the
    /// first time an id arrives through this path, attach the write-back
    /// placeholder watcher.
    ///
    /// The watcher only detects divergence between the cell and the recorded
    /// snapshot; pushing such edits back to the store is not implemented.
    fn admit(&self, document: Document) -> Result<DocumentCell, Error> {
        let id = document.id().ok_or(Error::MissingId)?.to_string();
        let cell = self.documents.resolve(document)?;

        let mut watched = self.watched.lock().unwrap_or_else(PoisonError::into_inner);
        if watched.insert(id.clone()) {
            let documents = self.documents.clone();
            let mut rx = cell.watch();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let current = rx.borrow_and_update().clone();
                    if documents.is_dirty(Some(&current)) {
                        tracing::debug!(%id, "local mutation diverged from snapshot; write-back not implemented");
                    }
                }
            });
        }

        Ok(cell)
    }
}
