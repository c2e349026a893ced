//! Change-feed lifecycle management.
//!
//! The controller owns at most one live feed stream. It is driven solely by
//! configuration tuple emissions: an empty watched id-set disconnects, a
//! non-empty one (re)connects with the derived request. The previous stream
//! is always dropped before its replacement can deliver, so a superseded
//! connection can never feed stale notifications and no connection-identifier
//! filtering is needed.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use seiche_core::{Document, DocumentCollection, Error, WatcherConfig};

use crate::transport::{EventStream, HttpRequest, Transport};
use crate::urls;

/// One row of the `_changes` feed.
///
/// The feed runs with `include_docs=true`, so `doc` is normally present;
/// rows that omit it trigger a one-shot re-fetch by id instead.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Document>,
    #[serde(default)]
    pub deleted: bool,
}

pub(crate) struct ChangeFeedController {
    transport: Arc<dyn Transport>,
    documents: DocumentCollection,
    config: watch::Receiver<WatcherConfig>,
    feed: Option<EventStream>,
}

impl ChangeFeedController {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        documents: DocumentCollection,
        config: watch::Receiver<WatcherConfig>,
    ) -> Self {
        Self { transport, documents, config, feed: None }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let initial = self.config.borrow_and_update().clone();
        self.apply(initial).await;

        loop {
            tokio::select! {
                changed = self.config.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let tuple = self.config.borrow_and_update().clone();
                    self.apply(tuple).await;
                }
                event = Self::next_event(&mut self.feed) => {
                    match event {
                        Some(Ok(value)) => self.handle_notification(value).await,
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "change feed transport error");
                            self.feed = None;
                        }
                        None => {
                            tracing::debug!("change feed stream ended");
                            self.feed = None;
                        }
                    }
                }
            }
        }
        tracing::debug!("change feed controller stopped");
    }

    /// Apply a new configuration tuple.
    ///
    /// The old stream is dropped before the transport is asked for a new
    /// one, so there is never a moment with two delivering connections.
    async fn apply(&mut self, tuple: WatcherConfig) {
        if tuple.ids.is_empty() {
            if self.feed.take().is_some() {
                tracing::debug!("change feed disconnected: no watched documents");
            }
            return;
        }

        self.feed = None;
        match Self::connect(self.transport.as_ref(), &tuple).await {
            Ok(stream) => {
                tracing::debug!(watched = tuple.ids.len(), "change feed connected");
                self.feed = Some(stream);
            }
            Err(err) => tracing::warn!(error = %err, "change feed connection failed"),
        }
    }

    async fn connect(transport: &dyn Transport, tuple: &WatcherConfig) -> Result<EventStream, Error> {
        let url = urls::changes_url(tuple)?;
        let body = serde_json::json!({ "doc_ids": tuple.ids });
        let request = HttpRequest::new(reqwest::Method::POST, url, tuple.headers.clone(), Some(body));
        transport.stream(&request).await
    }

    async fn next_event(feed: &mut Option<EventStream>) -> Option<Result<Value, Error>> {
        match feed {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    /// Absorb one remote change notification.
    ///
    /// A notification whose body matches the recorded snapshot is an echo of
    /// a change this client already applied and is ignored. A diverging body
    /// is re-resolved into the cache exactly once.
    async fn handle_notification(&mut self, value: Value) {
        let event: ChangeEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            // e.g. the last_seq summary row on feed shutdown
            Err(err) => {
                tracing::debug!(error = %err, "unrecognized feed row skipped");
                return;
            }
        };

        if event.deleted {
            tracing::debug!(id = %event.id, "remote deletion observed; entry kept (no eviction)");
            return;
        }

        match event.doc {
            Some(doc) => {
                if self.documents.is_dirty(Some(&doc)) {
                    tracing::debug!(id = %event.id, "remote change diverges from snapshot");
                    if let Err(err) = self.documents.resolve(doc) {
                        tracing::warn!(id = %event.id, error = %err, "failed to absorb remote change");
                    }
                }
            }
            None => {
                if let Err(err) = self.refetch(&event.id).await {
                    tracing::warn!(id = %event.id, error = %err, "re-fetch after remote change failed");
                }
            }
        }
    }

    async fn refetch(&mut self, id: &str) -> Result<(), Error> {
        let tuple = self.config.borrow().clone();
        let url = urls::document_url(&tuple, Some(id))?;
        let request = HttpRequest::get(url, tuple.headers);

        let value = self.transport.fetch(&request).await?;
        let doc = Document::try_from(value)?;
        if self.documents.is_dirty(Some(&doc)) {
            self.documents.resolve(doc)?;
        }
        Ok(())
    }
}
