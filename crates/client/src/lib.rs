//! Reactive CouchDB client.
//!
//! This crate provides the document access façade ([`CouchClient`]), the
//! change-feed controller that keeps a live `_changes` subscription aligned
//! with the cached id-set, request URL construction, and the HTTP transport
//! seam with its reqwest implementation.

pub mod changes;
pub mod client;
pub mod transport;
pub mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use changes::ChangeEvent;
pub use client::CouchClient;
pub use transport::{EventStream, HttpRequest, HttpTransport, Transport};
pub use urls::DesignResource;

pub use seiche_core::{
    DatabaseConfig, Document, DocumentCell, DocumentCollection, DocumentRef, Error, Headers, WatcherConfig,
};
