//! Core types and shared functionality for seiche.
//!
//! This crate provides:
//! - The JSON document model with CouchDB reserved fields
//! - The in-memory document collection with snapshot-based dirty detection
//! - Static configuration loading and the reactive configuration stream
//! - Unified error types

pub mod cache;
pub mod config;
pub mod document;
pub mod error;

pub use cache::{DocumentCell, DocumentCollection, snapshot_digest};
pub use config::{ConfigCells, DatabaseConfig, Headers, WatcherConfig};
pub use document::{Document, DocumentRef};
pub use error::Error;
