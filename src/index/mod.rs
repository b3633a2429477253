//! Tenant-scoped document index.
//!
//! A single SQLite-backed [`DocumentStore`] holds every tenant's documents;
//! [`VectorIndex`] narrows it to one tenant's collection and layers the
//! embedding, metadata, and validation rules on top. Retrieval is linear
//! cosine scoring over the collection, which is the right trade-off for the
//! per-tenant corpus sizes this service targets.

mod service;
mod sqlite;
mod store;

pub use service::{collection_name, flatten_metadata, IndexStats, NewDocument, VectorIndex};
pub use sqlite::SqliteDocumentStore;
pub use store::{DocumentSearchResult, DocumentStore, MetadataFilter, StoredDocument};
