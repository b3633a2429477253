//! Abstract interface over the persistent tenant storage that backs
//! retrieval.
//!
//! Implementations must provide durable, collection-scoped records with
//! vector similarity search and exact-match metadata filtering. The primary
//! implementation is `SqliteDocumentStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// A knowledge-base record as persisted. The embedding travels separately
/// (write-only from the store's perspective); reads never need it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Unique within its collection.
    pub id: String,
    /// Tenant collection this record belongs to.
    pub collection: String,
    /// Source-of-truth text for retrieval.
    pub content: String,
    /// Scalar-valued metadata (flattened before it reaches the store).
    pub metadata: Map<String, Value>,
}

/// One ranked similarity-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSearchResult {
    pub document: StoredDocument,
    /// Cosine similarity; higher is better.
    pub score: f32,
    /// `1 - score`, kept so callers see both representations.
    pub distance: f32,
}

/// Exact-match equality conditions over stored metadata fields.
pub type MetadataFilter = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace one record with its embedding, atomically.
    async fn insert(&self, document: StoredDocument, embedding: Vec<f32>) -> Result<(), ApiError>;

    /// Insert many records in one transaction.
    async fn insert_batch(&self, items: Vec<(StoredDocument, Vec<f32>)>) -> Result<(), ApiError>;

    /// Rank the collection's records against a query embedding, keeping only
    /// rows whose metadata matches every filter condition, descending by
    /// similarity, at most `limit` results.
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DocumentSearchResult>, ApiError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, ApiError>;

    /// Replace content/metadata of an existing record; `embedding` is `None`
    /// when the content did not change. Returns false for an unknown id.
    async fn update(
        &self,
        document: StoredDocument,
        embedding: Option<Vec<f32>>,
    ) -> Result<bool, ApiError>;

    /// Returns false for an unknown id; deleting twice is safe.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, ApiError>;

    /// Remove every record in the collection; returns how many went away.
    async fn delete_collection(&self, collection: &str) -> Result<usize, ApiError>;

    async fn count(&self, collection: &str) -> Result<usize, ApiError>;
}
