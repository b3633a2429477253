use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ApiError;
use crate::embedding::EmbeddingService;

use super::store::{DocumentSearchResult, DocumentStore, MetadataFilter, StoredDocument};

/// Deterministic mapping from a tenant to its collection. The same
/// organization id always resolves to the same collection across restarts.
pub fn collection_name(organization_id: &str) -> String {
    format!("org_{}_docs", organization_id)
}

fn generate_document_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("doc_{}", &hex[..12])
}

/// One record of a batch insert, as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub organization_id: String,
    pub collection_name: String,
    pub document_count: usize,
}

/// Per-tenant view over the document store. Every operation is scoped to the
/// tenant's collection; concurrent instances for different tenants share the
/// same backing store without touching each other's rows.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn DocumentStore>,
    embeddings: EmbeddingService,
    organization_id: String,
    collection: String,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: EmbeddingService,
        organization_id: &str,
    ) -> Self {
        Self {
            store,
            embeddings,
            organization_id: organization_id.to_string(),
            collection: collection_name(organization_id),
        }
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Adds one document: embeds the content, merges the system fields over
    /// the caller's (flattened) metadata, and stores the record atomically.
    pub async fn add_document(
        &self,
        content: &str,
        metadata: Option<&Map<String, Value>>,
        id: Option<String>,
    ) -> Result<String, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::EmptyInput(
                "document content must not be empty".to_string(),
            ));
        }

        let doc_id = id.unwrap_or_else(generate_document_id);
        let embedding = self.embeddings.embed(content).await?;

        let mut merged = metadata.map(flatten_metadata).unwrap_or_default();
        self.inject_system_fields(&mut merged, content);

        self.store
            .insert(
                StoredDocument {
                    id: doc_id.clone(),
                    collection: self.collection.clone(),
                    content: content.to_string(),
                    metadata: merged,
                },
                embedding,
            )
            .await?;

        tracing::debug!("added document {} to {}", doc_id, self.collection);
        Ok(doc_id)
    }

    /// Adds many documents in one transaction. Validation is all-or-nothing:
    /// a record without content rejects the whole batch before any provider
    /// call. Embedding uses the batch path, so partial provider failures
    /// degrade to zero vectors instead of failing the insert.
    pub async fn add_documents(&self, records: &[NewDocument]) -> Result<Vec<String>, ApiError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(records.len());
        let mut contents = Vec::with_capacity(records.len());
        for record in records {
            let doc_id = record.id.clone().unwrap_or_else(generate_document_id);
            if record.content.trim().is_empty() {
                return Err(ApiError::MissingContent(format!(
                    "document {} has no content",
                    doc_id
                )));
            }
            ids.push(doc_id);
            contents.push(record.content.clone());
        }

        let embeddings = self.embeddings.embed_batch(&contents).await?;

        let items = records
            .iter()
            .zip(ids.iter())
            .zip(embeddings)
            .map(|((record, doc_id), embedding)| {
                let mut merged = record
                    .metadata
                    .as_ref()
                    .map(flatten_metadata)
                    .unwrap_or_default();
                self.inject_system_fields(&mut merged, &record.content);

                (
                    StoredDocument {
                        id: doc_id.clone(),
                        collection: self.collection.clone(),
                        content: record.content.clone(),
                        metadata: merged,
                    },
                    embedding,
                )
            })
            .collect();

        self.store.insert_batch(items).await?;

        tracing::debug!("added {} documents to {}", ids.len(), self.collection);
        Ok(ids)
    }

    /// Embeds the query and returns up to `k` records ranked by similarity,
    /// optionally restricted to rows whose metadata equals every filter
    /// condition. Filter values are compared against the *stored* (already
    /// flattened) representation.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DocumentSearchResult>, ApiError> {
        let query_embedding = self.embeddings.embed(query).await?;
        self.store
            .search(&self.collection, &query_embedding, k, filter)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredDocument>, ApiError> {
        self.store.get(&self.collection, id).await
    }

    /// Updates content and/or metadata in place. A content change re-embeds;
    /// a metadata change merges over the stored fields and stamps
    /// `updated_at`. Asking for neither is a caller error. Returns false for
    /// an unknown id.
    pub async fn update(
        &self,
        id: &str,
        content: Option<&str>,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<bool, ApiError> {
        if content.is_none() && metadata.is_none() {
            return Err(ApiError::BadRequest(
                "update requires content or metadata".to_string(),
            ));
        }

        let Some(existing) = self.store.get(&self.collection, id).await? else {
            return Ok(false);
        };

        let (new_content, embedding) = match content {
            Some(text) => (text.to_string(), Some(self.embeddings.embed(text).await?)),
            None => (existing.content.clone(), None),
        };

        let new_metadata = match metadata {
            Some(patch) => {
                let mut merged = existing.metadata.clone();
                for (key, value) in flatten_metadata(patch) {
                    merged.insert(key, value);
                }
                merged.insert(
                    "updated_at".to_string(),
                    Value::String(Utc::now().to_rfc3339()),
                );
                merged
            }
            None => existing.metadata,
        };

        self.store
            .update(
                StoredDocument {
                    id: id.to_string(),
                    collection: self.collection.clone(),
                    content: new_content,
                    metadata: new_metadata,
                },
                embedding,
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        self.store.delete(&self.collection, id).await
    }

    /// Administrative reset: removes every document in the tenant's
    /// collection. Irreversible.
    pub async fn wipe(&self) -> Result<usize, ApiError> {
        let removed = self.store.delete_collection(&self.collection).await?;
        tracing::info!(
            "wiped collection {} ({} documents removed)",
            self.collection,
            removed
        );
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats, ApiError> {
        Ok(IndexStats {
            organization_id: self.organization_id.clone(),
            collection_name: self.collection.clone(),
            document_count: self.store.count(&self.collection).await?,
        })
    }

    fn inject_system_fields(&self, metadata: &mut Map<String, Value>, content: &str) {
        metadata.insert(
            "organization_id".to_string(),
            Value::String(self.organization_id.clone()),
        );
        metadata.insert(
            "added_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        metadata.insert(
            "content_length".to_string(),
            Value::from(content.chars().count()),
        );
    }
}

/// Reduces metadata values to the scalars the store supports. Lists become
/// comma-joined strings, maps become JSON strings, nulls are dropped. Lossy
/// on purpose; callers get the flattened form back on read.
pub fn flatten_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();

    for (key, value) in metadata {
        match value {
            Value::Null => continue,
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                cleaned.insert(key.clone(), value.clone());
            }
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(scalar_to_text)
                    .collect::<Vec<_>>()
                    .join(", ");
                cleaned.insert(key.clone(), Value::String(joined));
            }
            Value::Object(_) => {
                let serialized = serde_json::to_string(value).unwrap_or_default();
                cleaned.insert(key.clone(), Value::String(serialized));
            }
        }
    }

    cleaned
}

fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
