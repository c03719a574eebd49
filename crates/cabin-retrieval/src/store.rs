//! Vector store trait and implementations.
//!
//! - `SupabaseStore` talks to a Supabase (PostgREST) project: similarity
//!   search goes through the `match_documents` RPC, ingestion upserts into
//!   the `documents` table keyed on `source`.
//! - `InMemoryVectorStore` is a brute-force cosine index used in tests and
//!   with `vector_store.backend = "memory"`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use cabin_core::config::VectorStoreConfig;
use cabin_core::{KnowledgeDocument, RetrievedDocument};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use tracing::debug;

use crate::error::RetrievalError;

/// Similarity search and document upsert over an embedding index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `count` documents whose similarity to `embedding` is at
    /// least `threshold`, most similar first.
    async fn match_documents(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    /// Insert a document, replacing any existing one with the same `source`.
    async fn upsert(&self, document: KnowledgeDocument) -> Result<(), RetrievalError>;
}

// ---------------------------------------------------------------------------
// SupabaseStore
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MatchDocumentsParams<'a> {
    query_embedding: &'a [f32],
    match_threshold: f64,
    match_count: usize,
}

/// PostgREST-backed vector store.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: Secret::new(api_key.into()),
        })
    }

    pub fn from_config(config: &VectorStoreConfig) -> Result<Self, RetrievalError> {
        let url = config
            .url
            .as_deref()
            .ok_or(RetrievalError::NotConfigured("SUPABASE_URL"))?;
        let key = config
            .api_key
            .as_deref()
            .ok_or(RetrievalError::NotConfigured("SUPABASE_ANON_KEY"))?;
        Self::new(url, key)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.api_key.expose_secret();
        request
            .header("apikey", key.as_str())
            .bearer_auth(key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RetrievalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RetrievalError::VectorStore(format!("{status}: {body}")))
    }
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn match_documents(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let params = MatchDocumentsParams {
            query_embedding: embedding,
            match_threshold: threshold,
            match_count: count,
        };
        let response = self
            .authorized(self.client.post(self.endpoint("rpc/match_documents")))
            .json(&params)
            .send()
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        let documents: Vec<RetrievedDocument> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RetrievalError::VectorStore(format!("invalid rpc response: {e}")))?;

        debug!(count = documents.len(), "match_documents returned");
        Ok(documents)
    }

    async fn upsert(&self, document: KnowledgeDocument) -> Result<(), RetrievalError> {
        let response = self
            .authorized(self.client.post(self.endpoint("documents?on_conflict=source")))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[document])
            .send()
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryVectorStore
// ---------------------------------------------------------------------------

/// In-memory vector store using brute-force cosine similarity.
///
/// Documents are keyed by `source`, matching the upsert semantics of the
/// hosted store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    documents: Arc<RwLock<HashMap<String, KnowledgeDocument>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn match_documents(
        &self,
        embedding: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let documents = self
            .documents
            .read()
            .map_err(|e| RetrievalError::VectorStore(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<RetrievedDocument> = documents
            .values()
            .map(|doc| RetrievedDocument {
                content: doc.content.clone(),
                similarity: cosine_similarity(embedding, &doc.embedding),
                metadata: doc.metadata.clone(),
            })
            .filter(|doc| doc.similarity >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count);
        Ok(scored)
    }

    async fn upsert(&self, document: KnowledgeDocument) -> Result<(), RetrievalError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|e| RetrievalError::VectorStore(format!("Lock poisoned: {}", e)))?;
        documents.insert(document.source.clone(), document);
        Ok(())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or a zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabin_core::DocumentMetadata;

    fn doc(source: &str, content: &str, embedding: Vec<f32>) -> KnowledgeDocument {
        KnowledgeDocument {
            content: content.to_string(),
            embedding,
            metadata: DocumentMetadata {
                source: Some(source.to_string()),
                ..Default::default()
            },
            source: source.to_string(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_match_filters_by_threshold_and_orders() {
        let store = InMemoryVectorStore::new();
        store.upsert(doc("a", "exact", vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("b", "close", vec![0.8, 0.6])).await.unwrap();
        store.upsert(doc("c", "orthogonal", vec![0.0, 1.0])).await.unwrap();

        let hits = store.match_documents(&[1.0, 0.0], 0.5, 7).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close"]);
        assert!(hits.iter().all(|h| h.similarity >= 0.5));
    }

    #[tokio::test]
    async fn test_match_respects_count() {
        let store = InMemoryVectorStore::new();
        for i in 0..10 {
            store
                .upsert(doc(&format!("s{i}"), "same", vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        let hits = store.match_documents(&[1.0, 0.0], 0.5, 7).await.unwrap();
        assert_eq!(hits.len(), 7);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_source() {
        let store = InMemoryVectorStore::new();
        store.upsert(doc("faq.txt-0", "old", vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("faq.txt-0", "new", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.len(), 1);

        let hits = store.match_documents(&[1.0, 0.0], 0.0, 7).await.unwrap();
        assert_eq!(hits[0].content, "new");
        assert_eq!(hits[0].metadata.source.as_deref(), Some("faq.txt-0"));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = InMemoryVectorStore::new();
        assert!(store.is_empty());
        let hits = store.match_documents(&[1.0, 0.0], 0.5, 7).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_supabase_from_config_requires_url_and_key() {
        let err = SupabaseStore::from_config(&VectorStoreConfig::default()).unwrap_err();
        assert!(matches!(err, RetrievalError::NotConfigured("SUPABASE_URL")));

        let config = VectorStoreConfig {
            url: Some("https://proj.supabase.co/".to_string()),
            ..Default::default()
        };
        let err = SupabaseStore::from_config(&config).unwrap_err();
        assert!(matches!(err, RetrievalError::NotConfigured("SUPABASE_ANON_KEY")));
    }

    #[test]
    fn test_supabase_endpoint_trims_trailing_slash() {
        let store = SupabaseStore::new("https://proj.supabase.co/", "s3cr3t").unwrap();
        assert_eq!(
            store.endpoint("rpc/match_documents"),
            "https://proj.supabase.co/rest/v1/rpc/match_documents"
        );
        assert!(!format!("{:?}", store).contains("s3cr3t"));
    }

    #[test]
    fn test_match_params_wire_format() {
        let params = MatchDocumentsParams {
            query_embedding: &[0.5, 0.25],
            match_threshold: 0.5,
            match_count: 7,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"query_embedding": [0.5, 0.25], "match_threshold": 0.5, "match_count": 7})
        );
    }
}
