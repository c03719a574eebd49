//! Shared data types for the knowledge base.

use serde::{Deserialize, Serialize};

/// Metadata stored alongside a knowledge-base document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Question or instruction the document answers, when ingested from
    /// instruction/response blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// File the document was ingested from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form grouping label (e.g. "faq").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A document returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    /// Cosine similarity to the query (higher is closer).
    pub similarity: f64,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// A document to be written into the vector store during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
    /// Unique upsert key, e.g. `faq.txt-3`.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieved_document_from_rpc_row() {
        let row = r#"{
            "id": 12,
            "content": "We build cabins in 6 weeks.",
            "metadata": {"instruction": "How long does a build take?", "source": "faq.txt"},
            "similarity": 0.83
        }"#;
        let doc: RetrievedDocument = serde_json::from_str(row).unwrap();
        assert_eq!(doc.content, "We build cabins in 6 weeks.");
        assert!((doc.similarity - 0.83).abs() < f64::EPSILON);
        assert_eq!(
            doc.metadata.instruction.as_deref(),
            Some("How long does a build take?")
        );
        assert_eq!(doc.metadata.source.as_deref(), Some("faq.txt"));
        assert!(doc.metadata.category.is_none());
    }

    #[test]
    fn test_retrieved_document_missing_metadata() {
        let doc: RetrievedDocument =
            serde_json::from_str(r#"{"content": "x", "similarity": 0.6}"#).unwrap();
        assert_eq!(doc.metadata, DocumentMetadata::default());
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let meta = DocumentMetadata {
            source: Some("a.txt".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"source":"a.txt"}"#);
    }
}
