use crate::domain::document::Document;
use tokio::sync::RwLock;

/// Append-only retrieval context shared by the data routes and the generation pipeline.
///
/// Insertion order is preserved and represents recency. Entries are never removed,
/// deduplicated or capped.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<Vec<Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, document: Document) {
        let mut documents = self.documents.write().await;
        documents.push(document);
        tracing::debug!(len = documents.len(), "document appended");
    }

    /// Full ordered copy of the store as of this call.
    pub async fn snapshot(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}
