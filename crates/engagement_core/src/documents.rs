//! crates/engagement_core/src/documents.rs
//!
//! The ingestion hand-off: store raw document content and get back an id.
//! Rendering or converting the content is not this crate's concern.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Document, NewDocument, Page};
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct DocumentCatalog {
    store: Arc<dyn TrackingStore>,
}

impl DocumentCatalog {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(
        &self,
        name: &str,
        content: String,
        created_by: &str,
    ) -> EngagementResult<Document> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngagementError::Validation("document name is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(EngagementError::Validation("document content is empty".to_string()));
        }
        let document = self
            .store
            .create_document(NewDocument {
                name: name.to_string(),
                content,
                created_by: created_by.to_string(),
            })
            .await?;
        info!(document_id = %document.id, name = %document.name, "Stored document");
        Ok(document)
    }

    pub async fn get(&self, document_id: Uuid) -> EngagementResult<Document> {
        self.store
            .find_document(document_id)
            .await?
            .ok_or_else(|| EngagementError::NotFound(format!("document {document_id} not found")))
    }

    /// 1-based pages, newest-updated first. Out-of-range inputs are clamped.
    pub async fn list(&self, page: Option<u32>, limit: Option<u32>) -> EngagementResult<Page<Document>> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(limit);
        let (items, total) = self.store.list_documents(offset, limit).await?;
        Ok(Page { items, total, page, limit })
    }
}
