//! crates/engagement_core/src/retry.rs
//!
//! One retry policy for transient storage failures, applied uniformly by
//! `RetryingStore` around any `TrackingStore` implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{
    ClickEvent, ClickReport, Document, NewDocument, NewShareLink, ScrollPercentage, SectionDwell,
    SectionEngagement, ShareLink, ShareLinkPatch, ViewSession, ViewerMetadata,
};
use crate::ports::{PortResult, TrackingStore};

/// Bounded exponential backoff. Only `PortError::Transient` qualifies for a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> PortResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient storage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(operation, attempt, error = %err, "Storage retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Wraps a store so every call goes through the retry policy.
#[derive(Clone)]
pub struct RetryingStore {
    inner: Arc<dyn TrackingStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn TrackingStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl TrackingStore for RetryingStore {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        self.policy
            .run("create_document", || self.inner.create_document(document.clone()))
            .await
    }

    async fn find_document(&self, document_id: Uuid) -> PortResult<Option<Document>> {
        self.policy
            .run("find_document", || self.inner.find_document(document_id))
            .await
    }

    async fn list_documents(&self, offset: u64, limit: u32) -> PortResult<(Vec<Document>, u64)> {
        self.policy
            .run("list_documents", || self.inner.list_documents(offset, limit))
            .await
    }

    async fn create_share_link(&self, link: NewShareLink) -> PortResult<ShareLink> {
        self.policy
            .run("create_share_link", || self.inner.create_share_link(link.clone()))
            .await
    }

    async fn find_share_link(&self, share_link_id: Uuid) -> PortResult<Option<ShareLink>> {
        self.policy
            .run("find_share_link", || self.inner.find_share_link(share_link_id))
            .await
    }

    async fn list_share_links_for_document(&self, document_id: Uuid) -> PortResult<Vec<ShareLink>> {
        self.policy
            .run("list_share_links_for_document", || {
                self.inner.list_share_links_for_document(document_id)
            })
            .await
    }

    async fn set_share_link_destination(&self, share_link_id: Uuid, url: &str) -> PortResult<u64> {
        self.policy
            .run("set_share_link_destination", || {
                self.inner.set_share_link_destination(share_link_id, url)
            })
            .await
    }

    async fn patch_share_link(&self, share_link_id: Uuid, patch: &ShareLinkPatch) -> PortResult<u64> {
        self.policy
            .run("patch_share_link", || self.inner.patch_share_link(share_link_id, patch))
            .await
    }

    async fn create_view_session(
        &self,
        share_link_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<ViewSession> {
        self.policy
            .run("create_view_session", || {
                self.inner.create_view_session(share_link_id, metadata)
            })
            .await
    }

    async fn find_view_session(&self, session_id: Uuid) -> PortResult<Option<ViewSession>> {
        self.policy
            .run("find_view_session", || self.inner.find_view_session(session_id))
            .await
    }

    async fn merge_view_session_metadata(
        &self,
        session_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<u64> {
        self.policy
            .run("merge_view_session_metadata", || {
                self.inner.merge_view_session_metadata(session_id, metadata)
            })
            .await
    }

    async fn set_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> PortResult<u64> {
        self.policy
            .run("set_scroll_percentage", || {
                self.inner.set_scroll_percentage(session_id, percentage)
            })
            .await
    }

    async fn close_view_session(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> PortResult<u64> {
        self.policy
            .run("close_view_session", || {
                self.inner.close_view_session(session_id, added_seconds, ended_at)
            })
            .await
    }

    async fn list_view_sessions_for_links(&self, share_link_ids: &[Uuid]) -> PortResult<Vec<ViewSession>> {
        self.policy
            .run("list_view_sessions_for_links", || {
                self.inner.list_view_sessions_for_links(share_link_ids)
            })
            .await
    }

    async fn upsert_section_dwell(&self, dwell: &SectionDwell) -> PortResult<SectionEngagement> {
        self.policy
            .run("upsert_section_dwell", || self.inner.upsert_section_dwell(dwell))
            .await
    }

    async fn list_section_engagements_for_sessions(
        &self,
        session_ids: &[Uuid],
    ) -> PortResult<Vec<SectionEngagement>> {
        self.policy
            .run("list_section_engagements_for_sessions", || {
                self.inner.list_section_engagements_for_sessions(session_ids)
            })
            .await
    }

    async fn insert_click_event(&self, click: &ClickReport) -> PortResult<ClickEvent> {
        self.policy
            .run("insert_click_event", || self.inner.insert_click_event(click))
            .await
    }

    async fn list_click_events_for_sessions(&self, session_ids: &[Uuid]) -> PortResult<Vec<ClickEvent>> {
        self.policy
            .run("list_click_events_for_sessions", || {
                self.inner.list_click_events_for_sessions(session_ids)
            })
            .await
    }
}
