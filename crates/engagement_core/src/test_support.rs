//! Shared fixture for the engine's unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::{Clock, ManualClock};
use crate::domain::{
    ClickEvent, ClickReport, Document, NewDocument, NewShareLink, ScrollPercentage, SectionDwell,
    SectionEngagement, ShareLink, ShareLinkPatch, ViewSession, ViewerMetadata,
};
use crate::engine::Engine;
use crate::memory::InMemoryTrackingStore;
use crate::ports::{PortError, PortResult, TrackingStore};

pub struct Fixture {
    pub engine: Engine,
    pub store: Arc<InMemoryTrackingStore>,
    pub clock: Arc<ManualClock>,
    pub document: Document,
}

impl Fixture {
    pub async fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .expect("valid fixture timestamp");
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryTrackingStore::with_clock(clock.clone()));
        let engine = Engine::new(store.clone(), clock.clone());
        let document = store
            .create_document(NewDocument {
                name: "Jane Doe - Resume".to_string(),
                content: "<h1>Jane Doe</h1>".to_string(),
                created_by: "fixture".to_string(),
            })
            .await
            .expect("fixture document");
        Self { engine, store, clock, document }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn anonymous_link(&self, label: &str) -> ShareLink {
        self.engine
            .share_links
            .create_anonymous_link(self.document.id, label)
            .await
            .expect("fixture share link")
    }

    /// A fresh session on a fresh anonymous link.
    pub async fn session(&self) -> ViewSession {
        let link = self.anonymous_link("Fixture Client").await;
        self.engine
            .sessions
            .start_or_update(link.id, None, ViewerMetadata::default())
            .await
            .expect("fixture session")
    }
}

/// Delegates to an in-memory store but fails the next `n` calls with a
/// transient error once armed.
pub struct FlakyStore {
    pub inner: Arc<InMemoryTrackingStore>,
    passes_left: AtomicU32,
    failures_left: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryTrackingStore>) -> Self {
        Self {
            inner,
            passes_left: AtomicU32::new(0),
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_after(0, n);
    }

    /// Lets `passes` calls through, then fails the `n` after them.
    pub fn fail_after(&self, passes: u32, n: u32) {
        self.passes_left.store(passes, Ordering::SeqCst);
        self.failures_left.store(n, Ordering::SeqCst);
    }

    fn trip(&self) -> PortResult<()> {
        let passed = self
            .passes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if passed {
            return Ok(());
        }
        let tripped = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if tripped {
            Err(PortError::Transient("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TrackingStore for FlakyStore {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        self.trip()?;
        self.inner.create_document(document).await
    }

    async fn find_document(&self, document_id: Uuid) -> PortResult<Option<Document>> {
        self.trip()?;
        self.inner.find_document(document_id).await
    }

    async fn list_documents(&self, offset: u64, limit: u32) -> PortResult<(Vec<Document>, u64)> {
        self.trip()?;
        self.inner.list_documents(offset, limit).await
    }

    async fn create_share_link(&self, link: NewShareLink) -> PortResult<ShareLink> {
        self.trip()?;
        self.inner.create_share_link(link).await
    }

    async fn find_share_link(&self, share_link_id: Uuid) -> PortResult<Option<ShareLink>> {
        self.trip()?;
        self.inner.find_share_link(share_link_id).await
    }

    async fn list_share_links_for_document(&self, document_id: Uuid) -> PortResult<Vec<ShareLink>> {
        self.trip()?;
        self.inner.list_share_links_for_document(document_id).await
    }

    async fn set_share_link_destination(&self, share_link_id: Uuid, url: &str) -> PortResult<u64> {
        self.trip()?;
        self.inner.set_share_link_destination(share_link_id, url).await
    }

    async fn patch_share_link(&self, share_link_id: Uuid, patch: &ShareLinkPatch) -> PortResult<u64> {
        self.trip()?;
        self.inner.patch_share_link(share_link_id, patch).await
    }

    async fn create_view_session(
        &self,
        share_link_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<ViewSession> {
        self.trip()?;
        self.inner.create_view_session(share_link_id, metadata).await
    }

    async fn find_view_session(&self, session_id: Uuid) -> PortResult<Option<ViewSession>> {
        self.trip()?;
        self.inner.find_view_session(session_id).await
    }

    async fn merge_view_session_metadata(
        &self,
        session_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<u64> {
        self.trip()?;
        self.inner.merge_view_session_metadata(session_id, metadata).await
    }

    async fn set_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> PortResult<u64> {
        self.trip()?;
        self.inner.set_scroll_percentage(session_id, percentage).await
    }

    async fn close_view_session(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> PortResult<u64> {
        self.trip()?;
        self.inner.close_view_session(session_id, added_seconds, ended_at).await
    }

    async fn list_view_sessions_for_links(&self, share_link_ids: &[Uuid]) -> PortResult<Vec<ViewSession>> {
        self.trip()?;
        self.inner.list_view_sessions_for_links(share_link_ids).await
    }

    async fn upsert_section_dwell(&self, dwell: &SectionDwell) -> PortResult<SectionEngagement> {
        self.trip()?;
        self.inner.upsert_section_dwell(dwell).await
    }

    async fn list_section_engagements_for_sessions(
        &self,
        session_ids: &[Uuid],
    ) -> PortResult<Vec<SectionEngagement>> {
        self.trip()?;
        self.inner.list_section_engagements_for_sessions(session_ids).await
    }

    async fn insert_click_event(&self, click: &ClickReport) -> PortResult<ClickEvent> {
        self.trip()?;
        self.inner.insert_click_event(click).await
    }

    async fn list_click_events_for_sessions(&self, session_ids: &[Uuid]) -> PortResult<Vec<ClickEvent>> {
        self.trip()?;
        self.inner.list_click_events_for_sessions(session_ids).await
    }
}
