//! crates/engagement_core/src/memory.rs
//!
//! An in-process implementation of the `TrackingStore` port. All tables sit
//! behind one `RwLock`, so every write (including the dwell merge) is a single
//! atomic read-modify-write. Used for tests and for running without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::domain::{
    ClickEvent, ClickReport, Document, ExpiryPatch, NewDocument, NewShareLink, ScrollPercentage,
    SectionDwell, SectionEngagement, ShareLink, ShareLinkPatch, ViewSession, ViewerMetadata,
};
use crate::ports::{PortError, PortResult, TrackingStore};

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    share_links: HashMap<Uuid, ShareLink>,
    view_sessions: HashMap<Uuid, ViewSession>,
    /// Insertion ordered.
    section_engagements: Vec<SectionEngagement>,
    /// Unique index on (view session, section label) into `section_engagements`.
    section_index: HashMap<(Uuid, String), usize>,
    click_events: Vec<ClickEvent>,
}

impl Tables {
    fn live_session_mut(&mut self, session_id: Uuid) -> Option<&mut ViewSession> {
        self.view_sessions
            .get_mut(&session_id)
            .filter(|session| session.deleted_at.is_none())
    }

    fn ensure_session_and_link(&self, session_id: Uuid, share_link_id: Uuid) -> PortResult<()> {
        if !self.view_sessions.contains_key(&session_id) {
            return Err(PortError::Constraint(format!(
                "view session {session_id} does not exist"
            )));
        }
        if !self.share_links.contains_key(&share_link_id) {
            return Err(PortError::Constraint(format!(
                "share link {share_link_id} does not exist"
            )));
        }
        Ok(())
    }
}

pub struct InMemoryTrackingStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }

    /// Soft-deletes a view session; used to exercise read-path filtering.
    pub async fn soft_delete_view_session(&self, session_id: Uuid) -> bool {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        match tables.live_session_mut(session_id) {
            Some(session) => {
                session.deleted_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Number of stored section rows, deleted sessions included.
    pub async fn section_row_count(&self) -> usize {
        self.tables.read().await.section_engagements.len()
    }
}

fn sorted_by_created<T, F>(mut items: Vec<T>, created: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| created(item));
    items
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let now = self.clock.now();
        let record = Document {
            id: Uuid::new_v4(),
            name: document.name,
            content: document.content,
            created_by: document.created_by,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .documents
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_document(&self, document_id: Uuid) -> PortResult<Option<Document>> {
        Ok(self.tables.read().await.documents.get(&document_id).cloned())
    }

    async fn list_documents(&self, offset: u64, limit: u32) -> PortResult<(Vec<Document>, u64)> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables.documents.values().cloned().collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let total = documents.len() as u64;
        let page = documents
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn create_share_link(&self, link: NewShareLink) -> PortResult<ShareLink> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&link.document_id) {
            return Err(PortError::Constraint(format!(
                "document {} does not exist",
                link.document_id
            )));
        }
        let record = ShareLink {
            id: Uuid::new_v4(),
            document_id: link.document_id,
            recipient_email: link.recipient_email,
            client_label: link.client_label,
            share_type: link.share_type,
            expires_at: link.expires_at,
            destination_url: None,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.share_links.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_share_link(&self, share_link_id: Uuid) -> PortResult<Option<ShareLink>> {
        Ok(self
            .tables
            .read()
            .await
            .share_links
            .get(&share_link_id)
            .filter(|link| link.deleted_at.is_none())
            .cloned())
    }

    async fn list_share_links_for_document(&self, document_id: Uuid) -> PortResult<Vec<ShareLink>> {
        let tables = self.tables.read().await;
        let links = tables
            .share_links
            .values()
            .filter(|link| link.document_id == document_id && link.deleted_at.is_none())
            .cloned()
            .collect();
        Ok(sorted_by_created(links, |link: &ShareLink| link.created_at))
    }

    async fn set_share_link_destination(&self, share_link_id: Uuid, url: &str) -> PortResult<u64> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        match tables
            .share_links
            .get_mut(&share_link_id)
            .filter(|link| link.deleted_at.is_none())
        {
            Some(link) => {
                link.destination_url = Some(url.to_string());
                link.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn patch_share_link(&self, share_link_id: Uuid, patch: &ShareLinkPatch) -> PortResult<u64> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        let Some(link) = tables
            .share_links
            .get_mut(&share_link_id)
            .filter(|link| link.deleted_at.is_none())
        else {
            return Ok(0);
        };
        if let Some(active) = patch.active {
            link.active = active;
        }
        match patch.expires_at {
            ExpiryPatch::Keep => {}
            ExpiryPatch::Never => link.expires_at = None,
            ExpiryPatch::At(at) => link.expires_at = Some(at),
        }
        link.updated_at = now;
        Ok(1)
    }

    async fn create_view_session(
        &self,
        share_link_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<ViewSession> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        if !tables.share_links.contains_key(&share_link_id) {
            return Err(PortError::Constraint(format!(
                "share link {share_link_id} does not exist"
            )));
        }
        let session = ViewSession {
            id: Uuid::new_v4(),
            share_link_id,
            metadata: metadata.clone(),
            duration_seconds: None,
            ended_at: None,
            scroll_percentage: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.view_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_view_session(&self, session_id: Uuid) -> PortResult<Option<ViewSession>> {
        Ok(self
            .tables
            .read()
            .await
            .view_sessions
            .get(&session_id)
            .filter(|session| session.deleted_at.is_none())
            .cloned())
    }

    async fn merge_view_session_metadata(
        &self,
        session_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<u64> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        match tables.live_session_mut(session_id) {
            Some(session) => {
                session.metadata.merge_from(metadata);
                session.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> PortResult<u64> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        match tables.live_session_mut(session_id) {
            Some(session) => {
                session.scroll_percentage = Some(percentage);
                session.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn close_view_session(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> PortResult<u64> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        match tables.live_session_mut(session_id) {
            Some(session) => {
                let total = session.duration_seconds.unwrap_or(0).saturating_add(added_seconds);
                session.duration_seconds = Some(total);
                session.ended_at = Some(ended_at);
                session.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_view_sessions_for_links(&self, share_link_ids: &[Uuid]) -> PortResult<Vec<ViewSession>> {
        let tables = self.tables.read().await;
        let sessions = tables
            .view_sessions
            .values()
            .filter(|session| {
                session.deleted_at.is_none() && share_link_ids.contains(&session.share_link_id)
            })
            .cloned()
            .collect();
        Ok(sorted_by_created(sessions, |session: &ViewSession| session.created_at))
    }

    async fn upsert_section_dwell(&self, dwell: &SectionDwell) -> PortResult<SectionEngagement> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.ensure_session_and_link(dwell.view_session_id, dwell.share_link_id)?;

        let key = (dwell.view_session_id, dwell.section_label.clone());
        if let Some(position) = tables.section_index.get(&key).copied() {
            let row = tables
                .section_engagements
                .get_mut(position)
                .ok_or_else(|| PortError::Unexpected("section index out of sync".to_string()))?;
            row.seconds = row.seconds.saturating_add(dwell.dwell_seconds);
            row.revisit_count = row.revisit_count.saturating_add(1);
            row.last_ended_at = dwell.observed_end;
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = SectionEngagement {
            id: Uuid::new_v4(),
            view_session_id: dwell.view_session_id,
            share_link_id: dwell.share_link_id,
            section_label: dwell.section_label.clone(),
            seconds: dwell.dwell_seconds,
            revisit_count: 0,
            last_ended_at: dwell.observed_end,
            created_at: now,
            updated_at: now,
        };
        let position = tables.section_engagements.len();
        tables.section_index.insert(key, position);
        tables.section_engagements.push(row.clone());
        Ok(row)
    }

    async fn list_section_engagements_for_sessions(
        &self,
        session_ids: &[Uuid],
    ) -> PortResult<Vec<SectionEngagement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .section_engagements
            .iter()
            .filter(|row| session_ids.contains(&row.view_session_id))
            .cloned()
            .collect())
    }

    async fn insert_click_event(&self, click: &ClickReport) -> PortResult<ClickEvent> {
        let now = self.clock.now();
        let mut tables = self.tables.write().await;
        tables.ensure_session_and_link(click.view_session_id, click.share_link_id)?;
        let event = ClickEvent {
            id: Uuid::new_v4(),
            view_session_id: click.view_session_id,
            share_link_id: click.share_link_id,
            section_label: click.section_label.clone(),
            link: click.link.clone(),
            element_text: click.element_text.clone(),
            created_at: now,
        };
        tables.click_events.push(event.clone());
        Ok(event)
    }

    async fn list_click_events_for_sessions(&self, session_ids: &[Uuid]) -> PortResult<Vec<ClickEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .click_events
            .iter()
            .filter(|event| session_ids.contains(&event.view_session_id))
            .cloned()
            .collect())
    }
}
