//! crates/engagement_core/src/sessions.rs
//!
//! Opening, updating and closing view sessions.
//!
//! A session is Open when created, Updated after any later metadata merge, and
//! Closed once an end time is recorded. Closed is terminal: metadata merges are
//! still accepted but the session keeps its end time.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{ScrollPercentage, ShareLink, ViewSession, ViewerMetadata};
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;
use crate::share_links::ShareLinkRegistry;

/// Single reports above this are kept but flagged in the logs.
pub(crate) const SUSPICIOUS_DWELL_SECONDS: u64 = 24 * 60 * 60;

/// Dwell and click pings must name a live session together with the link it
/// was opened from. Unknown, soft-deleted and mismatched sessions are all
/// validation failures, never `NotFound`.
pub(crate) async fn ensure_live_session(
    store: &dyn TrackingStore,
    session_id: Uuid,
    share_link_id: Uuid,
) -> EngagementResult<()> {
    match store.find_view_session(session_id).await? {
        Some(session) if session.share_link_id == share_link_id => Ok(()),
        Some(session) => Err(EngagementError::Validation(format!(
            "view session {session_id} belongs to share link {}, not {share_link_id}",
            session.share_link_id
        ))),
        None => Err(EngagementError::Validation(format!(
            "view session {session_id} does not exist"
        ))),
    }
}

#[derive(Clone)]
pub struct ViewSessionTracker {
    store: Arc<dyn TrackingStore>,
    registry: ShareLinkRegistry,
}

impl ViewSessionTracker {
    pub fn new(store: Arc<dyn TrackingStore>, registry: ShareLinkRegistry) -> Self {
        Self { store, registry }
    }

    pub async fn start_or_update(
        &self,
        share_link_id: Uuid,
        existing_session_id: Option<Uuid>,
        metadata: ViewerMetadata,
    ) -> EngagementResult<ViewSession> {
        let link = self.registry.resolve_id(share_link_id).await?;
        self.start_or_update_for(&link, existing_session_id, metadata)
            .await
    }

    /// Resolves a viewer's share code, then starts or resumes their session.
    pub async fn open_from_code(
        &self,
        share_code: &str,
        existing_session_id: Option<Uuid>,
        metadata: ViewerMetadata,
    ) -> EngagementResult<(ViewSession, ShareLink)> {
        let link = self.registry.resolve(share_code).await?;
        let session = self
            .start_or_update_for(&link, existing_session_id, metadata)
            .await?;
        Ok((session, link))
    }

    async fn start_or_update_for(
        &self,
        link: &ShareLink,
        existing_session_id: Option<Uuid>,
        metadata: ViewerMetadata,
    ) -> EngagementResult<ViewSession> {
        let Some(session_id) = existing_session_id else {
            let session = self.store.create_view_session(link.id, &metadata).await?;
            info!(view_session_id = %session.id, share_link_id = %link.id, "Opened view session");
            return Ok(session);
        };

        // A session id from another link does not resolve for this one.
        let session = self
            .store
            .find_view_session(session_id)
            .await?
            .filter(|session| session.share_link_id == link.id)
            .ok_or_else(|| EngagementError::NotFound(format!("view session {session_id} not found")))?;

        if metadata.is_empty() {
            return Ok(session);
        }
        let affected = self
            .store
            .merge_view_session_metadata(session_id, &metadata)
            .await?;
        if affected == 0 {
            return Err(EngagementError::NotFound(format!(
                "view session {session_id} not found"
            )));
        }
        debug!(view_session_id = %session_id, state = ?session.state(), "Merged viewer metadata");
        self.fetch(session_id).await
    }

    pub async fn update_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> EngagementResult<()> {
        let affected = self
            .store
            .set_scroll_percentage(session_id, percentage)
            .await?;
        if affected == 0 {
            return Err(EngagementError::NotFound(format!(
                "view session {session_id} not found"
            )));
        }
        debug!(view_session_id = %session_id, percentage = percentage.value(), "Updated scroll depth");
        Ok(())
    }

    /// Adds `added_seconds` to the session's running duration and records the end time.
    pub async fn close(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> EngagementResult<ViewSession> {
        if added_seconds > SUSPICIOUS_DWELL_SECONDS {
            warn!(view_session_id = %session_id, added_seconds, "Implausibly long view time reported");
        }
        let affected = self
            .store
            .close_view_session(session_id, added_seconds, ended_at)
            .await?;
        if affected == 0 {
            return Err(EngagementError::NotFound(format!(
                "view session {session_id} not found"
            )));
        }
        let session = self.fetch(session_id).await?;
        info!(
            view_session_id = %session_id,
            duration_seconds = session.duration_seconds.unwrap_or(0),
            "Closed view session"
        );
        Ok(session)
    }

    async fn fetch(&self, session_id: Uuid) -> EngagementResult<ViewSession> {
        self.store
            .find_view_session(session_id)
            .await?
            .ok_or_else(|| EngagementError::NotFound(format!("view session {session_id} not found")))
    }
}
