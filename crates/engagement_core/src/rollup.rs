//! crates/engagement_core/src/rollup.rs
//!
//! Builds the nested document report: document -> share links -> view
//! sessions -> section engagement and clicks. Read-only; nothing is mutated.
//!
//! The reads are sequential with no snapshot across them, so a report taken
//! while viewers are active can miss in-flight sessions.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ShareLink, ViewSession};
use crate::duration::duration_from_seconds;
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub section: String,
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickSummary {
    pub section: Option<String>,
    pub link: Option<String>,
    pub element_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: ViewSession,
    pub sections: Vec<SectionSummary>,
    pub clicks: Vec<ClickSummary>,
}

#[derive(Debug, Clone)]
pub struct LinkReport {
    pub link: ShareLink,
    pub sessions: Vec<SessionReport>,
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub document_id: Uuid,
    pub document_name: String,
    pub total_link_count: u64,
    pub total_view_count: u64,
    pub average_read_time_seconds: u64,
    pub links: Vec<LinkReport>,
}

impl DocumentReport {
    /// `HH:MM:SS`; `00:00:00` when no session has reported a duration.
    pub fn average_read_time(&self) -> String {
        duration_from_seconds(self.average_read_time_seconds)
    }
}

/// Mean of the reported durations, rounded half up. Sessions without a
/// duration are left out entirely.
pub fn average_duration_seconds<'a, I>(sessions: I) -> u64
where
    I: IntoIterator<Item = &'a ViewSession>,
{
    let (sum, count) = sessions
        .into_iter()
        .filter_map(|session| session.duration_seconds)
        .fold((0u128, 0u128), |(sum, count), seconds| (sum + u128::from(seconds), count + 1));
    if count == 0 {
        return 0;
    }
    ((sum + count / 2) / count) as u64
}

#[derive(Clone)]
pub struct AnalyticsRollupEngine {
    store: Arc<dyn TrackingStore>,
}

impl AnalyticsRollupEngine {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    pub async fn compute_document_report(&self, document_id: Uuid) -> EngagementResult<DocumentReport> {
        let document = self
            .store
            .find_document(document_id)
            .await?
            .ok_or_else(|| EngagementError::NotFound(format!("document {document_id} not found")))?;

        let links = self.store.list_share_links_for_document(document_id).await?;
        let link_ids: Vec<Uuid> = links.iter().map(|link| link.id).collect();

        let sessions = if link_ids.is_empty() {
            Vec::new()
        } else {
            self.store.list_view_sessions_for_links(&link_ids).await?
        };
        let average_read_time_seconds = average_duration_seconds(&sessions);
        let session_ids: Vec<Uuid> = sessions.iter().map(|session| session.id).collect();

        let (sections, clicks) = if session_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                self.store
                    .list_section_engagements_for_sessions(&session_ids)
                    .await?,
                self.store.list_click_events_for_sessions(&session_ids).await?,
            )
        };

        let mut sections_by_session: HashMap<Uuid, Vec<SectionSummary>> = HashMap::new();
        for row in sections {
            sections_by_session
                .entry(row.view_session_id)
                .or_default()
                .push(SectionSummary {
                    section: row.section_label,
                    seconds: row.seconds,
                });
        }
        let mut clicks_by_session: HashMap<Uuid, Vec<ClickSummary>> = HashMap::new();
        for event in clicks {
            clicks_by_session
                .entry(event.view_session_id)
                .or_default()
                .push(ClickSummary {
                    section: event.section_label,
                    link: event.link,
                    element_text: event.element_text,
                });
        }

        let total_view_count = sessions.len() as u64;
        let mut sessions_by_link: HashMap<Uuid, Vec<SessionReport>> = HashMap::new();
        for session in sessions {
            let report = SessionReport {
                sections: sections_by_session.remove(&session.id).unwrap_or_default(),
                clicks: clicks_by_session.remove(&session.id).unwrap_or_default(),
                session,
            };
            sessions_by_link
                .entry(report.session.share_link_id)
                .or_default()
                .push(report);
        }

        let total_link_count = links.len() as u64;
        let links = links
            .into_iter()
            .map(|link| LinkReport {
                sessions: sessions_by_link.remove(&link.id).unwrap_or_default(),
                link,
            })
            .collect();

        info!(
            %document_id,
            total_link_count,
            total_view_count,
            average_read_time_seconds,
            "Computed document report"
        );
        Ok(DocumentReport {
            document_id,
            document_name: document.name,
            total_link_count,
            total_view_count,
            average_read_time_seconds,
            links,
        })
    }
}
