//! crates/engagement_core/src/dwell.rs
//!
//! Merges section-dwell reports into one running row per (session, section).
//! Repeated reports for the same pair never create a second row; they add to
//! the accumulated seconds and bump the revisit count.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{SectionDwell, SectionEngagement};
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;
use crate::sessions::{ensure_live_session, SUSPICIOUS_DWELL_SECONDS};

#[derive(Clone)]
pub struct EngagementEventAggregator {
    store: Arc<dyn TrackingStore>,
}

impl EngagementEventAggregator {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// A missing row means "create"; this never reports `NotFound`.
    pub async fn record_section_dwell(
        &self,
        mut dwell: SectionDwell,
    ) -> EngagementResult<SectionEngagement> {
        if dwell.view_session_id.is_nil() || dwell.share_link_id.is_nil() {
            return Err(EngagementError::Validation(
                "view session id and share link id are required".to_string(),
            ));
        }
        dwell.section_label = dwell.section_label.trim().to_string();
        if dwell.dwell_seconds > SUSPICIOUS_DWELL_SECONDS {
            warn!(
                view_session_id = %dwell.view_session_id,
                section = %dwell.section_label,
                dwell_seconds = dwell.dwell_seconds,
                "Implausibly long dwell reported"
            );
        }

        ensure_live_session(self.store.as_ref(), dwell.view_session_id, dwell.share_link_id).await?;

        let row = self.store.upsert_section_dwell(&dwell).await?;
        debug!(
            view_session_id = %row.view_session_id,
            section = %row.section_label,
            seconds = row.seconds,
            revisit_count = row.revisit_count,
            "Recorded section dwell"
        );
        Ok(row)
    }
}
