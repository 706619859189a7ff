//! crates/engagement_core/src/clicks.rs
//!
//! Append-only click recording.

use std::sync::Arc;
use tracing::debug;

use crate::domain::{ClickEvent, ClickReport};
use crate::error::{EngagementError, EngagementResult};
use crate::ports::TrackingStore;
use crate::sessions::ensure_live_session;

#[derive(Clone)]
pub struct ClickEventRecorder {
    store: Arc<dyn TrackingStore>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ClickEventRecorder {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Always inserts; identical clicks produce distinct rows.
    pub async fn record_click(&self, click: ClickReport) -> EngagementResult<ClickEvent> {
        if click.view_session_id.is_nil() || click.share_link_id.is_nil() {
            return Err(EngagementError::Validation(
                "view session id and share link id are required".to_string(),
            ));
        }
        ensure_live_session(self.store.as_ref(), click.view_session_id, click.share_link_id).await?;

        let click = ClickReport {
            section_label: non_blank(click.section_label),
            link: non_blank(click.link),
            element_text: non_blank(click.element_text),
            ..click
        };
        let event = self.store.insert_click_event(&click).await?;
        debug!(view_session_id = %event.view_session_id, click_event_id = %event.id, "Recorded click");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use uuid::Uuid;

    #[tokio::test]
    async fn identical_clicks_are_stored_twice() {
        let fx = Fixture::new().await;
        let session = fx.session().await;
        let click = ClickReport {
            view_session_id: session.id,
            share_link_id: session.share_link_id,
            section_label: Some("contact".to_string()),
            link: Some("mailto:hi@example.com".to_string()),
            element_text: Some("Email me".to_string()),
        };

        let first = fx.engine.clicks.record_click(click.clone()).await.unwrap();
        let second = fx.engine.clicks.record_click(click).await.unwrap();

        assert_ne!(first.id, second.id);
        let stored = fx
            .store
            .list_click_events_for_sessions(&[session.id])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn blank_optional_fields_are_dropped() {
        let fx = Fixture::new().await;
        let session = fx.session().await;
        let event = fx
            .engine
            .clicks
            .record_click(ClickReport {
                view_session_id: session.id,
                share_link_id: session.share_link_id,
                section_label: Some("  ".to_string()),
                link: Some("https://example.com".to_string()),
                element_text: None,
            })
            .await
            .unwrap();
        assert_eq!(event.section_label, None);
        assert_eq!(event.link.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn missing_ids_are_rejected() {
        let fx = Fixture::new().await;
        let result = fx
            .engine
            .clicks
            .record_click(ClickReport {
                view_session_id: Uuid::nil(),
                share_link_id: Uuid::new_v4(),
                section_label: None,
                link: None,
                element_text: None,
            })
            .await;
        assert!(matches!(result, Err(EngagementError::Validation(_))));
    }

    #[tokio::test]
    async fn clicks_need_a_live_session_on_the_same_link() {
        let fx = Fixture::new().await;
        let session = fx.session().await;
        let other = fx.anonymous_link("Other Client").await;
        let click = |share_link_id| ClickReport {
            view_session_id: session.id,
            share_link_id,
            section_label: None,
            link: Some("https://example.com".to_string()),
            element_text: None,
        };

        assert!(matches!(
            fx.engine.clicks.record_click(click(other.id)).await,
            Err(EngagementError::Validation(_))
        ));

        fx.store.soft_delete_view_session(session.id).await;
        assert!(matches!(
            fx.engine.clicks.record_click(click(session.share_link_id)).await,
            Err(EngagementError::Validation(_))
        ));
        assert!(fx
            .store
            .list_click_events_for_sessions(&[session.id])
            .await
            .unwrap()
            .is_empty());
    }
}
