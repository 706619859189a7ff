//! crates/engagement_core/src/engine.rs
//!
//! Wires every engine component to one injected store and clock.

use std::sync::Arc;

use crate::clicks::ClickEventRecorder;
use crate::clock::Clock;
use crate::documents::DocumentCatalog;
use crate::dwell::EngagementEventAggregator;
use crate::ports::TrackingStore;
use crate::rollup::AnalyticsRollupEngine;
use crate::sessions::ViewSessionTracker;
use crate::share_links::ShareLinkRegistry;

/// Constructed once at startup and shared by every request handler.
#[derive(Clone)]
pub struct Engine {
    pub documents: DocumentCatalog,
    pub share_links: ShareLinkRegistry,
    pub sessions: ViewSessionTracker,
    pub dwell: EngagementEventAggregator,
    pub clicks: ClickEventRecorder,
    pub rollup: AnalyticsRollupEngine,
}

impl Engine {
    pub fn new(store: Arc<dyn TrackingStore>, clock: Arc<dyn Clock>) -> Self {
        let share_links = ShareLinkRegistry::new(store.clone(), clock);
        Self {
            documents: DocumentCatalog::new(store.clone()),
            sessions: ViewSessionTracker::new(store.clone(), share_links.clone()),
            share_links,
            dwell: EngagementEventAggregator::new(store.clone()),
            clicks: ClickEventRecorder::new(store.clone()),
            rollup: AnalyticsRollupEngine::new(store),
        }
    }
}
