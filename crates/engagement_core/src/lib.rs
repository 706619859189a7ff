pub mod clicks;
pub mod clock;
pub mod documents;
pub mod domain;
pub mod duration;
pub mod dwell;
pub mod engine;
pub mod error;
pub mod memory;
pub mod ports;
pub mod retry;
pub mod rollup;
pub mod sessions;
pub mod share_links;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    ClickEvent, ClickReport, Document, ExpiryPatch, OperatorToken, Page, ScrollPercentage, SectionDwell,
    SectionEngagement, SessionState, ShareLink, ShareLinkPatch, ShareType, ViewSession,
    ViewerMetadata,
};
pub use engine::Engine;
pub use error::{EngagementError, EngagementResult};
pub use memory::InMemoryTrackingStore;
pub use ports::{AccessGate, PortError, PortResult, ShareNotifier, TrackingStore};
pub use retry::{RetryPolicy, RetryingStore};
