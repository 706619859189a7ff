//! crates/engagement_core/src/ports.rs
//!
//! What the engagement engine needs from the outside: somewhere to keep
//! documents, links, sessions and engagement rows, a way to deliver share
//! links, and a gate for operator requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ClickEvent, ClickReport, Document, NewDocument, NewShareLink, OperatorToken, ScrollPercentage,
    SectionDwell, SectionEngagement, ShareLink, ShareLinkPatch, ViewSession, ViewerMetadata,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Failure kinds shared by every port. Adapters sort their native errors into these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Connectivity timeout or dropped connection. Eligible for retry.
    #[error("Transient storage failure: {0}")]
    Transient(String),
    /// The store rejected the write, e.g. a dangling foreign key.
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Transient(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Storage collaborator. Every read excludes soft-deleted rows; `update`-style
/// methods return the number of affected rows.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    // --- Documents ---
    async fn create_document(&self, document: NewDocument) -> PortResult<Document>;

    async fn find_document(&self, document_id: Uuid) -> PortResult<Option<Document>>;

    /// Newest `updated_at` first.
    async fn list_documents(&self, offset: u64, limit: u32) -> PortResult<(Vec<Document>, u64)>;

    // --- Share Links ---
    async fn create_share_link(&self, link: NewShareLink) -> PortResult<ShareLink>;

    async fn find_share_link(&self, share_link_id: Uuid) -> PortResult<Option<ShareLink>>;

    async fn list_share_links_for_document(&self, document_id: Uuid) -> PortResult<Vec<ShareLink>>;

    async fn set_share_link_destination(&self, share_link_id: Uuid, url: &str) -> PortResult<u64>;

    async fn patch_share_link(&self, share_link_id: Uuid, patch: &ShareLinkPatch) -> PortResult<u64>;

    // --- View Sessions ---
    async fn create_view_session(
        &self,
        share_link_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<ViewSession>;

    async fn find_view_session(&self, session_id: Uuid) -> PortResult<Option<ViewSession>>;

    /// Overwrites only the fields present in `metadata`.
    async fn merge_view_session_metadata(
        &self,
        session_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<u64>;

    async fn set_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> PortResult<u64>;

    /// Atomically adds `added_seconds` to the accumulated duration (treating a
    /// null duration as zero) and stamps the end time.
    async fn close_view_session(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> PortResult<u64>;

    async fn list_view_sessions_for_links(&self, share_link_ids: &[Uuid]) -> PortResult<Vec<ViewSession>>;

    // --- Section Engagement ---
    /// Creates the (session, section) row or merges into it in one atomic step.
    async fn upsert_section_dwell(&self, dwell: &SectionDwell) -> PortResult<SectionEngagement>;

    async fn list_section_engagements_for_sessions(
        &self,
        session_ids: &[Uuid],
    ) -> PortResult<Vec<SectionEngagement>>;

    // --- Click Events ---
    async fn insert_click_event(&self, click: &ClickReport) -> PortResult<ClickEvent>;

    async fn list_click_events_for_sessions(&self, session_ids: &[Uuid]) -> PortResult<Vec<ClickEvent>>;
}

#[async_trait]
pub trait ShareNotifier: Send + Sync {
    /// Attempts to deliver a share link to one recipient.
    async fn notify_share(&self, recipient: &str, document_name: &str, url: &str) -> PortResult<()>;
}

/// The authorization gate in front of operator operations.
#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn is_authorized(&self, token: &str) -> bool;

    /// Exchanges operator credentials for a session token.
    /// `Ok(None)` means the credentials did not match.
    async fn login(&self, email: &str, password: &str) -> PortResult<Option<OperatorToken>>;

    /// Revokes a token issued by `login`. Unknown tokens are ignored.
    async fn logout(&self, token: &str) -> PortResult<()>;
}
