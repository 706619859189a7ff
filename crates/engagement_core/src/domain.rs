//! crates/engagement_core/src/domain.rs
//!
//! Defines the pure, core data structures for engagement tracking.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngagementError;

/// A shared artifact whose engagement is tracked. Content is owned by ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to store a freshly ingested document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub content: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareType {
    Email,
    Link,
}

impl ShareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareType::Email => "email",
            ShareType::Link => "link",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(ShareType::Email),
            "link" => Some(ShareType::Link),
            _ => None,
        }
    }
}

/// A distributable pointer to a Document.
#[derive(Debug, Clone)]
pub struct ShareLink {
    pub id: Uuid,
    pub document_id: Uuid,
    pub recipient_email: Option<String>,
    pub client_label: Option<String>,
    pub share_type: ShareType,
    /// `None` means the link never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub destination_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ShareLink {
    /// Whether a viewer may open this link at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.deleted_at.is_none()
            && self.expires_at.map_or(true, |expires| expires > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewShareLink {
    pub document_id: Uuid,
    pub recipient_email: Option<String>,
    pub client_label: Option<String>,
    pub share_type: ShareType,
    pub expires_at: Option<DateTime<Utc>>,
}

/// How a patch treats the expiry column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPatch {
    #[default]
    Keep,
    Never,
    At(DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct ShareLinkPatch {
    pub active: Option<bool>,
    pub expires_at: ExpiryPatch,
}

/// Informational viewer context. Every field is optional; on merge only the
/// provided fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerMetadata {
    pub viewer_ip: Option<String>,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
    pub user_agent: Option<String>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub referrer_url: Option<String>,
}

impl ViewerMetadata {
    /// Applies every provided field of `other` on top of `self`.
    pub fn merge_from(&mut self, other: &ViewerMetadata) {
        fn take(slot: &mut Option<String>, incoming: &Option<String>) {
            if incoming.is_some() {
                slot.clone_from(incoming);
            }
        }
        take(&mut self.viewer_ip, &other.viewer_ip);
        take(&mut self.device_type, &other.device_type);
        take(&mut self.browser_info, &other.browser_info);
        take(&mut self.user_agent, &other.user_agent);
        take(&mut self.location_city, &other.location_city);
        take(&mut self.location_country, &other.location_country);
        take(&mut self.referrer_url, &other.referrer_url);
    }

    pub fn is_empty(&self) -> bool {
        *self == ViewerMetadata::default()
    }
}

/// Lifecycle of a view session, derived from its timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Updated,
    Closed,
}

/// One viewer's continuous (possibly resumed) visit through a share link.
#[derive(Debug, Clone)]
pub struct ViewSession {
    pub id: Uuid,
    pub share_link_id: Uuid,
    pub metadata: ViewerMetadata,
    /// Accumulated dwell; `None` until the first duration report.
    pub duration_seconds: Option<u64>,
    pub ended_at: Option<DateTime<Utc>>,
    pub scroll_percentage: Option<ScrollPercentage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ViewSession {
    pub fn state(&self) -> SessionState {
        if self.ended_at.is_some() {
            SessionState::Closed
        } else if self.updated_at > self.created_at {
            SessionState::Updated
        } else {
            SessionState::Open
        }
    }
}

/// Scroll depth as a whole percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScrollPercentage(u8);

impl ScrollPercentage {
    pub const MAX: u8 = 100;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ScrollPercentage {
    type Error = EngagementError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EngagementError::Validation(format!(
                "scroll percentage must be between 0 and 100, got {value}"
            )))
        }
    }
}

/// Accumulated dwell for one (session, section) pair.
#[derive(Debug, Clone)]
pub struct SectionEngagement {
    pub id: Uuid,
    pub view_session_id: Uuid,
    pub share_link_id: Uuid,
    pub section_label: String,
    pub seconds: u64,
    /// Times the viewer left the section and came back.
    pub revisit_count: u32,
    pub last_ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single dwell observation reported by a viewing client.
#[derive(Debug, Clone)]
pub struct SectionDwell {
    pub view_session_id: Uuid,
    pub share_link_id: Uuid,
    pub section_label: String,
    pub dwell_seconds: u64,
    pub observed_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub id: Uuid,
    pub view_session_id: Uuid,
    pub share_link_id: Uuid,
    pub section_label: Option<String>,
    pub link: Option<String>,
    pub element_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClickReport {
    pub view_session_id: Uuid,
    pub share_link_id: Uuid,
    pub section_label: Option<String>,
    pub link: Option<String>,
    pub element_text: Option<String>,
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

/// A session token issued to an operator after a successful login.
#[derive(Debug, Clone)]
pub struct OperatorToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
