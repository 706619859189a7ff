//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between clients and the API server:
//! operator requests for documents, share links and analytics, and the
//! tracking pings sent by a viewer's browser.

use chrono::{DateTime, Utc};
use engagement_core::domain::{Document, ShareLink, ViewSession, ViewerMetadata};
use engagement_core::duration::{duration_from_seconds, seconds_from_duration, DurationError};
use engagement_core::rollup::{DocumentReport, LinkReport, SessionReport};
use engagement_core::share_links::encode_share_code;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Response Envelope
//=========================================================================================

/// Every successful response is wrapped as `{ success, message?, data }`.
#[derive(Serialize, Debug)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Body of every failed response.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    /// Present and `true` when the same request may succeed if retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

//=========================================================================================
// Operator Login
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// A session token to send as `Authorization: Bearer <token>`.
#[derive(Serialize, Debug, ToSchema)]
pub struct LoginData {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Duration Input
//=========================================================================================

/// A duration as clients send it: whole seconds, fractional seconds, or an
/// `HH:MM:SS` / `MM:SS` / `SS` string.
#[derive(Deserialize, Debug, Clone, ToSchema)]
#[serde(untagged)]
pub enum DurationInput {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

impl DurationInput {
    pub fn to_seconds(&self) -> Result<u64, DurationError> {
        match self {
            DurationInput::Seconds(seconds) => Ok(*seconds),
            DurationInput::Fractional(value) => {
                if value.is_finite() && *value >= 0.0 && *value <= u64::MAX as f64 {
                    Ok(value.round() as u64)
                } else {
                    Err(DurationError::Malformed(value.to_string()))
                }
            }
            DurationInput::Text(text) => seconds_from_duration(text),
        }
    }
}

/// Seconds for an optional duration field; absent means zero.
pub fn seconds_or_zero(input: Option<&DurationInput>) -> Result<u64, DurationError> {
    input.map_or(Ok(0), DurationInput::to_seconds)
}

//=========================================================================================
// Operator Payloads: Documents
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            document_id: document.id,
            name: document.name.clone(),
            created_by: document.created_by.clone(),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDocumentsQuery {
    /// 1-based page number. Defaults to 1.
    pub page: Option<u32>,
    /// Page size, 1 to 100. Defaults to 10.
    pub limit: Option<u32>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DocumentListData {
    pub documents: Vec<DocumentSummary>,
    pub pagination: Pagination,
}

//=========================================================================================
// Operator Payloads: Share Links
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct EmailShareRequest {
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub emails: Vec<String>,
    /// Origin of the viewer application, e.g. `https://view.example.com`.
    #[serde(default)]
    pub base_url: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct AnonymousShareRequest {
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub base_url: String,
}

/// `expires_at` absent leaves the expiry alone; `null` clears it.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct PatchShareLinkRequest {
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ShareLinkData {
    pub share_link_id: Uuid,
    pub document_id: Uuid,
    pub share_type: String,
    pub share_code: String,
    pub share_url: Option<String>,
    pub recipient_email: Option<String>,
    pub client_label: Option<String>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ShareLink> for ShareLinkData {
    fn from(link: &ShareLink) -> Self {
        Self {
            share_link_id: link.id,
            document_id: link.document_id,
            share_type: link.share_type.as_str().to_string(),
            share_code: encode_share_code(link.id),
            share_url: link.destination_url.clone(),
            recipient_email: link.recipient_email.clone(),
            client_label: link.client_label.clone(),
            active: link.active,
            expires_at: link.expires_at,
            created_at: link.created_at,
        }
    }
}

/// Outcome for one recipient of an email share.
#[derive(Serialize, Debug, ToSchema)]
pub struct EmailShareResult {
    pub email: String,
    /// Absent when the link for this recipient could not be created.
    pub share_link_id: Option<Uuid>,
    pub share_url: Option<String>,
    /// Whether the notifier accepted the link. A failed delivery does not fail the request.
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//=========================================================================================
// Operator Payloads: Analytics
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
pub struct SectionTime {
    pub section: String,
    pub seconds: u64,
    pub time_spent: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ClickInfo {
    pub section: Option<String>,
    pub link: Option<String>,
    pub element_text: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SessionAnalytics {
    pub view_session_id: Uuid,
    pub viewer_ip: Option<String>,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub referrer_url: Option<String>,
    pub duration_seconds: Option<u64>,
    pub total_time_spent: Option<String>,
    pub scroll_percentage: Option<u8>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sections: Vec<SectionTime>,
    pub clicks: Vec<ClickInfo>,
}

impl From<&SessionReport> for SessionAnalytics {
    fn from(report: &SessionReport) -> Self {
        let session: &ViewSession = &report.session;
        let metadata = &session.metadata;
        Self {
            view_session_id: session.id,
            viewer_ip: metadata.viewer_ip.clone(),
            device_type: metadata.device_type.clone(),
            browser_info: metadata.browser_info.clone(),
            location_city: metadata.location_city.clone(),
            location_country: metadata.location_country.clone(),
            referrer_url: metadata.referrer_url.clone(),
            duration_seconds: session.duration_seconds,
            total_time_spent: session.duration_seconds.map(duration_from_seconds),
            scroll_percentage: session.scroll_percentage.map(|p| p.value()),
            ended_at: session.ended_at,
            created_at: session.created_at,
            sections: report
                .sections
                .iter()
                .map(|s| SectionTime {
                    section: s.section.clone(),
                    seconds: s.seconds,
                    time_spent: duration_from_seconds(s.seconds),
                })
                .collect(),
            clicks: report
                .clicks
                .iter()
                .map(|c| ClickInfo {
                    section: c.section.clone(),
                    link: c.link.clone(),
                    element_text: c.element_text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LinkAnalytics {
    #[serde(flatten)]
    pub link: ShareLinkData,
    pub view_count: u64,
    pub sessions: Vec<SessionAnalytics>,
}

impl From<&LinkReport> for LinkAnalytics {
    fn from(report: &LinkReport) -> Self {
        Self {
            link: ShareLinkData::from(&report.link),
            view_count: report.sessions.len() as u64,
            sessions: report.sessions.iter().map(SessionAnalytics::from).collect(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DocumentAnalytics {
    pub document_id: Uuid,
    pub document_name: String,
    pub total_link_count: u64,
    pub total_view_count: u64,
    pub average_read_time_seconds: u64,
    /// `HH:MM:SS`.
    pub average_read_time: String,
    pub links: Vec<LinkAnalytics>,
}

impl From<&DocumentReport> for DocumentAnalytics {
    fn from(report: &DocumentReport) -> Self {
        Self {
            document_id: report.document_id,
            document_name: report.document_name.clone(),
            total_link_count: report.total_link_count,
            total_view_count: report.total_view_count,
            average_read_time_seconds: report.average_read_time_seconds,
            average_read_time: report.average_read_time(),
            links: report.links.iter().map(LinkAnalytics::from).collect(),
        }
    }
}

//=========================================================================================
// Viewer Payloads (Tracking Pings)
//=========================================================================================

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct PreviewRequest {
    #[serde(default)]
    pub share_code: String,
    /// Resume an existing session instead of opening a new one.
    pub view_session_id: Option<Uuid>,
    pub viewer_ip: Option<String>,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
    pub user_agent: Option<String>,
    pub location_city: Option<String>,
    pub location_country: Option<String>,
    pub referrer_url: Option<String>,
}

impl PreviewRequest {
    /// Viewer context carried by the request. Blank strings count as absent.
    pub fn metadata(&self) -> ViewerMetadata {
        fn keep(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        ViewerMetadata {
            viewer_ip: keep(&self.viewer_ip),
            device_type: keep(&self.device_type),
            browser_info: keep(&self.browser_info),
            user_agent: keep(&self.user_agent),
            location_city: keep(&self.location_city),
            location_country: keep(&self.location_country),
            referrer_url: keep(&self.referrer_url),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct PreviewData {
    pub view_session_id: Uuid,
    pub share_link_id: Uuid,
    pub document_name: String,
    pub content: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ScrollUpdateRequest {
    pub view_session_id: Option<Uuid>,
    pub scroll_percentage: Option<i64>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct TrackEventRequest {
    pub view_session_id: Option<Uuid>,
    pub share_link_id: Option<Uuid>,
    pub section_name: Option<String>,
    pub total_time_spent: Option<DurationInput>,
    pub view_end_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct TrackEventData {
    pub section_engagement_id: Uuid,
    pub seconds: u64,
    pub revisit_count: u32,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ViewTimeRequest {
    pub view_session_id: Option<Uuid>,
    pub total_time_spent: Option<DurationInput>,
    /// Defaults to the time the request is handled.
    pub view_end_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ViewTimeData {
    pub view_session_id: Uuid,
    pub duration_seconds: u64,
    pub total_time_spent: String,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct TrackClickRequest {
    pub view_session_id: Option<Uuid>,
    pub share_link_id: Option<Uuid>,
    pub section_name: Option<String>,
    pub link: Option<String>,
    pub element_text: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct TrackClickData {
    pub click_event_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_input_accepts_numbers_and_text() {
        let parse = |raw: &str| serde_json::from_str::<DurationInput>(raw).unwrap().to_seconds();
        assert_eq!(parse("90").unwrap(), 90);
        assert_eq!(parse("12.6").unwrap(), 13);
        assert_eq!(parse("\"01:02:03\"").unwrap(), 3723);
        assert_eq!(parse("\"\"").unwrap(), 0);
        assert!(parse("\"1:xx\"").is_err());
        assert!(parse("-4").is_err());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let absent: PatchShareLinkRequest = serde_json::from_str(r#"{"active": false}"#).unwrap();
        assert_eq!(absent.expires_at, None);
        let cleared: PatchShareLinkRequest = serde_json::from_str(r#"{"expires_at": null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));
        let set: PatchShareLinkRequest =
            serde_json::from_str(r#"{"expires_at": "2030-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.expires_at, Some(Some(_))));
    }

    #[test]
    fn preview_metadata_drops_blank_fields() {
        let request = PreviewRequest {
            device_type: Some("  ".to_string()),
            location_city: Some(" Porto ".to_string()),
            ..Default::default()
        };
        let metadata = request.metadata();
        assert!(metadata.device_type.is_none());
        assert_eq!(metadata.location_city.as_deref(), Some("Porto"));
    }

    #[test]
    fn envelope_omits_absent_message() {
        let json = serde_json::to_value(Envelope::ok(1)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 1 }));
    }
}
