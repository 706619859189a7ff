//! services/api/src/adapters/db.rs
//!
//! The PostgreSQL `TrackingStore`. Dwell merges and session closes are single
//! statements so concurrent pings never lose an update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engagement_core::domain::{
    ClickEvent, ClickReport, Document, ExpiryPatch, NewDocument, NewShareLink, ScrollPercentage,
    SectionDwell, SectionEngagement, ShareLink, ShareLinkPatch, ShareType, ViewSession,
    ViewerMetadata,
};
use engagement_core::ports::{PortError, PortResult, TrackingStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `TrackingStore` port.
#[derive(Clone)]
pub struct PgTrackingStore {
    pool: PgPool,
}

impl PgTrackingStore {
    /// Creates a new `PgTrackingStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Sorts sqlx failures into the port's error kinds. Connection-level failures,
/// serialization failures and deadlocks are transient. Dangling foreign keys,
/// failed CHECKs and data exceptions (class 22) are constraint violations.
fn map_db_error(err: sqlx::Error) -> PortError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => PortError::Transient(err.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("40001") | Some("40P01") | Some("57P01") => PortError::Transient(err.to_string()),
            Some("23503") | Some("23514") => PortError::Constraint(db.message().to_string()),
            Some(code) if code.starts_with("22") => PortError::Constraint(db.message().to_string()),
            _ => PortError::Unexpected(err.to_string()),
        },
        _ => PortError::Unexpected(err.to_string()),
    }
}

fn to_db_seconds(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

fn from_db_seconds(seconds: i64) -> u64 {
    u64::try_from(seconds).unwrap_or(0)
}

//=========================================================================================
// Row Records (column lists and their mapping onto domain types)
//=========================================================================================

const DOCUMENT_COLUMNS: &str = "id, name, content, created_by, created_at, updated_at";

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    name: String,
    content: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            name: self.name,
            content: self.content,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const SHARE_LINK_COLUMNS: &str = "id, document_id, recipient_email, client_label, share_type, \
     expires_at, destination_url, active, created_at, updated_at, deleted_at";

#[derive(FromRow)]
struct ShareLinkRecord {
    id: Uuid,
    document_id: Uuid,
    recipient_email: Option<String>,
    client_label: Option<String>,
    share_type: String,
    expires_at: Option<DateTime<Utc>>,
    destination_url: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl ShareLinkRecord {
    fn to_domain(self) -> PortResult<ShareLink> {
        let share_type = ShareType::parse(&self.share_type).ok_or_else(|| {
            PortError::Unexpected(format!("unknown share type '{}'", self.share_type))
        })?;
        Ok(ShareLink {
            id: self.id,
            document_id: self.document_id,
            recipient_email: self.recipient_email,
            client_label: self.client_label,
            share_type,
            expires_at: self.expires_at,
            destination_url: self.destination_url,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

const VIEW_SESSION_COLUMNS: &str = "id, share_link_id, viewer_ip, device_type, browser_info, \
     user_agent, location_city, location_country, referrer_url, duration_seconds, ended_at, \
     scroll_percentage, created_at, updated_at, deleted_at";

#[derive(FromRow)]
struct ViewSessionRecord {
    id: Uuid,
    share_link_id: Uuid,
    viewer_ip: Option<String>,
    device_type: Option<String>,
    browser_info: Option<String>,
    user_agent: Option<String>,
    location_city: Option<String>,
    location_country: Option<String>,
    referrer_url: Option<String>,
    duration_seconds: Option<i64>,
    ended_at: Option<DateTime<Utc>>,
    scroll_percentage: Option<i16>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl ViewSessionRecord {
    fn to_domain(self) -> ViewSession {
        ViewSession {
            id: self.id,
            share_link_id: self.share_link_id,
            metadata: ViewerMetadata {
                viewer_ip: self.viewer_ip,
                device_type: self.device_type,
                browser_info: self.browser_info,
                user_agent: self.user_agent,
                location_city: self.location_city,
                location_country: self.location_country,
                referrer_url: self.referrer_url,
            },
            duration_seconds: self.duration_seconds.map(from_db_seconds),
            ended_at: self.ended_at,
            // The column carries a CHECK constraint, so conversion cannot fail in practice.
            scroll_percentage: self
                .scroll_percentage
                .and_then(|value| ScrollPercentage::try_from(i64::from(value)).ok()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

const SECTION_COLUMNS: &str = "id, view_session_id, share_link_id, section_label, seconds, \
     revisit_count, last_ended_at, created_at, updated_at";

#[derive(FromRow)]
struct SectionEngagementRecord {
    id: Uuid,
    view_session_id: Uuid,
    share_link_id: Uuid,
    section_label: String,
    seconds: i64,
    revisit_count: i32,
    last_ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SectionEngagementRecord {
    fn to_domain(self) -> SectionEngagement {
        SectionEngagement {
            id: self.id,
            view_session_id: self.view_session_id,
            share_link_id: self.share_link_id,
            section_label: self.section_label,
            seconds: from_db_seconds(self.seconds),
            revisit_count: u32::try_from(self.revisit_count).unwrap_or(0),
            last_ended_at: self.last_ended_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const CLICK_COLUMNS: &str =
    "id, view_session_id, share_link_id, section_label, link, element_text, created_at";

#[derive(FromRow)]
struct ClickEventRecord {
    id: Uuid,
    view_session_id: Uuid,
    share_link_id: Uuid,
    section_label: Option<String>,
    link: Option<String>,
    element_text: Option<String>,
    created_at: DateTime<Utc>,
}
impl ClickEventRecord {
    fn to_domain(self) -> ClickEvent {
        ClickEvent {
            id: self.id,
            view_session_id: self.view_session_id,
            share_link_id: self.share_link_id,
            section_label: self.section_label,
            link: self.link,
            element_text: self.element_text,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `TrackingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, name, content, created_by) VALUES ($1, $2, $3, $4) \
             RETURNING {DOCUMENT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&document.name)
            .bind(&document.content)
            .bind(&document.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn find_document(&self, document_id: Uuid) -> PortResult<Option<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND deleted_at IS NULL"
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.map(DocumentRecord::to_domain))
    }

    async fn list_documents(&self, offset: u64, limit: u32) -> PortResult<(Vec<Document>, u64)> {
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?;

        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE deleted_at IS NULL \
             ORDER BY updated_at DESC OFFSET $1 LIMIT $2"
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        let documents = records.into_iter().map(|r| r.to_domain()).collect();
        Ok((documents, u64::try_from(total).unwrap_or(0)))
    }

    async fn create_share_link(&self, link: NewShareLink) -> PortResult<ShareLink> {
        let sql = format!(
            "INSERT INTO share_links (id, document_id, recipient_email, client_label, share_type, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SHARE_LINK_COLUMNS}"
        );
        sqlx::query_as::<_, ShareLinkRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(link.document_id)
            .bind(&link.recipient_email)
            .bind(&link.client_label)
            .bind(link.share_type.as_str())
            .bind(link.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?
            .to_domain()
    }

    async fn find_share_link(&self, share_link_id: Uuid) -> PortResult<Option<ShareLink>> {
        let sql = format!(
            "SELECT {SHARE_LINK_COLUMNS} FROM share_links WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, ShareLinkRecord>(&sql)
            .bind(share_link_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .map(ShareLinkRecord::to_domain)
            .transpose()
    }

    async fn list_share_links_for_document(&self, document_id: Uuid) -> PortResult<Vec<ShareLink>> {
        let sql = format!(
            "SELECT {SHARE_LINK_COLUMNS} FROM share_links \
             WHERE document_id = $1 AND deleted_at IS NULL ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, ShareLinkRecord>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(ShareLinkRecord::to_domain)
            .collect()
    }

    async fn set_share_link_destination(&self, share_link_id: Uuid, url: &str) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE share_links SET destination_url = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(share_link_id)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn patch_share_link(&self, share_link_id: Uuid, patch: &ShareLinkPatch) -> PortResult<u64> {
        let (replace_expiry, expires_at) = match patch.expires_at {
            ExpiryPatch::Keep => (false, None),
            ExpiryPatch::Never => (true, None),
            ExpiryPatch::At(at) => (true, Some(at)),
        };
        let result = sqlx::query(
            "UPDATE share_links SET active = COALESCE($2, active), \
             expires_at = CASE WHEN $3 THEN $4 ELSE expires_at END, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(share_link_id)
        .bind(patch.active)
        .bind(replace_expiry)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn create_view_session(
        &self,
        share_link_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<ViewSession> {
        let sql = format!(
            "INSERT INTO view_sessions (id, share_link_id, viewer_ip, device_type, browser_info, \
             user_agent, location_city, location_country, referrer_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {VIEW_SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ViewSessionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(share_link_id)
            .bind(&metadata.viewer_ip)
            .bind(&metadata.device_type)
            .bind(&metadata.browser_info)
            .bind(&metadata.user_agent)
            .bind(&metadata.location_city)
            .bind(&metadata.location_country)
            .bind(&metadata.referrer_url)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn find_view_session(&self, session_id: Uuid) -> PortResult<Option<ViewSession>> {
        let sql = format!(
            "SELECT {VIEW_SESSION_COLUMNS} FROM view_sessions WHERE id = $1 AND deleted_at IS NULL"
        );
        let record = sqlx::query_as::<_, ViewSessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.map(ViewSessionRecord::to_domain))
    }

    async fn merge_view_session_metadata(
        &self,
        session_id: Uuid,
        metadata: &ViewerMetadata,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE view_sessions SET \
               viewer_ip = COALESCE($2, viewer_ip), \
               device_type = COALESCE($3, device_type), \
               browser_info = COALESCE($4, browser_info), \
               user_agent = COALESCE($5, user_agent), \
               location_city = COALESCE($6, location_city), \
               location_country = COALESCE($7, location_country), \
               referrer_url = COALESCE($8, referrer_url), \
               updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .bind(&metadata.viewer_ip)
        .bind(&metadata.device_type)
        .bind(&metadata.browser_info)
        .bind(&metadata.user_agent)
        .bind(&metadata.location_city)
        .bind(&metadata.location_country)
        .bind(&metadata.referrer_url)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn set_scroll_percentage(
        &self,
        session_id: Uuid,
        percentage: ScrollPercentage,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE view_sessions SET scroll_percentage = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .bind(i16::from(percentage.value()))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn close_view_session(
        &self,
        session_id: Uuid,
        added_seconds: u64,
        ended_at: DateTime<Utc>,
    ) -> PortResult<u64> {
        // Single statement, so concurrent closes both land in the total.
        // The sum saturates at the column maximum like the in-memory store.
        let result = sqlx::query(
            "UPDATE view_sessions SET \
               duration_seconds = LEAST(COALESCE(duration_seconds, 0)::numeric + $2, 9223372036854775807)::bigint, \
               ended_at = $3, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .bind(to_db_seconds(added_seconds))
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn list_view_sessions_for_links(&self, share_link_ids: &[Uuid]) -> PortResult<Vec<ViewSession>> {
        let sql = format!(
            "SELECT {VIEW_SESSION_COLUMNS} FROM view_sessions \
             WHERE share_link_id = ANY($1) AND deleted_at IS NULL ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, ViewSessionRecord>(&sql)
            .bind(share_link_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upsert_section_dwell(&self, dwell: &SectionDwell) -> PortResult<SectionEngagement> {
        let sql = format!(
            "INSERT INTO section_engagements \
               (id, view_session_id, share_link_id, section_label, seconds, revisit_count, last_ended_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6) \
             ON CONFLICT (view_session_id, section_label) DO UPDATE SET \
               seconds = LEAST(section_engagements.seconds::numeric + EXCLUDED.seconds, 9223372036854775807)::bigint, \
               revisit_count = section_engagements.revisit_count + 1, \
               last_ended_at = EXCLUDED.last_ended_at, \
               updated_at = now() \
             RETURNING {SECTION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SectionEngagementRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(dwell.view_session_id)
            .bind(dwell.share_link_id)
            .bind(&dwell.section_label)
            .bind(to_db_seconds(dwell.dwell_seconds))
            .bind(dwell.observed_end)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn list_section_engagements_for_sessions(
        &self,
        session_ids: &[Uuid],
    ) -> PortResult<Vec<SectionEngagement>> {
        let sql = format!(
            "SELECT {SECTION_COLUMNS} FROM section_engagements \
             WHERE view_session_id = ANY($1) ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, SectionEngagementRecord>(&sql)
            .bind(session_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_click_event(&self, click: &ClickReport) -> PortResult<ClickEvent> {
        let sql = format!(
            "INSERT INTO click_events (id, view_session_id, share_link_id, section_label, link, element_text) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {CLICK_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ClickEventRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(click.view_session_id)
            .bind(click.share_link_id)
            .bind(&click.section_label)
            .bind(&click.link)
            .bind(&click.element_text)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn list_click_events_for_sessions(&self, session_ids: &[Uuid]) -> PortResult<Vec<ClickEvent>> {
        let sql = format!(
            "SELECT {CLICK_COLUMNS} FROM click_events \
             WHERE view_session_id = ANY($1) ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, ClickEventRecord>(&sql)
            .bind(session_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_transient() {
        assert!(map_db_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_db_error(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connect timed out"
        )))
        .is_transient());
        assert!(!map_db_error(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn seconds_conversion_saturates() {
        assert_eq!(to_db_seconds(u64::MAX), i64::MAX);
        assert_eq!(from_db_seconds(-5), 0);
        assert_eq!(from_db_seconds(120), 120);
    }
}
