//! services/api/src/web/tracking.rs
//!
//! Public handlers for the pings a viewer's browser sends while a shared
//! document is open. None of these require an operator token.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Json},
};
use engagement_core::domain::{ClickReport, ScrollPercentage, SectionDwell};
use engagement_core::duration::duration_from_seconds;
use engagement_core::{Clock, EngagementError};
use std::sync::Arc;

use crate::error::ApiError;
use crate::web::protocol::{
    seconds_or_zero, Envelope, ErrorBody, PreviewData, PreviewRequest, ScrollUpdateRequest,
    TrackClickData, TrackClickRequest, TrackEventData, TrackEventRequest, ViewTimeData,
    ViewTimeRequest,
};
use crate::web::rest::required_id;
use crate::web::state::AppState;

/// Open (or resume) a view session and return the document to render.
#[utoipa::path(
    post,
    path = "/v1/open/preview",
    tag = "Viewer",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Session opened", body = PreviewData),
        (status = 400, description = "Missing share code", body = ErrorBody),
        (status = 404, description = "Share link invalid, inactive or expired", body = ErrorBody)
    )
)]
pub async fn preview_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    if payload.share_code.trim().is_empty() {
        return Err(EngagementError::Validation("share_code is required".to_string()).into());
    }

    let mut metadata = payload.metadata();
    if metadata.user_agent.is_none() {
        metadata.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    let engine = &app_state.engine;
    let (session, link) = engine
        .sessions
        .open_from_code(&payload.share_code, payload.view_session_id, metadata)
        .await?;
    let document = engine.documents.get(link.document_id).await?;

    Ok(Json(Envelope::ok(PreviewData {
        view_session_id: session.id,
        share_link_id: link.id,
        document_name: document.name,
        content: document.content,
    })))
}

/// Record how far down the document the viewer has scrolled.
#[utoipa::path(
    post,
    path = "/v1/open/update-scroll",
    tag = "Viewer",
    request_body = ScrollUpdateRequest,
    responses(
        (status = 200, description = "Scroll depth stored"),
        (status = 400, description = "Missing id or percentage outside 0 to 100", body = ErrorBody),
        (status = 404, description = "Unknown view session", body = ErrorBody)
    )
)]
pub async fn update_scroll_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ScrollUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let session_id = required_id(payload.view_session_id, "view_session_id")?;
    let raw = payload.scroll_percentage.ok_or_else(|| {
        ApiError::from(EngagementError::Validation("scroll_percentage is required".to_string()))
    })?;
    let percentage = ScrollPercentage::try_from(raw)?;

    app_state
        .engine
        .sessions
        .update_scroll_percentage(session_id, percentage)
        .await?;
    Ok(Json(Envelope::with_message("Scroll percentage updated successfully", ())))
}

/// Merge one section dwell observation into the session's running total.
#[utoipa::path(
    post,
    path = "/v1/open/track-event",
    tag = "Viewer",
    request_body = TrackEventRequest,
    responses(
        (status = 200, description = "Dwell merged", body = TrackEventData),
        (status = 400, description = "Missing ids or malformed duration", body = ErrorBody),
        (status = 503, description = "Storage temporarily unavailable", body = ErrorBody)
    )
)]
pub async fn track_event_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<TrackEventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let view_session_id = required_id(payload.view_session_id, "view_session_id")?;
    let share_link_id = required_id(payload.share_link_id, "share_link_id")?;
    let dwell_seconds =
        seconds_or_zero(payload.total_time_spent.as_ref()).map_err(EngagementError::from)?;

    let row = app_state
        .engine
        .dwell
        .record_section_dwell(SectionDwell {
            view_session_id,
            share_link_id,
            section_label: payload.section_name.unwrap_or_default(),
            dwell_seconds,
            observed_end: payload.view_end_time,
        })
        .await?;

    Ok(Json(Envelope::with_message(
        "View event tracked successfully",
        TrackEventData {
            section_engagement_id: row.id,
            seconds: row.seconds,
            revisit_count: row.revisit_count,
        },
    )))
}

/// Add the reported time to the session and mark it closed.
#[utoipa::path(
    post,
    path = "/v1/open/update-view-time",
    tag = "Viewer",
    request_body = ViewTimeRequest,
    responses(
        (status = 200, description = "Session closed", body = ViewTimeData),
        (status = 400, description = "Missing id or malformed duration", body = ErrorBody),
        (status = 404, description = "Unknown view session", body = ErrorBody)
    )
)]
pub async fn update_view_time_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ViewTimeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let session_id = required_id(payload.view_session_id, "view_session_id")?;
    let added_seconds =
        seconds_or_zero(payload.total_time_spent.as_ref()).map_err(EngagementError::from)?;
    let ended_at = payload
        .view_end_time
        .unwrap_or_else(|| app_state.clock.now());

    let session = app_state
        .engine
        .sessions
        .close(session_id, added_seconds, ended_at)
        .await?;
    let duration_seconds = session.duration_seconds.unwrap_or(0);

    Ok(Json(Envelope::with_message(
        "View time updated successfully",
        ViewTimeData {
            view_session_id: session.id,
            duration_seconds,
            total_time_spent: duration_from_seconds(duration_seconds),
            ended_at: session.ended_at,
        },
    )))
}

/// Append a click record.
#[utoipa::path(
    post,
    path = "/v1/open/track-click",
    tag = "Viewer",
    request_body = TrackClickRequest,
    responses(
        (status = 200, description = "Click stored", body = TrackClickData),
        (status = 400, description = "Missing ids", body = ErrorBody)
    )
)]
pub async fn track_click_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<TrackClickRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let view_session_id = required_id(payload.view_session_id, "view_session_id")?;
    let share_link_id = required_id(payload.share_link_id, "share_link_id")?;

    let click = app_state
        .engine
        .clicks
        .record_click(ClickReport {
            view_session_id,
            share_link_id,
            section_label: payload.section_name,
            link: payload.link,
            element_text: payload.element_text,
        })
        .await?;

    Ok(Json(Envelope::with_message(
        "Click tracked successfully",
        TrackClickData {
            click_event_id: click.id,
        },
    )))
}
