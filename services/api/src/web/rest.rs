//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the operator REST endpoints (documents, share
//! links, analytics) and the master definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    AnonymousShareRequest, DocumentAnalytics, DocumentListData, DocumentSummary, DurationInput,
    EmailShareRequest, EmailShareResult, Envelope, ErrorBody, ListDocumentsQuery, Pagination,
    PatchShareLinkRequest, PreviewData, PreviewRequest, ScrollUpdateRequest, ShareLinkData,
    TrackClickData, TrackClickRequest, TrackEventData, TrackEventRequest, ViewTimeData,
    ViewTimeRequest,
};
use crate::web::protocol::{LoginData, LoginRequest};
use crate::web::state::AppState;
use crate::web::{auth, tracking};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use engagement_core::domain::{ExpiryPatch, ShareLinkPatch};
use engagement_core::EngagementError;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        upload_document_handler,
        list_documents_handler,
        share_by_email_handler,
        share_by_link_handler,
        patch_share_link_handler,
        document_analytics_handler,
        tracking::preview_handler,
        tracking::update_scroll_handler,
        tracking::track_event_handler,
        tracking::update_view_time_handler,
        tracking::track_click_handler,
    ),
    components(
        schemas(
            DocumentSummary, DocumentListData, Pagination, EmailShareRequest, EmailShareResult,
            AnonymousShareRequest, PatchShareLinkRequest, ShareLinkData, DocumentAnalytics,
            PreviewRequest, PreviewData, ScrollUpdateRequest, TrackEventRequest, TrackEventData,
            ViewTimeRequest, ViewTimeData, TrackClickRequest, TrackClickData, DurationInput,
            LoginRequest, LoginData, ErrorBody
        )
    ),
    modifiers(&OperatorAuth),
    tags(
        (name = "Operator", description = "Document ingestion, sharing and engagement analytics."),
        (name = "Viewer", description = "Tracking pings sent by a viewer's browser.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme that operator routes require.
struct OperatorAuth;

impl Modify for OperatorAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "operator_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Unwraps a required id, treating absence as a validation failure.
pub(crate) fn required_id(id: Option<Uuid>, what: &str) -> Result<Uuid, ApiError> {
    match id {
        Some(id) if !id.is_nil() => Ok(id),
        _ => Err(EngagementError::Validation(format!("{what} is required")).into()),
    }
}

//=========================================================================================
// Document Handlers
//=========================================================================================

/// Upload a document.
///
/// Accepts a multipart/form-data request with a `name` text part and a `file`
/// part holding UTF-8 text. An optional `created_by` part tags the upload.
#[utoipa::path(
    post,
    path = "/v1/documents",
    tag = "Operator",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Document stored", body = DocumentSummary),
        (status = 400, description = "Missing name or file, or the file is not UTF-8 text", body = ErrorBody),
        (status = 401, description = "Missing or invalid operator token", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut name: Option<String> = None;
    let mut created_by: Option<String> = None;
    let mut file: Option<(Option<String>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e.body_text())))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => {
                name = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.body_text()))?);
            }
            "created_by" => {
                created_by =
                    Some(field.text().await.map_err(|e| ApiError::BadRequest(e.body_text()))?);
            }
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e.body_text())))?;
                let text = String::from_utf8(data.to_vec()).map_err(|e| {
                    ApiError::BadRequest(format!("Uploaded file is not valid UTF-8 text: {}", e))
                })?;
                file = Some((file_name, text));
            }
            _ => {}
        }
    }

    let (file_name, content) =
        file.ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .or(file_name)
        .ok_or_else(|| ApiError::BadRequest("Document name is required".to_string()))?;
    let created_by = created_by
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "operator".to_string());

    let document = app_state
        .engine
        .documents
        .ingest(&name, content, created_by.trim())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "Document uploaded successfully",
            DocumentSummary::from(&document),
        )),
    ))
}

/// List stored documents, newest first.
#[utoipa::path(
    get,
    path = "/v1/documents",
    tag = "Operator",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "One page of documents", body = DocumentListData),
        (status = 401, description = "Missing or invalid operator token", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn list_documents_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<ListDocumentsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let page = app_state
        .engine
        .documents
        .list(query.page, query.limit)
        .await?;

    let data = DocumentListData {
        documents: page.items.iter().map(DocumentSummary::from).collect(),
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages(),
        },
    };
    Ok(Json(Envelope::ok(data)))
}

//=========================================================================================
// Share Link Handlers
//=========================================================================================

/// Create one email share link per recipient and hand each to the notifier.
///
/// Link creation and delivery are reported per recipient. Links created
/// before a storage failure are kept; the request only fails when no link
/// could be created at all.
#[utoipa::path(
    post,
    path = "/v1/share/email",
    tag = "Operator",
    request_body = EmailShareRequest,
    responses(
        (status = 201, description = "Links created", body = [EmailShareResult]),
        (status = 400, description = "No recipients, an invalid address or a missing base URL", body = ErrorBody),
        (status = 404, description = "Unknown document", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn share_by_email_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<EmailShareRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let document_id = required_id(payload.document_id, "document_id")?;

    let engine = &app_state.engine;
    let outcomes = engine
        .share_links
        .create_email_links(document_id, &payload.emails, &payload.base_url)
        .await?;
    let document = engine.documents.get(document_id).await?;

    let deliveries = outcomes.iter().map(|outcome| {
        let notifier = app_state.notifier.clone();
        let document_name = document.name.clone();
        let email = outcome.email.clone();
        let url = outcome
            .link
            .as_ref()
            .ok()
            .and_then(|link| link.destination_url.clone());
        async move {
            let Some(url) = url else {
                return false;
            };
            match notifier.notify_share(&email, &document_name, &url).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(recipient = %email, error = %e, "Share notification failed");
                    false
                }
            }
        }
    });
    let delivered = join_all(deliveries).await;

    let results: Vec<EmailShareResult> = outcomes
        .into_iter()
        .zip(delivered)
        .map(|(outcome, delivered)| match outcome.link {
            Ok(link) => EmailShareResult {
                email: outcome.email,
                share_link_id: Some(link.id),
                share_url: link.destination_url,
                delivered,
                error: None,
            },
            Err(err) => EmailShareResult {
                email: outcome.email,
                share_link_id: None,
                share_url: None,
                delivered: false,
                error: Some(ApiError::from(err).public_message()),
            },
        })
        .collect();

    let created = results.iter().filter(|r| r.share_link_id.is_some()).count();
    let sent = results.iter().filter(|r| r.delivered).count();
    info!(%document_id, recipients = results.len(), created, delivered = sent, "Shared document by email");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            format!("Created {} of {} share link(s), {} delivered", created, results.len(), sent),
            results,
        )),
    ))
}

/// Create an anonymous share link labelled with a client name.
#[utoipa::path(
    post,
    path = "/v1/share/link",
    tag = "Operator",
    request_body = AnonymousShareRequest,
    responses(
        (status = 201, description = "Link created", body = ShareLinkData),
        (status = 400, description = "Blank client name or base URL", body = ErrorBody),
        (status = 404, description = "Unknown document", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn share_by_link_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<AnonymousShareRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let document_id = required_id(payload.document_id, "document_id")?;
    if payload.base_url.trim().is_empty() {
        return Err(EngagementError::Validation("base_url is required".to_string()).into());
    }

    let registry = &app_state.engine.share_links;
    let link = registry
        .create_anonymous_link(document_id, &payload.client_name)
        .await?;
    let link = registry
        .attach_destination_url(link.id, &payload.base_url)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "Share link created successfully",
            ShareLinkData::from(&link),
        )),
    ))
}

/// Activate or deactivate a share link, or change its expiry.
#[utoipa::path(
    patch,
    path = "/v1/share/{share_link_id}",
    tag = "Operator",
    params(("share_link_id" = Uuid, Path, description = "The share link to change.")),
    request_body = PatchShareLinkRequest,
    responses(
        (status = 200, description = "Updated link", body = ShareLinkData),
        (status = 404, description = "Unknown share link", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn patch_share_link_handler(
    State(app_state): State<Arc<AppState>>,
    Path(share_link_id): Path<Uuid>,
    payload: Result<Json<PatchShareLinkRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let patch = ShareLinkPatch {
        active: payload.active,
        expires_at: match payload.expires_at {
            None => ExpiryPatch::Keep,
            Some(None) => ExpiryPatch::Never,
            Some(Some(at)) => ExpiryPatch::At(at),
        },
    };
    let link = app_state.engine.share_links.patch(share_link_id, &patch).await?;
    Ok(Json(Envelope::ok(ShareLinkData::from(&link))))
}

//=========================================================================================
// Analytics Handler
//=========================================================================================

/// Engagement rollup for one document: links, sessions, sections and clicks.
#[utoipa::path(
    get,
    path = "/v1/documents/{document_id}/analytics",
    tag = "Operator",
    params(("document_id" = Uuid, Path, description = "The document to report on.")),
    responses(
        (status = 200, description = "Engagement report", body = DocumentAnalytics),
        (status = 404, description = "Unknown document", body = ErrorBody),
        (status = 503, description = "Storage temporarily unavailable", body = ErrorBody)
    ),
    security(("operator_token" = []))
)]
pub async fn document_analytics_handler(
    State(app_state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .engine
        .rollup
        .compute_document_report(document_id)
        .await?;
    Ok(Json(Envelope::ok(DocumentAnalytics::from(&report))))
}
