use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::services::{ProposalService, GUEST_USER};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Proposal operations over the configured stores.
    pub proposals: ProposalService,
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data,
        })
    }

    fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data,
        })
    }
}

/// Builds the router with all proposal routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/proposals", post(submit_proposal).get(list_all_proposals))
        .route("/api/v1/proposals/user/:user_id", get(list_user_proposals))
        .route("/api/v1/proposals/dashboard/:user_id", get(customer_dashboard))
        .route("/api/v1/proposals/:id", get(get_proposal))
        .route("/api/v1/proposals/:id/status", put(update_proposal_status))
        .route(
            "/api/v1/proposals/:id/communications",
            post(add_communication),
        )
        .route(
            "/api/v1/proposals/:id/documents/:doc_type",
            post(record_document_upload),
        )
        // Request size limit: 1MB max payload
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(1024 * 1024)));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "insurance-proposals-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Caller identity ============

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Authenticated user id, if the request carries one.
fn caller_id(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, "x-user-id")
}

/// Acting admin for audit fields.
fn actor_id(headers: &HeaderMap) -> String {
    header_value(headers, "x-actor-id")
        .unwrap_or("system")
        .to_string()
}

fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(ref expected) = state.config.admin_token else {
        return true;
    };
    header_value(headers, "x-admin-token")
        .map(|token| constant_time_compare(token, expected))
        .unwrap_or(false)
}

/// Validate admin token from X-Admin-Token header
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if state.config.admin_token.is_none() {
        return Ok(());
    }
    if header_value(headers, "x-admin-token").is_none() {
        return Err(AppError::Unauthorized(
            "Missing X-Admin-Token header".to_string(),
        ));
    }
    if !is_admin(state, headers) {
        tracing::warn!("Invalid admin token received");
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }
    Ok(())
}

/// Owners and admins only.
fn require_owner_or_admin(
    state: &AppState,
    headers: &HeaderMap,
    proposal: &Proposal,
) -> Result<(), AppError> {
    if let Some(user_id) = caller_id(headers) {
        if user_id == proposal.user_id {
            return Ok(());
        }
    }
    if state.config.admin_token.is_some() && is_admin(state, headers) {
        return Ok(());
    }
    match caller_id(headers) {
        Some(user_id) => Err(AppError::Forbidden(format!(
            "user {} does not own proposal {}",
            user_id, proposal.proposal_number
        ))),
        None if state.config.admin_token.is_none() => Ok(()),
        None => Err(AppError::Unauthorized(
            "X-User-Id or X-Admin-Token required".to_string(),
        )),
    }
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

// ============ Handlers ============

/// POST /api/v1/proposals
///
/// Submits a proposal for the caller (or `guest`) and returns the assigned
/// number together with the document checklist.
pub async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SubmitProposalRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionReceipt>>), AppError> {
    let user_id = caller_id(&headers).unwrap_or(GUEST_USER).to_string();
    tracing::info!("POST /proposals - user: {}, plan: {}", user_id, request.plan_id);

    let proposal = state.proposals.submit(&user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(
            "Proposal submitted successfully",
            SubmissionReceipt::from(&proposal),
        ),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ProposalStatus>,
}

/// GET /api/v1/proposals/user/:user_id
pub async fn list_user_proposals(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<ProposalPage>>, AppError> {
    tracing::info!("GET /proposals/user/{} - {:?}", user_id, params);

    let pagination = Pagination::new(params.page, params.limit, 10);
    let page = state
        .proposals
        .list_for_user(&user_id, params.status, pagination)
        .await?;

    Ok(ApiResponse::ok(page))
}

/// GET /api/v1/proposals/dashboard/:user_id
pub async fn customer_dashboard(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Dashboard>>, AppError> {
    tracing::info!("GET /proposals/dashboard/{}", user_id);
    let dashboard = state.proposals.dashboard(&user_id).await?;
    Ok(ApiResponse::ok(dashboard))
}

/// GET /api/v1/proposals/:id
pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Proposal>>, AppError> {
    tracing::info!("GET /proposals/{}", id);

    let proposal = state.proposals.get(id).await?;
    require_owner_or_admin(&state, &headers, &proposal)?;

    Ok(ApiResponse::ok(proposal))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateResponse {
    pub proposal_number: String,
    pub status: ProposalStatus,
}

/// PUT /api/v1/proposals/:id/status (admin)
pub async fn update_proposal_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<StatusUpdateResponse>>, AppError> {
    require_admin(&state, &headers)?;
    let updated_by = actor_id(&headers);
    tracing::info!("PUT /proposals/{}/status -> {} by {}", id, request.status, updated_by);

    let proposal = state.proposals.transition(id, request, &updated_by).await?;

    Ok(ApiResponse::with_message(
        "Proposal status updated successfully",
        StatusUpdateResponse {
            proposal_number: proposal.proposal_number,
            status: proposal.status,
        },
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ProposalStatus>,
    pub agent_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

/// GET /api/v1/proposals (admin)
pub async fn list_all_proposals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AdminListParams>,
) -> Result<Json<ApiResponse<AdminProposalPage>>, AppError> {
    require_admin(&state, &headers)?;
    tracing::info!("GET /proposals - {:?}", params);

    let pagination = Pagination::new(params.page, params.limit, 20);
    let filter = ProposalFilter {
        user_id: None,
        status: params.status,
        agent_id: params.agent_id,
        date_from: params.date_from,
        date_to: params.date_to,
        search: params.search.filter(|s| !s.trim().is_empty()),
    };

    let page = state.proposals.list_all(filter, pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// POST /api/v1/proposals/:id/communications (admin)
pub async fn add_communication(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<CommunicationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<usize>>), AppError> {
    require_admin(&state, &headers)?;
    let sent_by = actor_id(&headers);

    let proposal = state
        .proposals
        .add_communication(id, request, &sent_by)
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(
            "Communication logged successfully",
            proposal.communications.len(),
        ),
    ))
}

/// POST /api/v1/proposals/:id/documents/:doc_type
///
/// Records upload metadata for a checklist entry; the file itself is stored
/// elsewhere.
pub async fn record_document_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, doc_type)): Path<(Uuid, String)>,
    Json(upload): Json<DocumentUploadRequest>,
) -> Result<Json<ApiResponse<Vec<RequiredDocument>>>, AppError> {
    let doc_type: DocumentType = doc_type.parse().map_err(AppError::BadRequest)?;

    let proposal = state.proposals.get(id).await?;
    require_owner_or_admin(&state, &headers, &proposal)?;

    let proposal = state
        .proposals
        .record_document_upload(id, doc_type, upload)
        .await?;

    Ok(ApiResponse::ok(proposal.required_documents))
}
