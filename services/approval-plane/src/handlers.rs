//! Approval API handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{PendingTicket, ResolveRequest, ResolveResponse};
use crate::store::ResolveOutcome;
use crate::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Identity recorded for approvals arriving through this API.
const WEB_APPROVER: &str = "human_via_web_ui";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// GET /pending - tickets awaiting a decision, most recent first
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PendingTicket>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);

    let tickets = state
        .store
        .list_pending(limit)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("Found {} pending trades", tickets.len());
    Ok(Json(tickets.into_iter().map(PendingTicket::from).collect()))
}

/// GET /history - recent decisions regardless of status
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PendingTicket>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);

    let tickets = state
        .store
        .history(limit)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(tickets.into_iter().map(PendingTicket::from).collect()))
}

/// POST /approve - resolve a pending ticket
///
/// Already-resolved tickets report an error payload with HTTP 200: the
/// caller's decision arrived late, which is expected, not exceptional.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveRequest>,
) -> Result<(StatusCode, Json<ResolveResponse>), (StatusCode, String)> {
    info!(
        "Processing {} for ticket {}",
        if req.approved { "approval" } else { "rejection" },
        req.ticket_id
    );

    let outcome = state
        .store
        .resolve(&req.ticket_id, req.approved, WEB_APPROVER, req.notes)
        .await
        .map_err(|e| {
            error!("Resolve failed for ticket {}: {}", req.ticket_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let response = match outcome {
        ResolveOutcome::Executed(t) => ResolveResponse {
            status: "executed".to_string(),
            message: format!(
                "Paper trade executed: {} shares of {} @ {}",
                t.quantity.unwrap_or_default(),
                t.asx_code,
                t.execution_price.unwrap_or_default()
            ),
            details: Some(json!({
                "ticketId": t.ticket_id,
                "decisionId": t.id,
                "asxCode": t.asx_code,
                "quantity": t.quantity,
                "executionPrice": t.execution_price,
                "tradeAmount": t.trade_amount,
            })),
        },
        ResolveOutcome::Rejected(t) => ResolveResponse {
            status: "rejected".to_string(),
            message: format!(
                "Trade rejected for {}. Reason: {}",
                t.asx_code,
                t.human_feedback.as_deref().unwrap_or("No reason provided")
            ),
            details: Some(json!({
                "ticketId": t.ticket_id,
                "decisionId": t.id,
                "asxCode": t.asx_code,
            })),
        },
        ResolveOutcome::AlreadyResolved(t) => ResolveResponse {
            status: "error".to_string(),
            message: format!(
                "Ticket {} was already resolved to {:?}",
                t.ticket_id, t.status
            ),
            details: Some(json!({
                "reason": "already_resolved",
                "ticketId": t.ticket_id,
                "status": t.status,
                "executed": t.executed,
            })),
        },
        ResolveOutcome::NotFound => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(ResolveResponse {
                    status: "error".to_string(),
                    message: format!("No decision found for ticket {}", req.ticket_id),
                    details: Some(json!({ "reason": "not_found" })),
                }),
            ));
        }
    };

    Ok((StatusCode::OK, Json(response)))
}

/// GET /health - liveness probe, pings the backing store
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "approval-plane",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "service": "approval-plane" })),
            )
        }
    }
}
