//! HTTP handlers exposing the engine's public operations.

use crate::dtos::{
    AcceptMatchRequest, LoadRulesResponse, MatchListResponse, RejectMatchRequest, RulesResponse,
    WorkflowResponse,
};
use crate::models::{MatchCandidate, ReconciliationMatch};
use crate::startup::AppState;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn load_rules(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let loaded = state.engine.load_rules(org_id).await?;
    Ok(Json(LoadRulesResponse { loaded }))
}

pub async fn list_rules(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let rules = state.engine.rules_for(org_id).await?;
    Ok(Json(RulesResponse {
        rules: (*rules).clone(),
    }))
}

pub async fn reconcile_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state
        .store
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown transaction")))?;
    let result = state.engine.reconcile_transaction(&txn).await?;
    Ok(Json(result))
}

pub async fn reconcile_statement(
    State(state): State<AppState>,
    Path(statement_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.engine.reconcile_statement(statement_id).await?;
    Ok(Json(summary))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<MatchListResponse>, AppError> {
    let matches = state.engine.matches_for_transaction(transaction_id).await?;
    Ok(Json(MatchListResponse { matches }))
}

pub async fn create_suggestion(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Json(candidate): Json<MatchCandidate>,
) -> Result<Json<ReconciliationMatch>, AppError> {
    let txn = state
        .store
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown transaction")))?;
    let record = state.engine.create_suggestion(&txn, &candidate).await?;
    Ok(Json(record))
}

pub async fn accept_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<AcceptMatchRequest>,
) -> Result<Json<WorkflowResponse>, AppError> {
    let ok = state.engine.accept_match(match_id, request.user_id).await?;
    Ok(Json(WorkflowResponse { ok }))
}

pub async fn reject_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<RejectMatchRequest>,
) -> Result<Json<WorkflowResponse>, AppError> {
    let ok = state
        .engine
        .reject_match(match_id, request.user_id, request.reason.as_deref())
        .await?;
    Ok(Json(WorkflowResponse { ok }))
}

pub async fn ignore_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<WorkflowResponse>, AppError> {
    let ok = state.engine.ignore_transaction(transaction_id).await?;
    Ok(Json(WorkflowResponse { ok }))
}

pub async fn extract_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state
        .store
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown transaction")))?;
    let fields = state.engine.extract_transaction_info(&txn).await?;
    Ok(Json(fields))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.engine.get_stats(org_id).await?;
    Ok(Json(stats))
}
