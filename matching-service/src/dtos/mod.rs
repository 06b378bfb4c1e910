//! Request/response types for the HTTP surface.

use crate::models::{ReconciliationMatch, ReconciliationRule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AcceptMatchRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RejectMatchRequest {
    pub user_id: Uuid,
    pub reason: Option<String>,
}

/// Workflow actions report a boolean outcome instead of erroring, so batch
/// callers can continue past unknown ids or stale statuses.
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadRulesResponse {
    pub loaded: usize,
}

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<ReconciliationRule>,
}

#[derive(Debug, Serialize)]
pub struct MatchListResponse {
    pub matches: Vec<ReconciliationMatch>,
}
