//! Transient matching structures.
//!
//! A [`MatchCandidate`] only lives for the duration of one reconciliation
//! call; the persisted decision is `ReconciliationMatch`. The two are mapped
//! explicitly at the decision-policy boundary and never share a type.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of document a candidate points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateType {
    Invoice,
    SupplierInvoice,
    Expense,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::SupplierInvoice => "supplier_invoice",
            Self::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "supplier_invoice" => Self::SupplierInvoice,
            "expense" => Self::Expense,
            _ => Self::Invoice,
        }
    }
}

/// An open document considered as a possible settlement for a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub candidate_type: CandidateType,
    pub entity_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub open_amount: Decimal,
    pub date: NaiveDate,
    pub partner_name: Option<String>,
    pub partner_iban: Option<String>,
    /// Always within `[0, 1]`.
    pub score: f64,
    pub reasons: Vec<String>,
}

impl MatchCandidate {
    /// Deduplication key: one entry per document.
    pub fn key(&self) -> (CandidateType, Uuid) {
        (self.candidate_type, self.entity_id)
    }
}

/// Outcome of reconciling one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub success: bool,
    pub matches: Vec<MatchCandidate>,
    pub best_match: Option<MatchCandidate>,
    pub auto_matched: bool,
    pub match_id: Option<Uuid>,
}

/// Organization-wide reconciliation KPIs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationStats {
    pub total: i64,
    pub unmatched: i64,
    pub suggested: i64,
    pub matched: i64,
    pub suspicious: i64,
    pub ignored: i64,
    pub matched_amount: Decimal,
    pub unmatched_amount: Decimal,
    pub auto_match_rate: f64,
}

/// Outcome of reconciling a whole statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatementReconciliationSummary {
    pub total: i64,
    pub auto_matched: i64,
    pub suggested: i64,
    pub failed: i64,
}
