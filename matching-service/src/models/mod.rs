//! Domain models for matching-service.

#![allow(clippy::should_implement_trait)]

pub mod candidate;

pub use candidate::{
    CandidateType, MatchCandidate, ReconciliationResult, ReconciliationStats,
    StatementReconciliationSummary,
};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ============================================================================
// Bank Account Models
// ============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BankAccount {
    pub bank_account_id: Uuid,
    pub org_id: Uuid,
    pub label: String,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub ledger_account_code: String,
    pub currency: String,
    pub is_active: bool,
    pub is_default: bool,
    pub last_balance: Option<Decimal>,
    pub balance_synced_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

// ============================================================================
// Statement Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementSource {
    Manual,
    FileImport,
    ApiSync,
}

impl StatementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::FileImport => "file_import",
            Self::ApiSync => "api_sync",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "file_import" => Self::FileImport,
            "api_sync" => Self::ApiSync,
            _ => Self::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Imported,
    Processing,
    Reconciled,
    Closed,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Processing => "processing",
            Self::Reconciled => "reconciled",
            Self::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "reconciled" => Self::Reconciled,
            "closed" => Self::Closed,
            _ => Self::Imported,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BankStatement {
    pub statement_id: Uuid,
    pub bank_account_id: Uuid,
    pub org_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub source: String,
    pub status: String,
    pub transaction_count: i32,
    pub reconciled_count: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl BankStatement {
    pub fn status(&self) -> StatementStatus {
        StatementStatus::from_str(&self.status)
    }
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

impl TransactionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "debit" => Self::Debit,
            _ => Self::Credit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Unmatched,
    Suggested,
    Matched,
    Suspicious,
    Ignored,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Suggested => "suggested",
            Self::Matched => "matched",
            Self::Suspicious => "suspicious",
            Self::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "suggested" => Self::Suggested,
            "matched" => Self::Matched,
            "suspicious" => Self::Suspicious,
            "ignored" => Self::Ignored,
            _ => Self::Unmatched,
        }
    }
}

/// One line of a bank statement. The engine's primary input/output record:
/// it reads the transaction and writes back `reconciliation_status` and
/// `reconciliation_score`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub statement_id: Uuid,
    pub org_id: Uuid,
    pub operation_date: NaiveDate,
    /// Always positive; the sign lives in `direction`.
    pub amount: Decimal,
    pub currency: String,
    pub direction: String,
    pub label: String,
    pub counterparty_name: Option<String>,
    pub counterparty_iban: Option<String>,
    pub counterparty_bic: Option<String>,
    pub ai_invoice_ref: Option<String>,
    pub ai_counterparty_name: Option<String>,
    pub ai_operation_type: Option<String>,
    pub ai_confidence: Option<f64>,
    pub reconciliation_status: String,
    pub reconciliation_score: Option<f64>,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn direction(&self) -> TransactionDirection {
        TransactionDirection::from_str(&self.direction)
    }

    pub fn reconciliation_status(&self) -> ReconciliationStatus {
        ReconciliationStatus::from_str(&self.reconciliation_status)
    }
}

// ============================================================================
// Reconciliation Rule Models
// ============================================================================

/// Binary conditions shared by both rule tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    /// Relative amount tolerance (0.02 = 2%). Unset means exact match only.
    #[serde(default)]
    pub amount_tolerance: Option<f64>,
    #[serde(default)]
    pub date_window_days: Option<i64>,
    #[serde(default)]
    pub require_iban_match: bool,
    #[serde(default)]
    pub require_invoice_ref: bool,
    #[serde(default)]
    pub require_name_match: bool,
    #[serde(default)]
    pub name_similarity_min: Option<f64>,
}

/// Per-component weights for scoring (match level 2) rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default)]
    pub exact_amount: Option<f64>,
    #[serde(default)]
    pub date_proximity: Option<f64>,
    #[serde(default)]
    pub name_similarity: Option<f64>,
    #[serde(default)]
    pub iban_match: Option<f64>,
    #[serde(default)]
    pub invoice_ref_found: Option<f64>,
}

/// The matching strategy a rule belongs to, tagged by `match_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Deterministic,
    Scoring,
    Ai,
}

/// A configured matching policy. Engine behavior is entirely data-driven by
/// this table; rules are organization-scoped and loaded once per session.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReconciliationRule {
    pub rule_id: Uuid,
    pub org_id: Uuid,
    pub code: String,
    pub match_level: i32,
    pub conditions: Json<RuleConditions>,
    pub score_weights: Json<ScoreWeights>,
    pub auto_match_threshold: f64,
    pub suggestion_threshold: f64,
    pub priority: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl ReconciliationRule {
    pub fn kind(&self) -> RuleKind {
        match self.match_level {
            1 => RuleKind::Deterministic,
            2 => RuleKind::Scoring,
            _ => RuleKind::Ai,
        }
    }
}

// ============================================================================
// Reconciliation Match Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Suggested,
    Accepted,
    Rejected,
    Modified,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggested => "suggested",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "modified" => Self::Modified,
            _ => Self::Suggested,
        }
    }
}

/// The persisted matching decision. Exactly one of the document foreign keys
/// is set, according to `candidate_type`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReconciliationMatch {
    pub match_id: Uuid,
    pub org_id: Uuid,
    pub transaction_id: Uuid,
    pub candidate_type: String,
    pub invoice_id: Option<Uuid>,
    pub supplier_invoice_id: Option<Uuid>,
    pub expense_id: Option<Uuid>,
    pub matched_amount: Decimal,
    pub remaining_amount: Decimal,
    pub confidence_score: f64,
    pub is_auto_match: bool,
    pub status: String,
    pub validated_by: Option<Uuid>,
    pub validated_utc: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl ReconciliationMatch {
    pub fn status(&self) -> MatchStatus {
        MatchStatus::from_str(&self.status)
    }

    pub fn candidate_type(&self) -> CandidateType {
        CandidateType::from_str(&self.candidate_type)
    }

    /// The id of whichever document this match settles.
    pub fn entity_id(&self) -> Option<Uuid> {
        self.invoice_id.or(self.supplier_invoice_id).or(self.expense_id)
    }
}

// ============================================================================
// Open Document Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "partial" => Self::Partial,
            "paid" => Self::Paid,
            _ => Self::Unpaid,
        }
    }
}

/// A receivable (customer) invoice.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReceivableInvoice {
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub reference: String,
    pub customer_name: String,
    pub customer_iban: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
}

/// A payable (supplier) invoice.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupplierInvoice {
    pub supplier_invoice_id: Uuid,
    pub org_id: Uuid,
    pub reference: String,
    pub supplier_name: String,
    pub supplier_iban: Option<String>,
    pub invoice_date: NaiveDate,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
}

/// A recorded expense. Expenses are settled in full, so their open amount is
/// the expense amount itself.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expense {
    pub expense_id: Uuid,
    pub org_id: Uuid,
    pub reference: String,
    pub vendor_name: String,
    pub expense_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
}

/// A payment created when a receivable match is accepted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub org_id: Uuid,
    pub invoice_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: String,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Lettrage Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LettrageStatus {
    Partial,
    Balanced,
    Cancelled,
}

impl LettrageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Balanced => "balanced",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "balanced" => Self::Balanced,
            "cancelled" => Self::Cancelled,
            _ => Self::Partial,
        }
    }

    /// Ledger-side clearing is balanced once debits and credits net to zero.
    pub fn for_totals(debit_total: Decimal, credit_total: Decimal) -> Self {
        if debit_total == credit_total {
            Self::Balanced
        } else {
            Self::Partial
        }
    }
}

/// A clearing code grouping ledger entries on a client/supplier control
/// account. Independent lifecycle from bank reconciliation.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccountLettrage {
    pub lettrage_id: Uuid,
    pub org_id: Uuid,
    pub account_code: String,
    pub code: String,
    pub status: String,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl AccountLettrage {
    pub fn status(&self) -> LettrageStatus {
        LettrageStatus::from_str(&self.status)
    }

    pub fn balance(&self) -> Decimal {
        self.debit_total - self.credit_total
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LettrageLine {
    pub line_id: Uuid,
    pub lettrage_id: Uuid,
    pub entry_id: Uuid,
    pub side: String,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}
