//! Ledger store collaborator boundary.
//!
//! Persistence is abstracted behind this trait so the engine only depends on
//! the operations it needs: reference data reads, match lifecycle writes, and
//! the downstream invoice/payment updates triggered by an acceptance. The
//! Postgres implementation lives in [`crate::services::database`].

use crate::models::{
    BankStatement, BankTransaction, Expense, InvoiceStatus, MatchStatus, Payment,
    ReceivableInvoice, ReconciliationMatch, ReconciliationRule, ReconciliationStatus,
    StatementStatus, SupplierInvoice,
};
use crate::services::extraction::ExtractedFields;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Active reconciliation rules for an organization, ordered by priority.
    async fn active_rules(&self, org_id: Uuid) -> Result<Vec<ReconciliationRule>, AppError>;

    /// Open receivable invoices (balance > 0) dated within `[from, to]`.
    async fn open_receivables(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReceivableInvoice>, AppError>;

    /// Open payable invoices (balance > 0), regardless of date.
    async fn open_payables(&self, org_id: Uuid) -> Result<Vec<SupplierInvoice>, AppError>;

    /// Recorded expenses dated within `[from, to]`.
    async fn expenses_between(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Expense>, AppError>;

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError>;

    /// Every bank transaction of an organization (stats scan).
    async fn transactions_for_org(&self, org_id: Uuid)
        -> Result<Vec<BankTransaction>, AppError>;

    /// Unmatched transactions of a statement, in statement order.
    async fn unmatched_for_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Vec<BankTransaction>, AppError>;

    async fn update_transaction_reconciliation(
        &self,
        transaction_id: Uuid,
        status: ReconciliationStatus,
        score: Option<f64>,
    ) -> Result<(), AppError>;

    /// Persist Tier-3 extraction results onto the transaction.
    async fn update_transaction_extraction(
        &self,
        transaction_id: Uuid,
        fields: &ExtractedFields,
    ) -> Result<(), AppError>;

    async fn get_statement(&self, statement_id: Uuid)
        -> Result<Option<BankStatement>, AppError>;

    async fn update_statement_progress(
        &self,
        statement_id: Uuid,
        status: StatementStatus,
        reconciled_count: i32,
    ) -> Result<(), AppError>;

    async fn insert_match(&self, record: &ReconciliationMatch) -> Result<(), AppError>;

    async fn get_match(&self, match_id: Uuid)
        -> Result<Option<ReconciliationMatch>, AppError>;

    async fn matches_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<ReconciliationMatch>, AppError>;

    /// Guarded status transition: only applies when the match is currently in
    /// `from`. Returns whether a row was updated, so concurrent validators
    /// cannot double-apply a decision.
    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        validated_by: Option<Uuid>,
        rejection_reason: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn get_receivable(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<ReceivableInvoice>, AppError>;

    /// Write back recomputed paid amount, balance and status of a receivable.
    async fn apply_receivable_payment(
        &self,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), AppError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;
}
