//! Common test utilities: an in-memory ledger store plus domain fixtures.
//!
//! The engine only talks to the [`LedgerStore`] trait, so integration tests
//! run against this store and the mock extraction provider without any
//! external processes.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use matching_service::engine::MatchingEngine;
use matching_service::models::{
    BankStatement, BankTransaction, Expense, InvoiceStatus, MatchStatus, Payment,
    ReceivableInvoice, ReconciliationMatch, ReconciliationRule, ReconciliationStatus,
    RuleConditions, ScoreWeights, StatementStatus, SupplierInvoice,
};
use matching_service::services::extraction::mock::MockExtractionProvider;
use matching_service::services::extraction::{ExtractedFields, ExtractionProvider};
use matching_service::services::store::LedgerStore;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::types::Json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Operation date shared by the transaction fixtures.
pub fn op_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// Document date a few days before the operation date.
pub fn doc_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
}

#[derive(Default)]
struct Inner {
    rules: Vec<ReconciliationRule>,
    transactions: Vec<BankTransaction>,
    receivables: Vec<ReceivableInvoice>,
    payables: Vec<SupplierInvoice>,
    expenses: Vec<Expense>,
    statements: Vec<BankStatement>,
    matches: Vec<ReconciliationMatch>,
    payments: Vec<Payment>,
    fail_receivable_queries: bool,
    fail_payment_inserts: bool,
}

/// In-memory [`LedgerStore`] with the same filtering semantics as the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_rule(&self, rule: ReconciliationRule) {
        self.inner.lock().unwrap().rules.push(rule);
    }

    pub fn seed_transaction(&self, txn: BankTransaction) {
        self.inner.lock().unwrap().transactions.push(txn);
    }

    pub fn seed_receivable(&self, invoice: ReceivableInvoice) {
        self.inner.lock().unwrap().receivables.push(invoice);
    }

    pub fn seed_payable(&self, invoice: SupplierInvoice) {
        self.inner.lock().unwrap().payables.push(invoice);
    }

    pub fn seed_expense(&self, expense: Expense) {
        self.inner.lock().unwrap().expenses.push(expense);
    }

    pub fn seed_statement(&self, statement: BankStatement) {
        self.inner.lock().unwrap().statements.push(statement);
    }

    /// Make receivable queries fail, to exercise store-error propagation.
    pub fn fail_receivable_queries(&self) {
        self.inner.lock().unwrap().fail_receivable_queries = true;
    }

    /// Make payment inserts fail, to exercise best-effort acceptance.
    pub fn fail_payment_inserts(&self) {
        self.inner.lock().unwrap().fail_payment_inserts = true;
    }

    pub fn transaction(&self, transaction_id: Uuid) -> Option<BankTransaction> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned()
    }

    pub fn match_record(&self, match_id: Uuid) -> Option<ReconciliationMatch> {
        self.inner
            .lock()
            .unwrap()
            .matches
            .iter()
            .find(|m| m.match_id == match_id)
            .cloned()
    }

    pub fn receivable(&self, invoice_id: Uuid) -> Option<ReceivableInvoice> {
        self.inner
            .lock()
            .unwrap()
            .receivables
            .iter()
            .find(|i| i.invoice_id == invoice_id)
            .cloned()
    }

    pub fn statement(&self, statement_id: Uuid) -> Option<BankStatement> {
        self.inner
            .lock()
            .unwrap()
            .statements
            .iter()
            .find(|s| s.statement_id == statement_id)
            .cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.inner.lock().unwrap().payments.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn active_rules(&self, org_id: Uuid) -> Result<Vec<ReconciliationRule>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut rules: Vec<_> = inner
            .rules
            .iter()
            .filter(|r| r.org_id == org_id && r.is_active)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }

    async fn open_receivables(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReceivableInvoice>, AppError> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_receivable_queries {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "simulated receivable query failure"
            )));
        }
        Ok(inner
            .receivables
            .iter()
            .filter(|i| {
                i.org_id == org_id
                    && matches!(
                        InvoiceStatus::from_str(&i.status),
                        InvoiceStatus::Unpaid | InvoiceStatus::Partial
                    )
                    && i.balance > Decimal::ZERO
                    && i.issue_date >= from
                    && i.issue_date <= to
            })
            .cloned()
            .collect())
    }

    async fn open_payables(&self, org_id: Uuid) -> Result<Vec<SupplierInvoice>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .payables
            .iter()
            .filter(|i| i.org_id == org_id && i.balance > Decimal::ZERO)
            .cloned()
            .collect())
    }

    async fn expenses_between(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Expense>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .expenses
            .iter()
            .filter(|e| e.org_id == org_id && e.expense_date >= from && e.expense_date <= to)
            .cloned()
            .collect())
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        Ok(self.transaction(transaction_id))
    }

    async fn transactions_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn unmatched_for_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .transactions
            .iter()
            .filter(|t| {
                t.statement_id == statement_id
                    && t.reconciliation_status() == ReconciliationStatus::Unmatched
            })
            .cloned()
            .collect())
    }

    async fn update_transaction_reconciliation(
        &self,
        transaction_id: Uuid,
        status: ReconciliationStatus,
        score: Option<f64>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(txn) = inner
            .transactions
            .iter_mut()
            .find(|t| t.transaction_id == transaction_id)
        {
            txn.reconciliation_status = status.as_str().to_string();
            if score.is_some() {
                txn.reconciliation_score = score;
            }
        }
        Ok(())
    }

    async fn update_transaction_extraction(
        &self,
        transaction_id: Uuid,
        fields: &ExtractedFields,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(txn) = inner
            .transactions
            .iter_mut()
            .find(|t| t.transaction_id == transaction_id)
        {
            txn.ai_invoice_ref = fields.invoice_ref.clone();
            txn.ai_counterparty_name = fields
                .client_name
                .clone()
                .or_else(|| fields.supplier_name.clone());
            txn.ai_operation_type = fields.operation_type.clone();
            txn.ai_confidence = Some(fields.confidence);
        }
        Ok(())
    }

    async fn get_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Option<BankStatement>, AppError> {
        Ok(self.statement(statement_id))
    }

    async fn update_statement_progress(
        &self,
        statement_id: Uuid,
        status: StatementStatus,
        reconciled_count: i32,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(statement) = inner
            .statements
            .iter_mut()
            .find(|s| s.statement_id == statement_id && s.status() != StatementStatus::Closed)
        {
            statement.status = status.as_str().to_string();
            statement.reconciled_count = reconciled_count;
            statement.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn insert_match(&self, record: &ReconciliationMatch) -> Result<(), AppError> {
        self.inner.lock().unwrap().matches.push(record.clone());
        Ok(())
    }

    async fn get_match(
        &self,
        match_id: Uuid,
    ) -> Result<Option<ReconciliationMatch>, AppError> {
        Ok(self.match_record(match_id))
    }

    async fn matches_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<ReconciliationMatch>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .matches
            .iter()
            .filter(|m| m.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        validated_by: Option<Uuid>,
        rejection_reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner
            .matches
            .iter_mut()
            .find(|m| m.match_id == match_id && m.status() == from)
        {
            record.status = to.as_str().to_string();
            if validated_by.is_some() {
                record.validated_by = validated_by;
            }
            record.validated_utc = Some(Utc::now());
            if let Some(reason) = rejection_reason {
                record.rejection_reason = Some(reason.to_string());
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get_receivable(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<ReceivableInvoice>, AppError> {
        Ok(self.receivable(invoice_id))
    }

    async fn apply_receivable_payment(
        &self,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(invoice) = inner
            .receivables
            .iter_mut()
            .find(|i| i.invoice_id == invoice_id)
        {
            invoice.paid_amount = paid_amount;
            invoice.balance = balance;
            invoice.status = status.as_str().to_string();
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_payment_inserts {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "simulated payment insert failure"
            )));
        }
        inner.payments.push(payment.clone());
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn engine(store: &Arc<MemoryStore>) -> MatchingEngine {
    MatchingEngine::new(store.clone(), Arc::new(MockExtractionProvider::new(true)))
}

pub fn engine_with_extractor(
    store: &Arc<MemoryStore>,
    extractor: Arc<dyn ExtractionProvider>,
) -> MatchingEngine {
    MatchingEngine::new(store.clone(), extractor)
}

pub fn amount(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn debit_txn(org_id: Uuid, amt: &str, label: &str) -> BankTransaction {
    BankTransaction {
        transaction_id: Uuid::new_v4(),
        statement_id: Uuid::new_v4(),
        org_id,
        operation_date: op_date(),
        amount: amount(amt),
        currency: "EUR".to_string(),
        direction: "debit".to_string(),
        label: label.to_string(),
        counterparty_name: None,
        counterparty_iban: None,
        counterparty_bic: None,
        ai_invoice_ref: None,
        ai_counterparty_name: None,
        ai_operation_type: None,
        ai_confidence: None,
        reconciliation_status: "unmatched".to_string(),
        reconciliation_score: None,
        created_utc: Utc::now(),
    }
}

pub fn credit_txn(org_id: Uuid, amt: &str, label: &str) -> BankTransaction {
    let mut txn = debit_txn(org_id, amt, label);
    txn.direction = "credit".to_string();
    txn
}

pub fn payable(org_id: Uuid, open: &str, reference: &str, supplier: &str) -> SupplierInvoice {
    SupplierInvoice {
        supplier_invoice_id: Uuid::new_v4(),
        org_id,
        reference: reference.to_string(),
        supplier_name: supplier.to_string(),
        supplier_iban: None,
        invoice_date: doc_date(),
        total: amount(open),
        paid_amount: Decimal::ZERO,
        balance: amount(open),
        status: "unpaid".to_string(),
        currency: "EUR".to_string(),
        created_utc: Utc::now(),
    }
}

pub fn receivable(org_id: Uuid, open: &str, reference: &str, customer: &str) -> ReceivableInvoice {
    ReceivableInvoice {
        invoice_id: Uuid::new_v4(),
        org_id,
        reference: reference.to_string(),
        customer_name: customer.to_string(),
        customer_iban: None,
        issue_date: doc_date(),
        due_date: None,
        total: amount(open),
        paid_amount: Decimal::ZERO,
        balance: amount(open),
        status: "unpaid".to_string(),
        currency: "EUR".to_string(),
        created_utc: Utc::now(),
    }
}

pub fn expense(org_id: Uuid, amt: &str, reference: &str, vendor: &str) -> Expense {
    Expense {
        expense_id: Uuid::new_v4(),
        org_id,
        reference: reference.to_string(),
        vendor_name: vendor.to_string(),
        expense_date: doc_date(),
        amount: amount(amt),
        currency: "EUR".to_string(),
        created_utc: Utc::now(),
    }
}

pub fn statement(org_id: Uuid, transaction_count: i32) -> BankStatement {
    BankStatement {
        statement_id: Uuid::new_v4(),
        bank_account_id: Uuid::new_v4(),
        org_id,
        period_start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        period_end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        opening_balance: Decimal::ZERO,
        closing_balance: Decimal::ZERO,
        source: "file_import".to_string(),
        status: "imported".to_string(),
        transaction_count,
        reconciled_count: 0,
        created_utc: Utc::now(),
        updated_utc: Utc::now(),
    }
}

pub fn tier1_rule(org_id: Uuid, conditions: RuleConditions) -> ReconciliationRule {
    ReconciliationRule {
        rule_id: Uuid::new_v4(),
        org_id,
        code: "EXACT".to_string(),
        match_level: 1,
        conditions: Json(conditions),
        score_weights: Json(ScoreWeights::default()),
        auto_match_threshold: 0.9,
        suggestion_threshold: 0.5,
        priority: 10,
        is_active: true,
        created_utc: Utc::now(),
    }
}

pub fn tier2_rule(
    org_id: Uuid,
    weights: ScoreWeights,
    suggestion_threshold: f64,
) -> ReconciliationRule {
    ReconciliationRule {
        rule_id: Uuid::new_v4(),
        org_id,
        code: "WEIGHTED".to_string(),
        match_level: 2,
        conditions: Json(RuleConditions::default()),
        score_weights: Json(weights),
        auto_match_threshold: 0.9,
        suggestion_threshold,
        priority: 20,
        is_active: true,
        created_utc: Utc::now(),
    }
}
