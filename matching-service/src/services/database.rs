//! Database service for matching-service: the Postgres ledger store.

use crate::models::{
    BankStatement, BankTransaction, Expense, InvoiceStatus, MatchStatus, Payment,
    ReceivableInvoice, ReconciliationMatch, ReconciliationRule, ReconciliationStatus,
    StatementStatus, SupplierInvoice,
};
use crate::services::extraction::ExtractedFields;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::LedgerStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "matching-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn active_rules(&self, org_id: Uuid) -> Result<Vec<ReconciliationRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_rules"])
            .start_timer();

        let rules = sqlx::query_as::<_, ReconciliationRule>(
            r#"
            SELECT rule_id, org_id, code, match_level, conditions, score_weights,
                   auto_match_threshold, suggestion_threshold, priority, is_active, created_utc
            FROM reconciliation_rules
            WHERE org_id = $1 AND is_active = TRUE
            ORDER BY priority, rule_id
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load rules: {}", e)))?;

        timer.observe_duration();
        Ok(rules)
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn open_receivables(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReceivableInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_receivables"])
            .start_timer();

        let invoices = sqlx::query_as::<_, ReceivableInvoice>(
            r#"
            SELECT invoice_id, org_id, reference, customer_name, customer_iban, issue_date,
                   due_date, total, paid_amount, balance, status, currency, created_utc
            FROM receivable_invoices
            WHERE org_id = $1 AND status IN ('unpaid', 'partial') AND balance > 0
              AND issue_date BETWEEN $2 AND $3
            ORDER BY issue_date
            "#,
        )
        .bind(org_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load open receivables: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn open_payables(&self, org_id: Uuid) -> Result<Vec<SupplierInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_payables"])
            .start_timer();

        let invoices = sqlx::query_as::<_, SupplierInvoice>(
            r#"
            SELECT supplier_invoice_id, org_id, reference, supplier_name, supplier_iban,
                   invoice_date, total, paid_amount, balance, status, currency, created_utc
            FROM supplier_invoices
            WHERE org_id = $1 AND balance > 0
            ORDER BY invoice_date
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load open payables: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn expenses_between(
        &self,
        org_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Expense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expenses_between"])
            .start_timer();

        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT expense_id, org_id, reference, vendor_name, expense_date, amount, currency,
                   created_utc
            FROM expenses
            WHERE org_id = $1 AND expense_date BETWEEN $2 AND $3
            ORDER BY expense_date
            "#,
        )
        .bind(org_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load expenses: {}", e)))?;

        timer.observe_duration();
        Ok(expenses)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let transaction = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT transaction_id, statement_id, org_id, operation_date, amount, currency,
                   direction, label, counterparty_name, counterparty_iban, counterparty_bic,
                   ai_invoice_ref, ai_counterparty_name, ai_operation_type, ai_confidence,
                   reconciliation_status, reconciliation_score, created_utc
            FROM bank_transactions
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get transaction: {}", e))
        })?;

        timer.observe_duration();
        Ok(transaction)
    }

    #[instrument(skip(self), fields(org_id = %org_id))]
    async fn transactions_for_org(
        &self,
        org_id: Uuid,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transactions_for_org"])
            .start_timer();

        let transactions = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT transaction_id, statement_id, org_id, operation_date, amount, currency,
                   direction, label, counterparty_name, counterparty_iban, counterparty_bic,
                   ai_invoice_ref, ai_counterparty_name, ai_operation_type, ai_confidence,
                   reconciliation_status, reconciliation_score, created_utc
            FROM bank_transactions
            WHERE org_id = $1
            ORDER BY operation_date, transaction_id
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
        })?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self), fields(statement_id = %statement_id))]
    async fn unmatched_for_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unmatched_for_statement"])
            .start_timer();

        let transactions = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT transaction_id, statement_id, org_id, operation_date, amount, currency,
                   direction, label, counterparty_name, counterparty_iban, counterparty_bic,
                   ai_invoice_ref, ai_counterparty_name, ai_operation_type, ai_confidence,
                   reconciliation_status, reconciliation_score, created_utc
            FROM bank_transactions
            WHERE statement_id = $1 AND reconciliation_status = 'unmatched'
            ORDER BY operation_date, transaction_id
            "#,
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to list unmatched transactions: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn update_transaction_reconciliation(
        &self,
        transaction_id: Uuid,
        status: ReconciliationStatus,
        score: Option<f64>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_transaction_reconciliation"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET reconciliation_status = $2,
                reconciliation_score = COALESCE($3, reconciliation_score)
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(status.as_str())
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to update transaction status: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, extracted), fields(transaction_id = %transaction_id))]
    async fn update_transaction_extraction(
        &self,
        transaction_id: Uuid,
        extracted: &ExtractedFields,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_transaction_extraction"])
            .start_timer();

        let counterparty = extracted
            .client_name
            .clone()
            .or_else(|| extracted.supplier_name.clone());

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET ai_invoice_ref = $2,
                ai_counterparty_name = $3,
                ai_operation_type = $4,
                ai_confidence = $5
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(&extracted.invoice_ref)
        .bind(counterparty)
        .bind(&extracted.operation_type)
        .bind(extracted.confidence)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to store extraction result: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(statement_id = %statement_id))]
    async fn get_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<Option<BankStatement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_statement"])
            .start_timer();

        let statement = sqlx::query_as::<_, BankStatement>(
            r#"
            SELECT statement_id, bank_account_id, org_id, period_start, period_end,
                   opening_balance, closing_balance, source, status, transaction_count,
                   reconciled_count, created_utc, updated_utc
            FROM bank_statements
            WHERE statement_id = $1
            "#,
        )
        .bind(statement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get statement: {}", e)))?;

        timer.observe_duration();
        Ok(statement)
    }

    #[instrument(skip(self), fields(statement_id = %statement_id))]
    async fn update_statement_progress(
        &self,
        statement_id: Uuid,
        status: StatementStatus,
        reconciled_count: i32,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_statement_progress"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE bank_statements
            SET status = $2, reconciled_count = $3, updated_utc = NOW()
            WHERE statement_id = $1 AND status <> 'closed'
            "#,
        )
        .bind(statement_id)
        .bind(status.as_str())
        .bind(reconciled_count)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update statement: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, record), fields(match_id = %record.match_id))]
    async fn insert_match(&self, record: &ReconciliationMatch) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_match"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO reconciliation_matches (
                match_id, org_id, transaction_id, candidate_type, invoice_id,
                supplier_invoice_id, expense_id, matched_amount, remaining_amount,
                confidence_score, is_auto_match, status, validated_by, validated_utc,
                rejection_reason, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(record.match_id)
        .bind(record.org_id)
        .bind(record.transaction_id)
        .bind(&record.candidate_type)
        .bind(record.invoice_id)
        .bind(record.supplier_invoice_id)
        .bind(record.expense_id)
        .bind(record.matched_amount)
        .bind(record.remaining_amount)
        .bind(record.confidence_score)
        .bind(record.is_auto_match)
        .bind(&record.status)
        .bind(record.validated_by)
        .bind(record.validated_utc)
        .bind(&record.rejection_reason)
        .bind(record.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create match: {}", e)))?;

        timer.observe_duration();
        info!(match_id = %record.match_id, "Reconciliation match created");
        Ok(())
    }

    #[instrument(skip(self), fields(match_id = %match_id))]
    async fn get_match(
        &self,
        match_id: Uuid,
    ) -> Result<Option<ReconciliationMatch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_match"])
            .start_timer();

        let record = sqlx::query_as::<_, ReconciliationMatch>(
            r#"
            SELECT match_id, org_id, transaction_id, candidate_type, invoice_id,
                   supplier_invoice_id, expense_id, matched_amount, remaining_amount,
                   confidence_score, is_auto_match, status, validated_by, validated_utc,
                   rejection_reason, created_utc
            FROM reconciliation_matches
            WHERE match_id = $1
            "#,
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get match: {}", e)))?;

        timer.observe_duration();
        Ok(record)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn matches_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<ReconciliationMatch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["matches_for_transaction"])
            .start_timer();

        let records = sqlx::query_as::<_, ReconciliationMatch>(
            r#"
            SELECT match_id, org_id, transaction_id, candidate_type, invoice_id,
                   supplier_invoice_id, expense_id, matched_amount, remaining_amount,
                   confidence_score, is_auto_match, status, validated_by, validated_utc,
                   rejection_reason, created_utc
            FROM reconciliation_matches
            WHERE transaction_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list matches: {}", e)))?;

        timer.observe_duration();
        Ok(records)
    }

    #[instrument(skip(self), fields(match_id = %match_id))]
    async fn transition_match(
        &self,
        match_id: Uuid,
        from: MatchStatus,
        to: MatchStatus,
        validated_by: Option<Uuid>,
        rejection_reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_match"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE reconciliation_matches
            SET status = $3,
                validated_by = COALESCE($4, validated_by),
                validated_utc = NOW(),
                rejection_reason = COALESCE($5, rejection_reason)
            WHERE match_id = $1 AND status = $2
            "#,
        )
        .bind(match_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(validated_by)
        .bind(rejection_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update match status: {}", e))
        })?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_receivable(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<ReceivableInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_receivable"])
            .start_timer();

        let invoice = sqlx::query_as::<_, ReceivableInvoice>(
            r#"
            SELECT invoice_id, org_id, reference, customer_name, customer_iban, issue_date,
                   due_date, total, paid_amount, balance, status, currency, created_utc
            FROM receivable_invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn apply_receivable_payment(
        &self,
        invoice_id: Uuid,
        paid_amount: Decimal,
        balance: Decimal,
        status: InvoiceStatus,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_receivable_payment"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE receivable_invoices
            SET paid_amount = $2, balance = $3, status = $4
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(paid_amount)
        .bind(balance)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, org_id, invoice_id, transaction_id, amount,
                                  payment_date, method, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.org_id)
        .bind(payment.invoice_id)
        .bind(payment.transaction_id)
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(payment.method.as_str())
        .bind(payment.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();
        info!(payment_id = %payment.payment_id, "Payment recorded");
        Ok(())
    }
}
