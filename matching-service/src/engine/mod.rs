//! The matching engine: candidate finding, rule tiers, decision policy and
//! the match accept/reject workflow.

pub mod candidates;
pub mod rules;
pub mod similarity;

use crate::models::{
    BankTransaction, CandidateType, InvoiceStatus, MatchCandidate, MatchStatus, Payment,
    ReconciliationMatch, ReconciliationResult, ReconciliationRule, ReconciliationStats,
    ReconciliationStatus, RuleKind, StatementReconciliationSummary, StatementStatus,
};
use crate::services::extraction::{
    ExtractedFields, ExtractionProvider, ExtractionRequest, OperationType,
};
use crate::services::metrics::{record_engine_operation, record_extraction, record_tier_matches};
use crate::services::store::LedgerStore;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Confidence bar above which a match is created and accepted without review.
pub const AUTO_MATCH_THRESHOLD: f64 = 0.9;

/// Maximum number of suggestions returned per transaction.
pub const MAX_SUGGESTIONS: usize = 5;

/// The reconciliation engine. One instance serves many organizations; the
/// per-organization rules cache is loaded once and treated as read-only for
/// the engine's lifetime, so independent transactions may be reconciled
/// concurrently.
pub struct MatchingEngine {
    store: Arc<dyn LedgerStore>,
    extractor: Arc<dyn ExtractionProvider>,
    rules: RwLock<HashMap<Uuid, Arc<Vec<ReconciliationRule>>>>,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn LedgerStore>, extractor: Arc<dyn ExtractionProvider>) -> Self {
        Self {
            store,
            extractor,
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Load (or reload) the active rules of an organization into the cache.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn load_rules(&self, org_id: Uuid) -> Result<usize, AppError> {
        let rules = self.store.active_rules(org_id).await?;
        let count = rules.len();
        self.rules.write().await.insert(org_id, Arc::new(rules));
        info!(count = count, "Reconciliation rules loaded");
        Ok(count)
    }

    /// Cached rules for an organization, loading them on first use.
    pub async fn rules_for(&self, org_id: Uuid) -> Result<Arc<Vec<ReconciliationRule>>, AppError> {
        if let Some(rules) = self.rules.read().await.get(&org_id) {
            return Ok(rules.clone());
        }
        self.load_rules(org_id).await?;
        Ok(self
            .rules
            .read()
            .await
            .get(&org_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new())))
    }

    /// Reconcile one bank transaction.
    ///
    /// Runs the candidate finder, then the deterministic tier and, only if it
    /// produced nothing, the scoring tier. The deduplicated, ranked shortlist
    /// is returned; when the top candidate clears [`AUTO_MATCH_THRESHOLD`] an
    /// accepted match is persisted immediately and the transaction is marked
    /// matched.
    #[instrument(skip(self, txn), fields(transaction_id = %txn.transaction_id, org_id = %txn.org_id))]
    pub async fn reconcile_transaction(
        &self,
        txn: &BankTransaction,
    ) -> Result<ReconciliationResult, AppError> {
        let rules = self.rules_for(txn.org_id).await?;
        let candidates = candidates::find_candidates(self.store.as_ref(), txn).await?;

        let outcome = rules::run_match_tiers(&rules, txn, &candidates);
        match outcome.tier {
            Some(RuleKind::Deterministic) => record_tier_matches("deterministic", outcome.hits.len()),
            Some(RuleKind::Scoring) => record_tier_matches("scoring", outcome.hits.len()),
            _ => {}
        }

        let ranked = dedupe_and_rank(outcome.hits);
        let shortlist: Vec<MatchCandidate> =
            ranked.into_iter().take(MAX_SUGGESTIONS).collect();
        let best_match = shortlist.first().cloned();

        if let Some(top) = &best_match {
            if top.score >= AUTO_MATCH_THRESHOLD {
                let record = build_match(txn, top, MatchStatus::Accepted, true);
                self.store.insert_match(&record).await?;
                self.store
                    .update_transaction_reconciliation(
                        txn.transaction_id,
                        ReconciliationStatus::Matched,
                        Some(top.score),
                    )
                    .await?;

                info!(
                    match_id = %record.match_id,
                    score = top.score,
                    "Transaction auto-matched"
                );
                record_engine_operation("reconcile_transaction", "auto_matched");

                return Ok(ReconciliationResult {
                    success: true,
                    matches: shortlist,
                    best_match,
                    auto_matched: true,
                    match_id: Some(record.match_id),
                });
            }
        }

        record_engine_operation(
            "reconcile_transaction",
            if best_match.is_some() { "suggested" } else { "no_candidates" },
        );

        Ok(ReconciliationResult {
            success: true,
            matches: shortlist,
            best_match,
            auto_matched: false,
            match_id: None,
        })
    }

    /// Persist a suggestion picked by a reviewer as a `suggested` match and
    /// move the transaction to `suggested`.
    #[instrument(skip(self, txn, candidate), fields(transaction_id = %txn.transaction_id))]
    pub async fn create_suggestion(
        &self,
        txn: &BankTransaction,
        candidate: &MatchCandidate,
    ) -> Result<ReconciliationMatch, AppError> {
        let record = build_match(txn, candidate, MatchStatus::Suggested, false);
        self.store.insert_match(&record).await?;
        self.store
            .update_transaction_reconciliation(
                txn.transaction_id,
                ReconciliationStatus::Suggested,
                Some(candidate.score),
            )
            .await?;
        record_engine_operation("create_suggestion", "ok");
        Ok(record)
    }

    /// Accept a suggested match. Returns `false` for an unknown match id or a
    /// match that is no longer `suggested`, so batch callers can continue.
    ///
    /// The match-status update is the transactional boundary: the downstream
    /// transaction/invoice/payment updates are best-effort and their failure
    /// does not undo the acceptance.
    #[instrument(skip(self), fields(match_id = %match_id, user_id = %user_id))]
    pub async fn accept_match(&self, match_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let Some(record) = self.store.get_match(match_id).await? else {
            record_engine_operation("accept_match", "not_found");
            return Ok(false);
        };
        if record.status() != MatchStatus::Suggested {
            record_engine_operation("accept_match", "wrong_status");
            return Ok(false);
        }

        let updated = self
            .store
            .transition_match(
                match_id,
                MatchStatus::Suggested,
                MatchStatus::Accepted,
                Some(user_id),
                None,
            )
            .await?;
        if !updated {
            record_engine_operation("accept_match", "wrong_status");
            return Ok(false);
        }

        if let Err(e) = self
            .store
            .update_transaction_reconciliation(
                record.transaction_id,
                ReconciliationStatus::Matched,
                Some(record.confidence_score),
            )
            .await
        {
            warn!(
                error = %e,
                transaction_id = %record.transaction_id,
                "Transaction status update failed after acceptance; manual follow-up required"
            );
        }

        if record.candidate_type() == CandidateType::Invoice {
            if let Err(e) = self.settle_receivable(&record).await {
                warn!(
                    error = %e,
                    match_id = %match_id,
                    "Downstream invoice update failed after acceptance; manual follow-up required"
                );
            }
        }

        record_engine_operation("accept_match", "accepted");
        Ok(true)
    }

    /// Reject a suggested match with an optional free-text reason. The
    /// transaction's reconciliation status is left untouched.
    #[instrument(skip(self, reason), fields(match_id = %match_id, user_id = %user_id))]
    pub async fn reject_match(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let Some(record) = self.store.get_match(match_id).await? else {
            record_engine_operation("reject_match", "not_found");
            return Ok(false);
        };
        if record.status() != MatchStatus::Suggested {
            record_engine_operation("reject_match", "wrong_status");
            return Ok(false);
        }

        let updated = self
            .store
            .transition_match(
                match_id,
                MatchStatus::Suggested,
                MatchStatus::Rejected,
                Some(user_id),
                reason,
            )
            .await?;
        record_engine_operation(
            "reject_match",
            if updated { "rejected" } else { "wrong_status" },
        );
        Ok(updated)
    }

    /// Mark a transaction as ignored for reconciliation purposes.
    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn ignore_transaction(&self, transaction_id: Uuid) -> Result<bool, AppError> {
        if self.store.get_transaction(transaction_id).await?.is_none() {
            return Ok(false);
        }
        self.store
            .update_transaction_reconciliation(transaction_id, ReconciliationStatus::Ignored, None)
            .await?;
        record_engine_operation("ignore_transaction", "ignored");
        Ok(true)
    }

    /// Reconcile every unmatched transaction of a statement, tolerating
    /// per-transaction failures, and advance the statement's status.
    #[instrument(skip(self), fields(statement_id = %statement_id))]
    pub async fn reconcile_statement(
        &self,
        statement_id: Uuid,
    ) -> Result<StatementReconciliationSummary, AppError> {
        let Some(statement) = self.store.get_statement(statement_id).await? else {
            return Err(AppError::NotFound(anyhow::anyhow!("Unknown statement")));
        };
        if statement.status() == StatementStatus::Closed {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Statement is closed and can no longer be reconciled"
            )));
        }

        self.store
            .update_statement_progress(
                statement_id,
                StatementStatus::Processing,
                statement.reconciled_count,
            )
            .await?;

        let transactions = self.store.unmatched_for_statement(statement_id).await?;
        let mut summary = StatementReconciliationSummary {
            total: transactions.len() as i64,
            ..Default::default()
        };

        for txn in &transactions {
            match self.reconcile_transaction(txn).await {
                Ok(result) if result.auto_matched => summary.auto_matched += 1,
                Ok(result) if !result.matches.is_empty() => summary.suggested += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        transaction_id = %txn.transaction_id,
                        "Reconciliation failed for transaction; continuing with the rest"
                    );
                    summary.failed += 1;
                }
            }
        }

        let reconciled_count = statement.reconciled_count + summary.auto_matched as i32;
        let status = if reconciled_count >= statement.transaction_count {
            StatementStatus::Reconciled
        } else {
            StatementStatus::Processing
        };
        self.store
            .update_statement_progress(statement_id, status, reconciled_count)
            .await?;

        info!(
            total = summary.total,
            auto_matched = summary.auto_matched,
            suggested = summary.suggested,
            failed = summary.failed,
            "Statement reconciliation finished"
        );
        Ok(summary)
    }

    /// Tier 3: ask the extraction collaborator for structured fields from the
    /// transaction's free text and persist them. Provider failures are
    /// collapsed to a zero-confidence result and never block the pipeline.
    #[instrument(skip(self, txn), fields(transaction_id = %txn.transaction_id))]
    pub async fn extract_transaction_info(
        &self,
        txn: &BankTransaction,
    ) -> Result<ExtractedFields, AppError> {
        let request = ExtractionRequest {
            label: &txn.label,
            amount: txn.amount,
            currency: &txn.currency,
            direction: txn.direction(),
        };

        let mut fields = match self.extractor.extract(&request).await {
            Ok(fields) => {
                record_extraction("ok");
                fields
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed; transaction left unmatched");
                record_extraction("failed");
                ExtractedFields::empty()
            }
        };
        // Normalize the classification to the canonical operation-type set.
        fields.operation_type = fields
            .operation_type
            .as_deref()
            .map(|s| OperationType::from_str(s).as_str().to_string());

        self.store
            .update_transaction_extraction(txn.transaction_id, &fields)
            .await?;
        Ok(fields)
    }

    /// All matches recorded for a transaction.
    pub async fn matches_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<ReconciliationMatch>, AppError> {
        self.store.matches_for_transaction(transaction_id).await
    }

    /// Organization-wide reconciliation KPIs.
    #[instrument(skip(self), fields(org_id = %org_id))]
    pub async fn get_stats(&self, org_id: Uuid) -> Result<ReconciliationStats, AppError> {
        let transactions = self.store.transactions_for_org(org_id).await?;
        let mut stats = ReconciliationStats {
            total: transactions.len() as i64,
            ..Default::default()
        };

        for txn in &transactions {
            match txn.reconciliation_status() {
                ReconciliationStatus::Unmatched => {
                    stats.unmatched += 1;
                    stats.unmatched_amount += txn.amount.abs();
                }
                ReconciliationStatus::Suggested => stats.suggested += 1,
                ReconciliationStatus::Matched => {
                    stats.matched += 1;
                    stats.matched_amount += txn.amount.abs();
                }
                ReconciliationStatus::Suspicious => stats.suspicious += 1,
                ReconciliationStatus::Ignored => stats.ignored += 1,
            }
        }

        stats.auto_match_rate = if stats.total > 0 {
            stats.matched as f64 / stats.total as f64
        } else {
            0.0
        };
        Ok(stats)
    }

    /// Insert the payment and recompute paid amount, balance and status of
    /// the receivable a match settles.
    async fn settle_receivable(&self, record: &ReconciliationMatch) -> Result<(), AppError> {
        let invoice_id = record
            .invoice_id
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Match has no invoice id")))?;
        let Some(invoice) = self.store.get_receivable(invoice_id).await? else {
            return Err(AppError::NotFound(anyhow::anyhow!("Unknown invoice")));
        };

        let payment = Payment {
            payment_id: Uuid::new_v4(),
            org_id: record.org_id,
            invoice_id,
            transaction_id: Some(record.transaction_id),
            amount: record.matched_amount,
            payment_date: Utc::now().date_naive(),
            method: "bank_transfer".to_string(),
            created_utc: Utc::now(),
        };
        self.store.insert_payment(&payment).await?;

        let paid_amount = invoice.paid_amount + record.matched_amount;
        let balance = (invoice.total - paid_amount).max(Decimal::ZERO);
        let status = if paid_amount >= invoice.total {
            InvoiceStatus::Paid
        } else if paid_amount > Decimal::ZERO {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Unpaid
        };
        self.store
            .apply_receivable_payment(invoice_id, paid_amount, balance, status)
            .await?;

        info!(
            invoice_id = %invoice_id,
            paid_amount = %paid_amount,
            status = status.as_str(),
            "Receivable settled"
        );
        Ok(())
    }
}

/// Map a candidate onto the persisted decision record at the decision-policy
/// boundary. `matched_amount` is the candidate's open amount at creation
/// time; the remainder is floored at zero.
fn build_match(
    txn: &BankTransaction,
    candidate: &MatchCandidate,
    status: MatchStatus,
    is_auto_match: bool,
) -> ReconciliationMatch {
    let (invoice_id, supplier_invoice_id, expense_id) = match candidate.candidate_type {
        CandidateType::Invoice => (Some(candidate.entity_id), None, None),
        CandidateType::SupplierInvoice => (None, Some(candidate.entity_id), None),
        CandidateType::Expense => (None, None, Some(candidate.entity_id)),
    };
    let matched_amount = candidate.open_amount;
    let remaining_amount = (txn.amount - matched_amount).max(Decimal::ZERO);

    ReconciliationMatch {
        match_id: Uuid::new_v4(),
        org_id: txn.org_id,
        transaction_id: txn.transaction_id,
        candidate_type: candidate.candidate_type.as_str().to_string(),
        invoice_id,
        supplier_invoice_id,
        expense_id,
        matched_amount,
        remaining_amount,
        confidence_score: candidate.score,
        is_auto_match,
        status: status.as_str().to_string(),
        validated_by: None,
        validated_utc: if is_auto_match { Some(Utc::now()) } else { None },
        rejection_reason: None,
        created_utc: Utc::now(),
    }
}

/// Collapse duplicate hits per `(type, entity_id)`, keeping the highest score
/// observed, and sort descending by score. The sort is stable, so ties keep
/// finder emission order.
pub fn dedupe_and_rank(hits: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    let mut deduped: Vec<MatchCandidate> = Vec::with_capacity(hits.len());
    let mut index: HashMap<(CandidateType, Uuid), usize> = HashMap::new();

    for hit in hits {
        match index.get(&hit.key()) {
            Some(&i) => {
                if hit.score > deduped[i].score {
                    deduped[i] = hit;
                }
            }
            None => {
                index.insert(hit.key(), deduped.len());
                deduped.push(hit);
            }
        }
    }

    deduped.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    deduped
}
