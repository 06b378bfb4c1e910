//! Candidate finder: queries the ledger store for open documents that could
//! plausibly settle a transaction.

use crate::models::{BankTransaction, CandidateType, MatchCandidate, TransactionDirection};
use crate::services::store::LedgerStore;
use chrono::{Duration, Utc};
use service_core::error::AppError;

/// How far back open documents are considered, relative to the operation date.
const LOOKBACK_DAYS: i64 = 30;
/// How far forward receivables are considered (invoices issued just after the
/// payment landed).
const LOOKAHEAD_DAYS: i64 = 7;

/// Find the open documents a transaction could settle.
///
/// Money in (credit) looks at open receivables inside a date window around the
/// operation date. Money out (debit) looks at every open payable plus recorded
/// expenses from the lookback window up to today. Candidates come back with a
/// zero score and no reasons; the rule tiers fill those in.
pub async fn find_candidates(
    store: &dyn LedgerStore,
    txn: &BankTransaction,
) -> Result<Vec<MatchCandidate>, AppError> {
    let mut candidates = Vec::new();

    match txn.direction() {
        TransactionDirection::Credit => {
            let from = txn.operation_date - Duration::days(LOOKBACK_DAYS);
            let to = txn.operation_date + Duration::days(LOOKAHEAD_DAYS);
            for invoice in store.open_receivables(txn.org_id, from, to).await? {
                candidates.push(MatchCandidate {
                    candidate_type: CandidateType::Invoice,
                    entity_id: invoice.invoice_id,
                    reference: invoice.reference,
                    amount: invoice.total,
                    open_amount: invoice.balance,
                    date: invoice.issue_date,
                    partner_name: Some(invoice.customer_name),
                    partner_iban: invoice.customer_iban,
                    score: 0.0,
                    reasons: Vec::new(),
                });
            }
        }
        TransactionDirection::Debit => {
            for invoice in store.open_payables(txn.org_id).await? {
                candidates.push(MatchCandidate {
                    candidate_type: CandidateType::SupplierInvoice,
                    entity_id: invoice.supplier_invoice_id,
                    reference: invoice.reference,
                    amount: invoice.total,
                    open_amount: invoice.balance,
                    date: invoice.invoice_date,
                    partner_name: Some(invoice.supplier_name),
                    partner_iban: invoice.supplier_iban,
                    score: 0.0,
                    reasons: Vec::new(),
                });
            }

            let from = txn.operation_date - Duration::days(LOOKBACK_DAYS);
            let to = Utc::now().date_naive();
            for expense in store.expenses_between(txn.org_id, from, to).await? {
                candidates.push(MatchCandidate {
                    candidate_type: CandidateType::Expense,
                    entity_id: expense.expense_id,
                    reference: expense.reference,
                    amount: expense.amount,
                    open_amount: expense.amount,
                    date: expense.expense_date,
                    partner_name: Some(expense.vendor_name),
                    partner_iban: None,
                    score: 0.0,
                    reasons: Vec::new(),
                });
            }
        }
    }

    Ok(candidates)
}
