//! Integration tests for the reconciliation pipeline: candidate finding,
//! rule tiers, ranking and the auto-match decision.

mod common;

use common::*;
use matching_service::engine::{AUTO_MATCH_THRESHOLD, MAX_SUGGESTIONS};
use matching_service::models::{MatchStatus, ReconciliationStatus, RuleConditions, ScoreWeights};

#[tokio::test]
async fn exact_amount_debit_auto_matches_with_reason() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(org, RuleConditions::default()));
    store.seed_payable(payable(org, "300.00", "F-2024-001", "ACME SARL"));

    let txn = debit_txn(org, "300.00", "VIR SEPA ACME SARL");
    store.seed_transaction(txn.clone());

    let engine = engine(&store);
    let result = engine.reconcile_transaction(&txn).await.unwrap();

    assert!(result.auto_matched);
    assert!(result.success);
    let best = result.best_match.unwrap();
    assert_eq!(best.score, 1.0);
    assert!(best.reasons.iter().any(|r| r == "Montant exact"));

    // The decision is persisted as an already-accepted auto match.
    let record = store.match_record(result.match_id.unwrap()).unwrap();
    assert_eq!(record.status(), MatchStatus::Accepted);
    assert!(record.is_auto_match);
    assert_eq!(record.matched_amount, amount("300.00"));

    let stored = store.transaction(txn.transaction_id).unwrap();
    assert_eq!(stored.reconciliation_status(), ReconciliationStatus::Matched);
    assert_eq!(stored.reconciliation_score, Some(1.0));
}

#[tokio::test]
async fn two_percent_tolerance_still_matches_and_mentions_gap() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(
        org,
        RuleConditions {
            amount_tolerance: Some(0.02),
            ..Default::default()
        },
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-002", "ACME SARL"));

    let txn = debit_txn(org, "295.00", "VIR SEPA ACME SARL");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert!(result.auto_matched);
    let best = result.best_match.unwrap();
    assert_eq!(best.score, 1.0);
    assert!(best.reasons.iter().any(|r| r.contains('%')), "{:?}", best.reasons);
}

#[tokio::test]
async fn failed_name_check_falls_back_to_weighted_suggestions() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    // Tier 1 requires a name match neither candidate can satisfy.
    store.seed_rule(tier1_rule(
        org,
        RuleConditions {
            require_name_match: true,
            ..Default::default()
        },
    ));
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.6),
            ..Default::default()
        },
        0.3,
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-010", "ACME SARL"));
    store.seed_payable(payable(org, "300.00", "F-2024-011", "GLOBEX CORP"));

    let txn = debit_txn(org, "300.00", "VIR SEPA 993871");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert!(!result.auto_matched);
    assert_eq!(result.matches.len(), 2);
    for candidate in &result.matches {
        assert!((candidate.score - 0.6).abs() < 1e-9);
    }
    // No decision was persisted: the transaction stays unmatched.
    let stored = store.transaction(txn.transaction_id).unwrap();
    assert_eq!(stored.reconciliation_status(), ReconciliationStatus::Unmatched);
}

#[tokio::test]
async fn deterministic_tier_wins_over_scoring_tier() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(org, RuleConditions::default()));
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.5),
            ..Default::default()
        },
        0.1,
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-020", "ACME SARL"));

    let txn = debit_txn(org, "300.00", "VIR SEPA ACME SARL");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    // A weighted pass would have produced 0.5; the deterministic tier scores 1.0.
    assert_eq!(result.best_match.unwrap().score, 1.0);
}

#[tokio::test]
async fn returns_at_most_five_suggestions_sorted_by_score() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.6),
            name_similarity: Some(0.2),
            ..Default::default()
        },
        0.1,
    ));
    for i in 0..7 {
        store.seed_payable(payable(org, "300.00", &format!("F-{i}"), "ACME SARL"));
    }

    let mut txn = debit_txn(org, "300.00", "VIR SEPA");
    txn.counterparty_name = Some("ACME SARL".to_string());
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert_eq!(result.matches.len(), MAX_SUGGESTIONS);
    for pair in result.matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn duplicate_hits_keep_the_highest_score() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    // Two scoring rules hit the same invoice with different weights.
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.5),
            ..Default::default()
        },
        0.1,
    ));
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.7),
            ..Default::default()
        },
        0.1,
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-030", "ACME SARL"));

    let txn = debit_txn(org, "300.00", "VIR SEPA");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert_eq!(result.matches.len(), 1);
    assert!((result.matches[0].score - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn auto_match_threshold_is_strict_at_point_nine() {
    // A score of exactly 0.9 auto-matches...
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(AUTO_MATCH_THRESHOLD),
            ..Default::default()
        },
        0.1,
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-040", "ACME SARL"));
    let txn = debit_txn(org, "300.00", "VIR SEPA");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();
    assert!(result.auto_matched);
    assert!(result.match_id.is_some());

    // ...while 0.8999999 stays a suggestion.
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier2_rule(
        org,
        ScoreWeights {
            exact_amount: Some(0.8999999),
            ..Default::default()
        },
        0.1,
    ));
    store.seed_payable(payable(org, "300.00", "F-2024-041", "ACME SARL"));
    let txn = debit_txn(org, "300.00", "VIR SEPA");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();
    assert!(!result.auto_matched);
    assert!(result.match_id.is_none());
    let stored = store.transaction(txn.transaction_id).unwrap();
    assert_eq!(stored.reconciliation_status(), ReconciliationStatus::Unmatched);
}

#[tokio::test]
async fn credit_transactions_only_see_receivables_inside_the_window() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(org, RuleConditions::default()));

    store.seed_receivable(receivable(org, "500.00", "INV-100", "DUPONT SA"));
    let mut stale = receivable(org, "500.00", "INV-099", "DUPONT SA");
    stale.issue_date = chrono::NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    store.seed_receivable(stale);

    let txn = credit_txn(org, "500.00", "VIR DUPONT SA");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].reference, "INV-100");
}

#[tokio::test]
async fn debit_transactions_also_consider_recorded_expenses() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(org, RuleConditions::default()));
    store.seed_expense(expense(org, "89.90", "NOTE-55", "RESTAURANT LE MIDI"));

    let txn = debit_txn(org, "89.90", "CB RESTAURANT LE MIDI");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert!(result.auto_matched);
    let record = store.match_record(result.match_id.unwrap()).unwrap();
    assert!(record.expense_id.is_some());
    assert!(record.invoice_id.is_none());
}

#[tokio::test]
async fn candidate_lookup_failure_aborts_the_call() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_rule(tier1_rule(org, RuleConditions::default()));
    store.fail_receivable_queries();

    let txn = credit_txn(org, "100.00", "VIR QUELCONQUE");
    store.seed_transaction(txn.clone());

    assert!(engine(&store).reconcile_transaction(&txn).await.is_err());
}

#[tokio::test]
async fn no_rules_means_no_candidates_but_success() {
    let store = MemoryStore::new();
    let org = uuid::Uuid::new_v4();
    store.seed_payable(payable(org, "300.00", "F-2024-050", "ACME SARL"));

    let txn = debit_txn(org, "300.00", "VIR SEPA");
    store.seed_transaction(txn.clone());

    let result = engine(&store).reconcile_transaction(&txn).await.unwrap();

    assert!(result.success);
    assert!(!result.auto_matched);
    assert!(result.matches.is_empty());
}
