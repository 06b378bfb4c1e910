//! Rule evaluation: the deterministic tier and the weighted scoring tier.
//!
//! Rules are plain data dispatched on [`RuleKind`]; nothing here touches the
//! store. The scoring tier is only consulted when the deterministic tier
//! produced no candidate at all.

use crate::engine::similarity::name_similarity;
use crate::models::{BankTransaction, MatchCandidate, ReconciliationRule, RuleKind};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Name similarity floor used when a deterministic rule requires a name match
/// but does not configure its own minimum.
pub const DEFAULT_NAME_SIMILARITY_MIN: f64 = 0.7;

/// Date window used by the scoring tier's proximity component when the rule
/// does not configure one.
pub const DEFAULT_DATE_PROXIMITY_DAYS: i64 = 30;

/// Which tier produced the hits, if any.
#[derive(Debug)]
pub struct TierOutcome {
    pub tier: Option<RuleKind>,
    pub hits: Vec<MatchCandidate>,
}

/// Run the match tiers over the finder's candidates.
///
/// The deterministic tier short-circuits: if any rule/candidate pair survives
/// it, the scoring tier is never evaluated.
pub fn run_match_tiers(
    rules: &[ReconciliationRule],
    txn: &BankTransaction,
    candidates: &[MatchCandidate],
) -> TierOutcome {
    let mut hits = Vec::new();
    for rule in rules.iter().filter(|r| r.is_active && r.kind() == RuleKind::Deterministic) {
        for cand in candidates {
            if let Some((score, reasons)) = evaluate_deterministic(rule, txn, cand) {
                hits.push(scored(cand, score, reasons));
            }
        }
    }
    if !hits.is_empty() {
        return TierOutcome {
            tier: Some(RuleKind::Deterministic),
            hits,
        };
    }

    let mut hits = Vec::new();
    for rule in rules.iter().filter(|r| r.is_active && r.kind() == RuleKind::Scoring) {
        for cand in candidates {
            if let Some((score, reasons)) = evaluate_scoring(rule, txn, cand) {
                hits.push(scored(cand, score, reasons));
            }
        }
    }
    TierOutcome {
        tier: if hits.is_empty() { None } else { Some(RuleKind::Scoring) },
        hits,
    }
}

fn scored(cand: &MatchCandidate, score: f64, reasons: Vec<String>) -> MatchCandidate {
    let mut hit = cand.clone();
    hit.score = score.clamp(0.0, 1.0);
    hit.reasons = reasons;
    hit
}

/// Relative gap between the transaction amount and the candidate's open
/// amount. `None` for zero-amount transactions, which never match on amount.
fn amount_ratio(txn_amount: Decimal, open_amount: Decimal) -> Option<f64> {
    if txn_amount.is_zero() {
        return None;
    }
    ((txn_amount - open_amount).abs() / txn_amount.abs()).to_f64()
}

fn reference_in_label(label: &str, reference: &str) -> bool {
    !reference.is_empty() && label.to_lowercase().contains(&reference.to_lowercase())
}

fn iban_pair<'a>(
    txn: &'a BankTransaction,
    cand: &'a MatchCandidate,
) -> Option<(&'a str, &'a str)> {
    match (txn.counterparty_iban.as_deref(), cand.partner_iban.as_deref()) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => None,
    }
}

fn counterparty_similarity(txn: &BankTransaction, cand: &MatchCandidate) -> f64 {
    let own = txn.counterparty_name.as_deref().unwrap_or(&txn.label);
    let partner = cand.partner_name.as_deref().unwrap_or("");
    name_similarity(own, partner)
}

/// Deterministic (level 1) evaluation: every configured condition must hold,
/// a single failing check disqualifies the candidate. Survivors always score
/// exactly 1.0.
pub fn evaluate_deterministic(
    rule: &ReconciliationRule,
    txn: &BankTransaction,
    cand: &MatchCandidate,
) -> Option<(f64, Vec<String>)> {
    let conditions = &rule.conditions.0;
    let mut reasons = Vec::new();

    let tolerance = conditions.amount_tolerance.unwrap_or(0.0);
    let ratio = amount_ratio(txn.amount, cand.open_amount)?;
    if ratio == 0.0 {
        reasons.push("Montant exact".to_string());
    } else if ratio <= tolerance {
        reasons.push(format!("Montant proche ({:.1}% d'écart)", ratio * 100.0));
    } else {
        return None;
    }

    if conditions.require_iban_match {
        match iban_pair(txn, cand) {
            Some((a, b)) if a == b => reasons.push("IBAN identique".to_string()),
            _ => return None,
        }
    }

    if conditions.require_invoice_ref {
        if !reference_in_label(&txn.label, &cand.reference) {
            return None;
        }
        reasons.push(format!("Référence {} trouvée dans le libellé", cand.reference));
    }

    if conditions.require_name_match {
        let min = conditions.name_similarity_min.unwrap_or(DEFAULT_NAME_SIMILARITY_MIN);
        let sim = counterparty_similarity(txn, cand);
        if sim < min {
            return None;
        }
        reasons.push(format!("Nom similaire ({:.0}%)", sim * 100.0));
    }

    if let Some(window) = conditions.date_window_days {
        let days = (txn.operation_date - cand.date).num_days().abs();
        if days > window {
            return None;
        }
        reasons.push(format!("Date à {} jour(s)", days));
    }

    Some((1.0, reasons))
}

/// Weighted (level 2) evaluation: components add up instead of disqualifying.
/// The candidate is retained only when the sum clears the rule's suggestion
/// threshold; the score is capped at 1.0.
pub fn evaluate_scoring(
    rule: &ReconciliationRule,
    txn: &BankTransaction,
    cand: &MatchCandidate,
) -> Option<(f64, Vec<String>)> {
    let conditions = &rule.conditions.0;
    let weights = &rule.score_weights.0;
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if let Some(weight) = weights.exact_amount {
        if let Some(ratio) = amount_ratio(txn.amount, cand.open_amount) {
            let tolerance = conditions.amount_tolerance.unwrap_or(0.0);
            if ratio == 0.0 {
                score += weight;
                reasons.push("Montant exact".to_string());
            } else if tolerance > 0.0 && ratio <= tolerance {
                score += weight * (1.0 - ratio / tolerance);
                reasons.push(format!("Montant proche ({:.1}% d'écart)", ratio * 100.0));
            }
        }
    }

    if let Some(weight) = weights.date_proximity {
        let max_days = conditions.date_window_days.unwrap_or(DEFAULT_DATE_PROXIMITY_DAYS);
        let days = (txn.operation_date - cand.date).num_days().abs();
        if max_days > 0 && days <= max_days {
            score += weight * (1.0 - days as f64 / max_days as f64);
            reasons.push(format!("Date à {} jour(s)", days));
        }
    }

    if let Some(weight) = weights.name_similarity {
        let sim = counterparty_similarity(txn, cand);
        if sim > 0.3 {
            score += sim * weight;
            reasons.push(format!("Nom similaire ({:.0}%)", sim * 100.0));
        }
    }

    if let Some(weight) = weights.iban_match {
        if matches!(iban_pair(txn, cand), Some((a, b)) if a == b) {
            score += weight;
            reasons.push("IBAN identique".to_string());
        }
    }

    if let Some(weight) = weights.invoice_ref_found {
        if reference_in_label(&txn.label, &cand.reference) {
            score += weight;
            reasons.push(format!("Référence {} trouvée dans le libellé", cand.reference));
        }
    }

    if score < rule.suggestion_threshold {
        return None;
    }
    Some((score.min(1.0), reasons))
}
