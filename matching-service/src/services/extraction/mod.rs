//! Free-text extraction providers (Tier 3).
//!
//! This module provides a trait-based abstraction over the structured
//! extraction collaborator, allowing easy swapping between backends
//! (Gemini, mock). Tier 3 is advisory only: callers collapse any provider
//! failure to a zero-confidence result instead of propagating it.

pub mod gemini;
pub mod mock;

use crate::models::TransactionDirection;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Operation-type classification of a bank transaction label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Virement,
    Prelevement,
    Carte,
    Cheque,
    Especes,
    FraisBancaires,
    Salaire,
    Impot,
    Autre,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Virement => "virement",
            Self::Prelevement => "prélèvement",
            Self::Carte => "carte",
            Self::Cheque => "chèque",
            Self::Especes => "espèces",
            Self::FraisBancaires => "frais_bancaires",
            Self::Salaire => "salaire",
            Self::Impot => "impot",
            Self::Autre => "autre",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "virement" => Self::Virement,
            "prélèvement" | "prelevement" => Self::Prelevement,
            "carte" => Self::Carte,
            "chèque" | "cheque" => Self::Cheque,
            "espèces" | "especes" => Self::Especes,
            "frais_bancaires" => Self::FraisBancaires,
            "salaire" => Self::Salaire,
            "impot" => Self::Impot,
            _ => Self::Autre,
        }
    }
}

/// What is asked of the extraction collaborator.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub label: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
    pub direction: TransactionDirection,
}

/// Structured fields extracted from a transaction label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub invoice_ref: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub operation_type: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl ExtractedFields {
    /// Zero-confidence result used when extraction fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The counterparty name relevant for the transaction direction.
    pub fn counterparty_for(&self, direction: TransactionDirection) -> Option<&str> {
        match direction {
            TransactionDirection::Credit => self.client_name.as_deref(),
            TransactionDirection::Debit => self.supplier_name.as_deref(),
        }
    }
}

/// Trait for structured-extraction providers.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extract structured fields from a transaction's free text.
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ExtractedFields, ExtractionError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ExtractionError>;
}

/// Build the extraction prompt embedding the label, amount, currency and
/// direction.
pub fn build_prompt(request: &ExtractionRequest<'_>) -> String {
    let counterparty_field = match request.direction {
        TransactionDirection::Credit => "client_name",
        TransactionDirection::Debit => "supplier_name",
    };
    format!(
        "Analyse ce libellé de transaction bancaire et extrais les informations en JSON.\n\
         Libellé: \"{label}\"\n\
         Montant: {amount} {currency} ({direction})\n\
         Réponds uniquement avec un objet JSON contenant:\n\
         - invoice_ref: référence de facture si présente, sinon null\n\
         - {counterparty}: nom de la contrepartie si identifiable, sinon null\n\
         - operation_type: un parmi virement|prélèvement|carte|chèque|espèces|frais_bancaires|salaire|impot|autre\n\
         - confidence: valeur entre 0 et 1",
        label = request.label,
        amount = request.amount,
        currency = request.currency,
        direction = request.direction.as_str(),
        counterparty = counterparty_field,
    )
}

/// Parse a provider's JSON answer, tolerating Markdown code fences.
pub fn parse_fields(text: &str) -> Result<ExtractedFields, ExtractionError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let mut fields: ExtractedFields = serde_json::from_str(body)
        .map_err(|e| ExtractionError::UnparsableResponse(e.to_string()))?;
    fields.confidence = fields.confidence.clamp(0.0, 1.0);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_label_amount_and_direction() {
        let request = ExtractionRequest {
            label: "VIR SEPA ACME F-1001",
            amount: "300.00".parse().unwrap(),
            currency: "EUR",
            direction: TransactionDirection::Debit,
        };
        let prompt = build_prompt(&request);
        assert!(prompt.contains("VIR SEPA ACME F-1001"));
        assert!(prompt.contains("300.00 EUR"));
        assert!(prompt.contains("supplier_name"));
    }

    #[test]
    fn parse_accepts_fenced_json() {
        let fields = parse_fields(
            "```json\n{\"invoice_ref\": \"F-1001\", \"supplier_name\": \"ACME\", \"operation_type\": \"virement\", \"confidence\": 0.85}\n```",
        )
        .unwrap();
        assert_eq!(fields.invoice_ref.as_deref(), Some("F-1001"));
        assert_eq!(fields.confidence, 0.85);
    }

    #[test]
    fn parse_clamps_confidence() {
        let fields = parse_fields("{\"confidence\": 3.5}").unwrap();
        assert_eq!(fields.confidence, 1.0);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_fields("sorry, I cannot help").is_err());
    }

    #[test]
    fn operation_type_round_trip_with_accent_fallbacks() {
        assert_eq!(OperationType::from_str("prelevement"), OperationType::Prelevement);
        assert_eq!(OperationType::from_str("unknown"), OperationType::Autre);
        assert_eq!(OperationType::Prelevement.as_str(), "prélèvement");
    }
}
