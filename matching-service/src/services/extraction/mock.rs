//! Mock extraction provider for testing.

use super::{ExtractedFields, ExtractionError, ExtractionProvider, ExtractionRequest};
use async_trait::async_trait;

/// Mock provider returning a canned result, or failing when disabled.
pub struct MockExtractionProvider {
    enabled: bool,
    canned: Option<ExtractedFields>,
}

impl MockExtractionProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            canned: None,
        }
    }

    /// A provider that always answers with the given fields.
    pub fn with_fields(fields: ExtractedFields) -> Self {
        Self {
            enabled: true,
            canned: Some(fields),
        }
    }
}

#[async_trait]
impl ExtractionProvider for MockExtractionProvider {
    async fn extract(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<ExtractedFields, ExtractionError> {
        if !self.enabled {
            return Err(ExtractionError::NotConfigured(
                "Mock extraction provider not enabled".to_string(),
            ));
        }

        if let Some(fields) = &self.canned {
            return Ok(fields.clone());
        }

        // Fall back to a trivial heuristic so ad-hoc runs return something.
        let token = request
            .label
            .split_whitespace()
            .find(|w| w.chars().any(|c| c.is_ascii_digit()));
        Ok(ExtractedFields {
            invoice_ref: token.map(|t| t.to_string()),
            client_name: None,
            supplier_name: None,
            operation_type: Some("autre".to_string()),
            confidence: if token.is_some() { 0.4 } else { 0.1 },
        })
    }

    async fn health_check(&self) -> Result<(), ExtractionError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ExtractionError::NotConfigured(
                "Mock extraction provider not enabled".to_string(),
            ))
        }
    }
}
