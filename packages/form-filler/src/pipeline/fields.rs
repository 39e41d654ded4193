//! Turn a target form into the ordered list of fields to fill.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{FormFillError, Result};
use crate::pipeline::{aggregate::AggregationContext, json::extract_name_list, prompts};
use crate::traits::{generator::Generator, parser::DocumentParser};
use crate::types::{config::DEFAULT_FORM_GUIDANCE, document::DocumentRef};

/// Extracts required field names from a form document.
pub struct FieldExtractor {
    parser: Arc<dyn DocumentParser>,
    generator: Arc<dyn Generator>,
    guidance: String,
}

impl FieldExtractor {
    pub fn new(parser: Arc<dyn DocumentParser>, generator: Arc<dyn Generator>) -> Self {
        Self {
            parser,
            generator,
            guidance: DEFAULT_FORM_GUIDANCE.to_string(),
        }
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = guidance.into();
        self
    }

    /// Extract the field list and arm `context` with its length.
    ///
    /// The barrier is armed before this returns, so no field query can be
    /// dispatched while N is still unknown.
    pub async fn extract(
        &self,
        form: &DocumentRef,
        context: &AggregationContext,
    ) -> Result<Vec<String>> {
        let fields = self.extract_fields(form).await?;
        context.arm(&fields)?;
        Ok(fields)
    }

    /// Extract the field list without touching any barrier.
    pub async fn extract_fields(&self, form: &DocumentRef) -> Result<Vec<String>> {
        let segments = self
            .parser
            .parse(form, &self.guidance)
            .await
            .map_err(|e| FormFillError::FieldExtraction {
                reason: format!("could not parse form {}", form.path.display()),
                source: Some(Box::new(e)),
            })?;

        let form_text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if form_text.is_empty() {
            return Err(FormFillError::field_extraction(format!(
                "form {} has no text",
                form.path.display()
            )));
        }

        let raw = self
            .generator
            .complete(&prompts::format_field_list_prompt(&form_text))
            .await
            .map_err(|e| FormFillError::FieldExtraction {
                reason: "field list generation failed".to_string(),
                source: Some(Box::new(e)),
            })?;
        debug!(chars = raw.len(), "Field list generated");

        let fields = extract_name_list(&raw)?;
        info!(count = fields.len(), "Extracted form fields");
        Ok(fields)
    }
}
