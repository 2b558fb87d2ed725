//! Prompt Compiler — merges the request into the instruction template.
//!
//! Pure and deterministic: no timestamps, ids or randomness go into the prompt.
//! The field guide is rendered from `OutputSchema`, so the prose the model reads
//! cannot drift from the contract the validator enforces.

use crate::estimation::encoder::EncodedDocument;
use crate::estimation::prompts::{SALARY_ESTIMATE_PROMPT_TEMPLATE, SALARY_ESTIMATE_SYSTEM};
use crate::estimation::schema::OutputSchema;
use crate::llm_client::prompts::TOOL_ONLY_SYSTEM;

/// Everything the model invoker needs for one call.
/// The document travels next to the text, which only references it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPrompt {
    pub system: String,
    pub instructions: String,
    pub document: EncodedDocument,
}

pub fn compile(document: EncodedDocument, location: &str, schema: &OutputSchema) -> CompiledPrompt {
    let document_reference = match document.media_type() {
        Ok("application/pdf") => "attached above as a PDF document.".to_string(),
        Ok("text/plain") => "attached above as a plain-text document.".to_string(),
        Ok(other) => format!("attached above as a document of type {other}."),
        Err(_) => "attached above.".to_string(),
    };

    // {location} goes in last so user text is never scanned for placeholders.
    let instructions = SALARY_ESTIMATE_PROMPT_TEMPLATE
        .replace("{document_reference}", &document_reference)
        .replace("{field_guide}", &render_field_guide(schema))
        .replace("{tool_name}", schema.name)
        .replace("{location}", location);

    CompiledPrompt {
        system: format!("{SALARY_ESTIMATE_SYSTEM} {TOOL_ONLY_SYSTEM}"),
        instructions,
        document,
    }
}

fn render_field_guide(schema: &OutputSchema) -> String {
    schema
        .field_guide()
        .iter()
        .map(|line| format!("- {} ({}): {}", line.path, line.label, line.purpose))
        .collect::<Vec<_>>()
        .join("\n")
}
