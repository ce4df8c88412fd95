//! Renders retrieved documents and a question into one generation prompt.

use crate::config::PromptConfig;
use crate::store::ScoredDocument;

/// Label used for a document that has none of the display fields.
const UNKNOWN_LABEL: &str = "Unknown";

/// Pure prompt renderer. The same question and documents always produce the
/// same prompt; documents keep their retrieval order.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    preamble: String,
    instruction: String,
    label_fields: Vec<String>,
    text_field: String,
    max_document_chars: usize,
    max_context_chars: usize,
}

impl PromptAssembler {
    /// `label_fields` name each document (e.g. its title); `text_field` is
    /// the body shown after the label.
    pub fn new(config: &PromptConfig, label_fields: &[String], text_field: &str) -> Self {
        Self {
            preamble: config.preamble.clone(),
            instruction: config.instruction.clone(),
            label_fields: label_fields.to_vec(),
            text_field: text_field.to_string(),
            max_document_chars: config.max_document_chars,
            max_context_chars: config.max_context_chars,
        }
    }

    /// Fields a search must project for [`assemble`](Self::assemble).
    pub fn projection(&self) -> Vec<String> {
        let mut fields = self.label_fields.clone();
        if !fields.contains(&self.text_field) {
            fields.push(self.text_field.clone());
        }
        fields
    }

    /// Display label of a document: its label fields joined with `" | "`.
    pub fn label(&self, doc: &ScoredDocument) -> String {
        let parts: Vec<String> = self
            .label_fields
            .iter()
            .filter_map(|f| doc.text(f))
            .filter(|t| !t.is_empty())
            .collect();
        if parts.is_empty() {
            UNKNOWN_LABEL.to_string()
        } else {
            parts.join(" | ")
        }
    }

    /// One `label: text` block per document, each cut to the per-document
    /// limit. Blocks are added in order until the context limit is reached;
    /// the first block is always kept.
    pub fn context(&self, docs: &[ScoredDocument]) -> String {
        let mut blocks: Vec<String> = Vec::with_capacity(docs.len());
        let mut used = 0usize;

        for doc in docs {
            let text = doc.text(&self.text_field).unwrap_or_default();
            let block = format!(
                "{}: {}",
                self.label(doc),
                truncate_chars(&text, self.max_document_chars)
            );
            let cost = block.chars().count() + if blocks.is_empty() { 0 } else { 2 };
            if !blocks.is_empty() && self.max_context_chars > 0 && used + cost > self.max_context_chars {
                tracing::debug!(kept = blocks.len(), dropped = docs.len() - blocks.len(), "context limit reached");
                break;
            }
            used += cost;
            blocks.push(block);
        }

        blocks.join("\n\n")
    }

    pub fn assemble(&self, question: &str, docs: &[ScoredDocument]) -> String {
        format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}\n\n{}\n",
            self.preamble,
            self.context(docs),
            question.trim(),
            self.instruction
        )
    }
}

/// First `max` characters of `text`, with `...` appended when cut.
/// A limit of zero disables truncation.
fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
