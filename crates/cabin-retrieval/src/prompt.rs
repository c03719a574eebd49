//! Prompt assembly for retrieval-augmented answers.

use cabin_core::RetrievedDocument;

const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

/// Builds the completion prompt from retrieved documents.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    assistant_name: String,
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new(assistant_name: impl Into<String>, max_context_chars: usize) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            max_context_chars,
        }
    }

    /// Render one document as a ranked context entry (rank is 1-based).
    pub fn context_entry(rank: usize, document: &RetrievedDocument) -> String {
        let instruction = document
            .metadata
            .instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown");
        format!(
            "[#{rank}] Instruction:\n{instruction}\n\nResponse:\n{}",
            document.content
        )
    }

    /// Join ranked entries, stopping before the context budget is exceeded.
    ///
    /// The top-ranked entry is always kept, truncated if it alone is over
    /// budget.
    pub fn build_context(&self, documents: &[RetrievedDocument]) -> String {
        let mut context = String::new();
        let mut used = 0usize;

        for (idx, document) in documents.iter().enumerate() {
            let entry = Self::context_entry(idx + 1, document);
            let entry_chars = entry.chars().count();

            if idx == 0 {
                if entry_chars > self.max_context_chars {
                    context.extend(entry.chars().take(self.max_context_chars));
                    break;
                }
                context.push_str(&entry);
                used = entry_chars;
                continue;
            }

            let needed = ENTRY_SEPARATOR.len() + entry_chars;
            if used + needed > self.max_context_chars {
                tracing::debug!(kept = idx, dropped = documents.len() - idx, "Context budget reached");
                break;
            }
            context.push_str(ENTRY_SEPARATOR);
            context.push_str(&entry);
            used += needed;
        }

        context
    }

    /// Wrap the context and the user's message in the assistant preamble.
    pub fn build_prompt(&self, documents: &[RetrievedDocument], message: &str) -> String {
        let context = self.build_context(documents);
        format!(
            "You are {name}'s official AI assistant.\n\
             Be warm, concise, and professional.\n\
             Use the following context to answer the question.\n\n\
             Context:\n{context}\n\n\
             User:\n{message}\n",
            name = self.assistant_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabin_core::DocumentMetadata;

    fn doc(instruction: Option<&str>, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            similarity: 0.9,
            metadata: DocumentMetadata {
                instruction: instruction.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_context_entry_format() {
        let entry = PromptBuilder::context_entry(1, &doc(Some("Do you deliver?"), "Yes, statewide."));
        assert_eq!(
            entry,
            "[#1] Instruction:\nDo you deliver?\n\nResponse:\nYes, statewide."
        );
    }

    #[test]
    fn test_missing_instruction_is_unknown() {
        let entry = PromptBuilder::context_entry(3, &doc(None, "Body"));
        assert!(entry.starts_with("[#3] Instruction:\nUnknown\n\n"));
        let entry = PromptBuilder::context_entry(1, &doc(Some("  "), "Body"));
        assert!(entry.contains("Instruction:\nUnknown"));
    }

    #[test]
    fn test_entries_ranked_and_separated() {
        let builder = PromptBuilder::new("CozyCabin", 12_000);
        let context = builder.build_context(&[doc(Some("A"), "a"), doc(Some("B"), "b")]);
        assert_eq!(
            context,
            "[#1] Instruction:\nA\n\nResponse:\na\n\n---\n\n[#2] Instruction:\nB\n\nResponse:\nb"
        );
    }

    #[test]
    fn test_context_budget_drops_trailing_entries() {
        let first = PromptBuilder::context_entry(1, &doc(Some("A"), "a"));
        let builder = PromptBuilder::new("CozyCabin", first.len() + 5);
        let context = builder.build_context(&[doc(Some("A"), "a"), doc(Some("B"), "b")]);
        assert_eq!(context, first);
    }

    #[test]
    fn test_oversized_first_entry_is_truncated() {
        let builder = PromptBuilder::new("CozyCabin", 20);
        let context = builder.build_context(&[doc(Some("A"), &"x".repeat(100))]);
        assert_eq!(context.chars().count(), 20);
    }

    #[test]
    fn test_prompt_contains_preamble_context_and_message() {
        let builder = PromptBuilder::new("CozyCabin", 12_000);
        let prompt = builder.build_prompt(&[doc(Some("Q"), "Answer")], "How big are your cabins?");
        assert!(prompt.starts_with("You are CozyCabin's official AI assistant."));
        assert!(prompt.contains("Be warm, concise, and professional."));
        assert!(prompt.contains("Context:\n[#1] Instruction:\nQ\n\nResponse:\nAnswer"));
        assert!(prompt.contains("User:\nHow big are your cabins?"));
    }
}
