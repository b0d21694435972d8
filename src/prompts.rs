//! Prompts for answering questions about a document.
//!
//! [`crate::config::DatasetConfig::system_prompt`] replaces
//! [`DEFAULT_SYSTEM_PROMPT`] when set; the user message is always built by
//! [`build_question_prompt`].

/// Default system prompt.
///
/// Asks for answers that fit in one spreadsheet cell: one paragraph, no
/// markdown, semicolons instead of bullet lists.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant that answers questions based on the provided document content.

Provide a clear, concise answer based on the document content. Format your response as follows:
- Use complete sentences but be concise
- Write in a single paragraph without line breaks
- If listing multiple items, separate them with semicolons (;) not bullet points
- Keep the answer focused and to-the-point
- If the answer cannot be found in the document, state "Information not found in document"
- Do not use markdown formatting, bullet points, or numbered lists"#;

/// Answer returned by the model when the document does not contain the
/// information asked for.
pub const NOT_FOUND_ANSWER: &str = "Information not found in document";

/// Build the user message: the document text followed by the question.
pub fn build_question_prompt(document_text: &str, question: &str) -> String {
    format!(
        "Document Content:\n{}\n\nQuestion: {}\n\nAnswer:",
        document_text, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_rules() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("single paragraph"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("semicolons"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains(NOT_FOUND_ANSWER));
    }

    #[test]
    fn test_question_prompt_layout() {
        let p = build_question_prompt("[[page 1]]\nRevenue grew 10%.", "What grew?");
        assert!(p.starts_with("Document Content:\n[[page 1]]"));
        assert!(p.contains("\n\nQuestion: What grew?\n\n"));
        assert!(p.ends_with("Answer:"));
    }
}
