//! Prompt building for question answering.

use std::fmt::Write;

use super::context::ContextBundle;
use crate::llm::ModelPrompt;

const GROUNDED_SYSTEM_PROMPT: &str = include_str!("../../prompts/qa_system.txt");
const OPEN_DOMAIN_SYSTEM_PROMPT: &str = include_str!("../../prompts/open_domain_system.txt");

/// Build the model prompt for a question.
///
/// For a document question, the user turn lists its passages as `[n] text`
/// ahead of the question and the system prompt restricts the answer to them.
/// Only a bundle without a document asks for a general-knowledge answer.
pub fn build_prompt(question: &str, context: &ContextBundle) -> ModelPrompt {
    let question = question.trim();

    if context.document_id.is_none() {
        return ModelPrompt {
            system: OPEN_DOMAIN_SYSTEM_PROMPT.trim_end().to_string(),
            user: question.to_string(),
        };
    }

    let mut user = String::from("Reference passages:\n\n");
    for (i, passage) in context.passages.iter().enumerate() {
        let _ = writeln!(user, "[{}] {}\n", i + 1, passage.content.trim());
    }
    if context.truncated {
        user.push_str("(Only the passages most relevant to the question are shown.)\n\n");
    }
    let _ = write!(user, "Question: {}", question);

    ModelPrompt {
        system: GROUNDED_SYSTEM_PROMPT.trim_end().to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::context::ContextPassage;

    fn bundle(passages: &[&str], truncated: bool) -> ContextBundle {
        ContextBundle {
            document_id: Some("doc".to_string()),
            passages: passages
                .iter()
                .enumerate()
                .map(|(i, p)| ContextPassage {
                    chunk_index: i as u32,
                    content: p.to_string(),
                })
                .collect(),
            truncated,
        }
    }

    #[test]
    fn test_grounded_prompt_numbers_passages() {
        let prompt = build_prompt("  What is X? ", &bundle(&["X is a letter.", "Y follows X."], false));

        assert!(prompt.system.contains("only the reference passages"));
        assert!(prompt.user.contains("[1] X is a letter."));
        assert!(prompt.user.contains("[2] Y follows X."));
        assert!(prompt.user.ends_with("Question: What is X?"));
        assert!(!prompt.user.contains("most relevant"));
    }

    #[test]
    fn test_truncated_context_is_flagged() {
        let prompt = build_prompt("q", &bundle(&["a"], true));
        assert!(prompt.user.contains("most relevant"));
    }

    #[test]
    fn test_document_question_never_open_domain() {
        let prompt = build_prompt("What is X?", &bundle(&[], false));
        assert!(prompt.system.contains("only the reference passages"));
        assert!(!prompt.system.contains("general knowledge"));
    }

    #[test]
    fn test_open_domain_prompt() {
        let prompt = build_prompt("What is X?", &ContextBundle::default());

        assert!(prompt.system.contains("general knowledge"));
        assert_eq!(prompt.user, "What is X?");
    }
}
