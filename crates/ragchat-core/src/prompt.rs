//! Prompt templates for retrieval-augmented answers.
//!
//! A turn's prompt is always: one fixed system message, the retained
//! history (if any), and one user message rendered from [`RAG_TEMPLATE`].

use crate::models::ChatMessage;
use crate::rank::RankedContext;

/// System instruction asking for concise, attributed answers.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. When responding to questions, \
provide answers concisely using the following format:\n{answer}\n\nSources:\n{sources}";

/// User message template. `{context}`, `{question}` and `{sources}` are
/// substituted verbatim.
pub const RAG_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}

Sources: {sources}";

/// Substitute `{key}` placeholders in one pass.
///
/// Substituted values are never rescanned, so a question that itself
/// contains `{context}` is inserted literally. Unknown placeholders are
/// left untouched.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| {
                let key = &after[..close];
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| (*v, close))
            });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render the user message for one question.
pub fn render_rag_prompt(context: &str, question: &str, sources: &[String]) -> String {
    let sources = sources.join(", ");
    render_template(
        RAG_TEMPLATE,
        &[
            ("context", context),
            ("question", question),
            ("sources", &sources),
        ],
    )
}

/// Build the message sequence for one turn.
pub fn build_messages(
    history: &[ChatMessage],
    ranked: &RankedContext,
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(render_rag_prompt(
        &ranked.context,
        question,
        &ranked.sources,
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Hit, Role};

    #[test]
    fn test_render_substitutes_all_keys() {
        let out = render_template("{a}-{b}-{a}", &[("a", "1"), ("b", "2")]);
        assert_eq!(out, "1-2-1");
    }

    #[test]
    fn test_render_is_single_pass() {
        let out = render_template("Q: {question} C: {context}", &[
            ("question", "what is {context}?"),
            ("context", "ctx"),
        ]);
        assert_eq!(out, "Q: what is {context}? C: ctx");
    }

    #[test]
    fn test_render_leaves_unknown_and_unbalanced() {
        assert_eq!(render_template("{x} {", &[]), "{x} {");
        assert_eq!(render_template("{{a}}", &[("a", "v")]), "{v}");
    }

    #[test]
    fn test_system_prompt_keeps_literal_placeholders() {
        assert!(SYSTEM_PROMPT.contains("{answer}"));
        assert!(SYSTEM_PROMPT.contains("Sources:\n{sources}"));
    }

    #[test]
    fn test_build_messages_shape() {
        let ranked = RankedContext::from_hits(vec![Hit::new(0.9, "docs", "Rust is fast.")]);
        let history = vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")];
        let messages = build_messages(&history, &ranked, "Is Rust fast?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::User);
        let user = &messages[3].content;
        assert!(user.contains("docs: Rust is fast."));
        assert!(user.contains("Question: Is Rust fast?"));
        assert!(user.ends_with("Sources: docs"));
    }

    #[test]
    fn test_build_messages_with_no_hits() {
        let ranked = RankedContext::from_hits(Vec::new());
        let messages = build_messages(&[], &ranked, "anything?");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Question: anything?"));
    }
}
