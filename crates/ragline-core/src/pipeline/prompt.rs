use std::fmt::Write as _;

use ragline_llm::Message;

use super::RetrievedContext;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using only \
the provided context. If the context does not contain the answer, say that you could not find \
relevant information in the indexed documents. Do not make up facts.";

pub const EMPTY_CONTEXT: &str = "(no context retrieved)";

/// Render the numbered context block followed by the question.
#[must_use]
pub fn user_prompt(question: &str, contexts: &[RetrievedContext]) -> String {
    let mut out = String::from("Use the following context to answer the question.\n\nContext:\n");
    if contexts.is_empty() {
        out.push_str(EMPTY_CONTEXT);
        out.push_str("\n\n");
    } else {
        for (i, ctx) in contexts.iter().enumerate() {
            let _ = write!(out, "[{}] (source: {})\n{}\n\n", i + 1, ctx.source, ctx.text);
        }
    }
    let _ = write!(
        out,
        "Question: {question}\nAnswer concisely using only the context above."
    );
    out
}

#[must_use]
pub fn build_messages(question: &str, contexts: &[RetrievedContext]) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(user_prompt(question, contexts)),
    ]
}

#[cfg(test)]
mod tests {
    use ragline_llm::Role;

    use super::*;

    fn ctx(text: &str, source: &str) -> RetrievedContext {
        RetrievedContext {
            text: text.into(),
            source: source.into(),
            score: 0.5,
        }
    }

    #[test]
    fn numbered_contexts_with_sources() {
        let prompt = user_prompt(
            "What is Rust?",
            &[ctx("Rust is a language.", "doc1"), ctx("It is fast.", "doc2")],
        );
        assert_eq!(
            prompt,
            "Use the following context to answer the question.\n\n\
             Context:\n\
             [1] (source: doc1)\nRust is a language.\n\n\
             [2] (source: doc2)\nIt is fast.\n\n\
             Question: What is Rust?\n\
             Answer concisely using only the context above."
        );
    }

    #[test]
    fn empty_context_is_explicit() {
        let prompt = user_prompt("anything?", &[]);
        assert!(prompt.contains("Context:\n(no context retrieved)\n\nQuestion: anything?"));
    }

    #[test]
    fn messages_are_system_then_user() {
        let msgs = build_messages("q", &[]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("only the provided context"));
        assert_eq!(msgs[1].role, Role::User);
    }
}
