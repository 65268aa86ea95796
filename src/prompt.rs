//! System prompt assembly for RAG and general modes.
//!
//! History and context are interpolated verbatim.

/// Sentence a RAG answer must open with when the study materials do not
/// cover the question.
pub const FALLBACK_DISCLOSURE: &str = "⚠️ *I could not find this specific topic in your provided study materials, but based on general knowledge:*";

/// Tutor persona with context-first rules, for requests that used retrieval.
pub fn rag_prompt(curriculum: &str, history: &str, context: &str) -> String {
    format!(
        "You are an elite academic tutor for {curriculum} students. \
         You help with rigorous exam preparation, simplify complex technical concepts, \
         and explain reasoning step by step.\n\n\
         ### RULES:\n\
         1. **Context first:** Answer from the CONTEXT below whenever it covers the question. \
         When you use it, cite the exact source document name at the end of each point.\n\
         2. **Out-of-syllabus fallback:** If the CONTEXT does not cover the question, still answer \
         from general knowledge, but begin your reply with exactly: '{disclosure}'\n\
         3. **Exam-review formatting:** Use bullet points, bold the key technical terms, \
         and close with a concise summary.\n\
         4. **Technical precision:** Break algorithms, data structures and engineering \
         principles down systematically.\n\
         5. **Visual analysis:** If an image is attached, examine it carefully and relate it \
         to the question.\n\n\
         --- HISTORY ---\n{history}\n\n\
         --- CONTEXT ---\n{context}",
        curriculum = curriculum,
        disclosure = FALLBACK_DISCLOSURE,
        history = history,
        context = context,
    )
}

/// Minimal persona for requests answered without retrieval.
pub fn general_prompt(history: &str) -> String {
    format!(
        "You are a helpful AI assistant.\n\
         Answer using general knowledge.\n\
         --- HISTORY ---\n{}",
        history
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_prompt_contents() {
        let p = rag_prompt(
            "SPPU engineering",
            "user: hi",
            "--- FROM DOCUMENT: x.pdf ---\nOsmosis is...",
        );
        assert!(p.contains("SPPU engineering students"));
        assert!(p.contains(FALLBACK_DISCLOSURE));
        assert!(p.contains("cite the exact source document name"));
        assert!(p.ends_with("--- HISTORY ---\nuser: hi\n\n--- CONTEXT ---\n--- FROM DOCUMENT: x.pdf ---\nOsmosis is..."));
    }

    #[test]
    fn test_general_prompt_interpolates_history() {
        let p = general_prompt("user: hello\nassistant: hi");
        assert!(p.starts_with("You are a helpful AI assistant."));
        assert!(p.ends_with("--- HISTORY ---\nuser: hello\nassistant: hi"));
        assert!(!p.contains("CONTEXT"));
    }
}
