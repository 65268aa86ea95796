//! Mode routing: whether a request consults the index, and which model
//! answers it.

/// Tokens that switch RAG off when sent as the `use_rag` flag.
const RAG_OFF_TOKENS: &[&str] = &["false", "0", "null", "none", ""];

/// Greetings and closings that never need the study materials.
const GREETINGS: &[&str] = &["hi", "hello", "hey", "yo", "thanks", "good morning"];

/// Greetings only count for short messages.
const GREETING_MAX_WORDS: usize = 4;

/// Which chat model answers the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Text,
    Vision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub use_rag: bool,
    pub engine: Engine,
}

/// Parse the caller's RAG flag. Anything outside the off-set enables RAG.
/// Case and surrounding whitespace are ignored, so `" False\n"` is off.
pub fn parse_rag_flag(raw: &str) -> bool {
    let flag = raw.trim().to_lowercase();
    !RAG_OFF_TOKENS.contains(&flag.as_str())
}

/// True for short messages that open with a greeting, e.g. `"hi"` or
/// `"thanks a lot"`. Matching is by whole words, so `"history of india"`
/// is not a greeting.
pub fn is_greeting(query: &str) -> bool {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .collect();
    if words.is_empty() || words.len() >= GREETING_MAX_WORDS {
        return false;
    }

    GREETINGS.iter().any(|greeting| {
        let parts: Vec<&str> = greeting.split(' ').collect();
        words.len() >= parts.len() && words.iter().zip(&parts).all(|(w, p)| w == p)
    })
}

pub fn route(query: &str, rag_flag: &str, has_image: bool) -> Route {
    Route {
        use_rag: parse_rag_flag(rag_flag) && !is_greeting(query),
        engine: if has_image {
            Engine::Vision
        } else {
            Engine::Text
        },
    }
}
