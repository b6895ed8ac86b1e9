/// Trivial messages that never need a model round-trip: greetings,
/// acknowledgements, and other small talk that carries no content to judge.
/// Matching here short-circuits straight to `Allow`, which keeps the common
/// case of a session opening with "hi" or "thanks" off the LLM path entirely.
const SKIP_PATTERNS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "good morning", "good afternoon", "good evening",
    "thanks", "thank you", "ok", "okay", "yes", "no", "sure", "got it", "cool",
    "bye", "goodbye", "see you", "yep", "nope", "alright",
];

/// True if the message, once trimmed and lowercased, is one of the skip
/// patterns or that pattern with trailing punctuation (e.g. "thanks!").
pub fn is_skippable(message: &str) -> bool {
    let normalized: String = message
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    if normalized.is_empty() {
        return false;
    }
    SKIP_PATTERNS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_with_punctuation_is_skippable() {
        assert!(is_skippable("Thanks!"));
        assert!(is_skippable("  hello  "));
    }

    #[test]
    fn substantive_question_is_not_skippable() {
        assert!(!is_skippable("what does rule 5 require about lookouts?"));
    }

    #[test]
    fn empty_message_is_not_skippable() {
        assert!(!is_skippable("   "));
    }
}
