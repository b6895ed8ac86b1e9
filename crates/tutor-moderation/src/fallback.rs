/// Blunt, conservative word list used only when the LLM validator is
/// disabled or unavailable (timeout, outage). Errs toward blocking —
/// false positives here cost a retry, false negatives reach a learner.
const BLOCK_WORDS: &[&str] = &["kill yourself", "suicide", "bomb", "weapon to harm", "self-harm"];

/// Maritime vocabulary that naturally contains words a naive filter would
/// flag (violence, danger, law-breaking) but which are routine terms of
/// art in COLREGs/SOLAS/MARPOL discussion. Checked before the block list so
/// a question like "what constitutes piracy under international law" is
/// never rejected by the fallback path.
const MARITIME_ALLOWLIST_CONTEXTS: &[&str] = &[
    "piracy", "collision", "distress", "abandon ship", "man overboard", "fire",
    "flooding", "grounding", "capsize", "mayday", "hijack",
];

/// Conservative keyword check used when the LLM path can't run. Returns
/// `true` when the message should be blocked.
pub fn should_block(message: &str) -> bool {
    let lower = message.to_lowercase();
    if MARITIME_ALLOWLIST_CONTEXTS.iter().any(|term| lower.contains(term)) {
        return false;
    }
    BLOCK_WORDS.iter().any(|term| lower.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maritime_terms_are_never_blocked_by_the_fallback() {
        assert!(!should_block("How should a master respond to reports of piracy nearby?"));
        assert!(!should_block("What is the correct action after a collision at sea?"));
    }

    #[test]
    fn explicit_self_harm_content_is_blocked() {
        assert!(should_block("I want to kill myself"));
    }

    #[test]
    fn ordinary_study_question_passes() {
        assert!(!should_block("Can you explain the steering and sailing rules?"));
    }
}
