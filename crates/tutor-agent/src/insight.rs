//! Heuristic insight extraction — scans a learner's message for
//! self-disclosed facts worth remembering (name, learning style, goal,
//! topic preference) so the memory subsystem's check-before-write can fold
//! them in without the learner having to call `remember` explicitly.
//!
//! Deliberately pattern-based rather than a second LLM call: the turn
//! already spent its model budget on the reasoning agent, and this runs
//! fire-and-forget after the turn has already returned to the caller.

use tutor_memory::{CandidateFact, FactType};

const MARKERS: &[(&str, FactType)] = &[
    ("my name is", FactType::Identity),
    ("call me", FactType::Identity),
    ("i am a", FactType::Identity),
    ("i'm a", FactType::Identity),
    ("i learn best", FactType::LearningStyle),
    ("i study best", FactType::LearningStyle),
    ("i prefer", FactType::TopicPreference),
    ("my goal is", FactType::Goal),
    ("i'm trying to", FactType::Goal),
    ("i want to learn", FactType::Goal),
];

/// Extract candidate facts from one user message. Order matches `MARKERS`;
/// a message can yield more than one candidate.
pub fn extract_candidates(message: &str) -> Vec<CandidateFact> {
    let lower = message.to_lowercase();
    MARKERS
        .iter()
        .filter_map(|(marker, fact_type)| extract_after(&lower, message, marker).map(|content| CandidateFact { fact_type: *fact_type, content }))
        .collect()
}

fn extract_after(lower: &str, original: &str, marker: &str) -> Option<String> {
    let idx = lower.find(marker)?;
    let start = idx + marker.len();
    let rest = original.get(start..)?.trim();
    let end = rest.find(['.', '\n', '!', '?']).unwrap_or(rest.len());
    let value = rest[..end].trim().trim_start_matches(':').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_introduction() {
        let candidates = extract_candidates("Hi, my name is Cadet Reyes. I have a question.");
        assert!(candidates.iter().any(|c| c.fact_type == FactType::Identity && c.content == "Cadet Reyes"));
    }

    #[test]
    fn extracts_goal() {
        let candidates = extract_candidates("my goal is to pass the OOW exam next month");
        assert!(candidates.iter().any(|c| c.fact_type == FactType::Goal));
    }

    #[test]
    fn no_candidates_for_plain_question() {
        let candidates = extract_candidates("what does rule 5 say about lookout?");
        assert!(candidates.is_empty());
    }
}
