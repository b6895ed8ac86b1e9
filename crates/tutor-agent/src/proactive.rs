//! Proactive continuation analyzer (teacher lineage: the original
//! implementation's "Conversation Analyzer"). Detects when the prior
//! assistant turn looks unfinished and the learner's new message changed
//! topic without acknowledging it, and produces an instruction asking the
//! agent to offer to resume the dropped thread.

use tutor_memory::{ChatMessage, MessageRole};

/// Connectors that signal an assistant message was mid-enumeration when it
/// ended, without having reached a closing item.
const ENUMERATIVE_OPENERS: &[&str] = &["first,", "first:", "firstly", "first of all", "to start,", "there are several"];
const ENUMERATIVE_CONTINUERS: &[&str] = &["also", "additionally", "second,", "next,", "furthermore"];
const CLOSURE_MARKERS: &[&str] = &["finally", "lastly", "in summary", "to summarize", "last,"];

/// Words too common to carry topic signal when comparing messages.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "do", "does", "did", "what", "why", "how", "and",
    "or", "but", "to", "of", "in", "on", "for", "it", "its", "you", "your", "i", "me", "my", "can",
    "could", "would", "should", "please", "about", "with", "this", "that", "thanks", "thank",
];

/// Looks for an incomplete trailing assistant message followed by a
/// topic-changing user message, and returns the instruction to splice into
/// the system prompt's user tier, or `None` if no resume offer applies.
///
/// `window` is the conversation window as loaded for this turn (oldest
/// first, per `load_recent_messages`); `current_message` is the new
/// message that triggered this turn (not yet in `window`).
pub fn detect_resume_offer(window: &[ChatMessage], current_message: &str) -> Option<String> {
    let last_assistant = window.iter().rev().find(|m| m.role == MessageRole::Assistant)?;

    if !looks_incomplete(&last_assistant.content) {
        return None;
    }
    if topic_overlaps(&last_assistant.content, current_message) {
        return None;
    }

    let topic = extract_topic(&last_assistant.content)?;
    Some(format!(
        "Your previous answer on \"{topic}\" looked unfinished and the learner has moved to a new \
         question without acknowledging it. After answering the new question, offer — in one short \
         sentence — to resume the \"{topic}\" explanation, naming it explicitly."
    ))
}

fn looks_incomplete(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        return true;
    }
    let lower = trimmed.to_lowercase();
    let has_opener = ENUMERATIVE_OPENERS.iter().any(|o| lower.contains(o));
    let has_continuer = ENUMERATIVE_CONTINUERS.iter().any(|c| lower.contains(c));
    if !(has_opener || has_continuer) {
        return false;
    }
    !CLOSURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Crude bag-of-words overlap: true when the two messages share enough
/// non-stopword tokens that the new message is plausibly still on-topic
/// (no resume offer is needed).
fn topic_overlaps(prior: &str, current: &str) -> bool {
    let prior_terms = content_terms(prior);
    let current_terms = content_terms(current);
    if prior_terms.is_empty() || current_terms.is_empty() {
        return false;
    }
    let shared = current_terms.iter().filter(|t| prior_terms.contains(*t)).count();
    shared > 0
}

fn content_terms(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Picks the longest non-stopword run from the incomplete message as a
/// human-readable "topic" label — not a precise extraction, just enough
/// to let the model name what it's offering to resume.
fn extract_topic(text: &str) -> Option<String> {
    let first_sentence = text.split(['.', '\n']).next()?.trim();
    if first_sentence.is_empty() {
        return None;
    }
    let words: Vec<&str> = first_sentence.split_whitespace().take(8).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(content: &str) -> ChatMessage {
        ChatMessage {
            id: 1,
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            role: MessageRole::Assistant,
            content: content.to_string(),
            is_blocked: false,
            block_reason: None,
            metadata: None,
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn detects_ellipsis_plus_topic_change() {
        let window = vec![assistant("The stand-on vessel must maintain course and speed...")];
        let hint = detect_resume_offer(&window, "what is a nautical mile?");
        assert!(hint.is_some());
        assert!(hint.unwrap().contains("stand-on vessel"));
    }

    #[test]
    fn no_hint_when_topic_continues() {
        let window = vec![assistant("The stand-on vessel must maintain course and speed...")];
        let hint = detect_resume_offer(&window, "what else must the stand-on vessel do?");
        assert!(hint.is_none());
    }

    #[test]
    fn no_hint_when_prior_answer_is_complete() {
        let window = vec![assistant("The stand-on vessel must maintain course and speed.")];
        let hint = detect_resume_offer(&window, "what is a nautical mile?");
        assert!(hint.is_none());
    }

    #[test]
    fn enumerative_opener_without_closure_counts_as_incomplete() {
        let window = vec![assistant("First, a proper lookout must be maintained at all times by sight and hearing.")];
        let hint = detect_resume_offer(&window, "unrelated question about tides");
        assert!(hint.is_some());
    }

    #[test]
    fn enumerative_opener_with_closure_is_complete() {
        let window = vec![assistant(
            "First, maintain a lookout. Finally, reduce speed in restricted visibility.",
        )];
        let hint = detect_resume_offer(&window, "unrelated question about tides");
        assert!(hint.is_none());
    }

    #[test]
    fn no_assistant_message_in_window_yields_no_hint() {
        let hint = detect_resume_offer(&[], "hello");
        assert!(hint.is_none());
    }
}
