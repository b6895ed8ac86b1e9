use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    General,
    Knowledge,
    Teaching,
    Unclear,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: IntentType,
    pub confidence: f64,
    pub entities: Vec<String>,
}

/// Tunable boosts for the keyword-scoring tier, mirroring `AgentConfig`.
#[derive(Debug, Clone, Copy)]
pub struct IntentWeights {
    pub phrase_match_boost: f64,
    pub aggressive_pattern_boost: f64,
}

impl Default for IntentWeights {
    fn default() -> Self {
        Self {
            phrase_match_boost: 2.0,
            aggressive_pattern_boost: 1.0,
        }
    }
}

const GREETING_TOKENS: &[&str] = &[
    "hi", "hello", "hey", "good morning", "good afternoon", "good evening",
    "xin chào", "chào bạn", "chào",
];
const SELF_INTRO_PHRASES: &[&str] = &[
    "my name is", "i am a", "i'm a", "call me",
    "tôi là", "tôi tên là", "tên tôi là", "mình là", "em là",
];
const FOLLOW_UP_CUES: &[&str] = &[
    "why", "what about", "then what", "next", "and then", "also", "but why",
    "tại sao", "còn", "vậy thì", "tiếp theo", "vậy",
];
const MAX_WORDS_FOR_FOLLOW_UP: usize = 8;
const MAX_ENTITIES: usize = 5;

const KNOWLEDGE_TERMS: &[&str] = &[
    "rule", "colreg", "solas", "marpol", "lookout", "collision", "give-way", "stand-on",
    "regulation", "chapter", "annex", "convention", "vessel", "navigation light", "sound signal",
    "distress", "pollution", "discharge", "ballast", "certificate", "survey",
    "quy tắc", "va chạm", "tàu", "hàng hải", "tín hiệu", "ô nhiễm", "xả thải", "chứng nhận",
];
const KNOWLEDGE_PHRASES: &[&str] = &[
    "proper lookout", "risk of collision", "stand-on vessel", "give-way vessel", "narrow channel",
    "tình huống cắt hướng", "quyền ưu tiên",
];

const TEACHING_TERMS: &[&str] = &[
    "explain", "teach", "quiz", "practice", "exercise", "example", "study", "exam", "test me",
    "walk me through", "help me understand", "review", "lesson",
    "giải thích", "dạy", "học", "bài tập", "ôn tập",
];
const TEACHING_PHRASES: &[&str] = &[
    "can you explain", "help me understand", "walk me through", "quiz me on",
    "giúp tôi hiểu", "dạy tôi",
];
const AGGRESSIVE_PATTERNS: &[&str] = &["why does", "why do", "how come"];

/// Classifies a message's intent. Pure function: same inputs always
/// produce the same output, which keeps the turn orchestrator's behavior
/// predictable and lets this be unit-tested without any agent context.
pub fn classify(message: &str, last_agent_hint: Option<IntentType>, weights: IntentWeights) -> IntentResult {
    let normalized = message.trim().to_lowercase();
    let words: Vec<&str> = normalized.split_whitespace().collect();

    if is_greeting_or_self_intro(&normalized) {
        return IntentResult {
            intent: IntentType::General,
            confidence: 1.0,
            entities: Vec::new(),
        };
    }

    if words.len() < MAX_WORDS_FOR_FOLLOW_UP && FOLLOW_UP_CUES.iter().any(|cue| normalized.contains(cue)) {
        let intent = last_agent_hint.unwrap_or(IntentType::Knowledge);
        return IntentResult {
            intent,
            confidence: 0.85,
            entities: Vec::new(),
        };
    }

    let (knowledge_score, knowledge_entities) = score(&normalized, KNOWLEDGE_TERMS, KNOWLEDGE_PHRASES, weights);
    let (teaching_score, teaching_entities) = score(&normalized, TEACHING_TERMS, TEACHING_PHRASES, weights);

    if teaching_score > knowledge_score && knowledge_score > 0.0 {
        return IntentResult {
            intent: IntentType::Teaching,
            confidence: confidence_from_score(teaching_score),
            entities: cap_entities(teaching_entities),
        };
    }
    if knowledge_score > 0.0 {
        return IntentResult {
            intent: IntentType::Knowledge,
            confidence: confidence_from_score(knowledge_score),
            entities: cap_entities(knowledge_entities),
        };
    }
    if teaching_score > 0.0 {
        return IntentResult {
            intent: IntentType::Teaching,
            confidence: confidence_from_score(teaching_score),
            entities: cap_entities(teaching_entities),
        };
    }

    IntentResult {
        intent: IntentType::General,
        confidence: 0.8,
        entities: Vec::new(),
    }
}

fn is_greeting_or_self_intro(normalized: &str) -> bool {
    let stripped: String = normalized.chars().filter(|c| !c.is_ascii_punctuation()).collect();
    let stripped = stripped.trim();
    if GREETING_TOKENS.iter().any(|token| stripped.contains(token)) {
        return true;
    }
    SELF_INTRO_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

fn score(normalized: &str, terms: &[&str], phrases: &[&str], weights: IntentWeights) -> (f64, Vec<String>) {
    let mut total = 0.0;
    let mut entities = Vec::new();

    for term in terms {
        if normalized.contains(term) {
            total += 1.0;
            entities.push(term.to_string());
        }
    }
    for phrase in phrases {
        if normalized.contains(phrase) {
            total += weights.phrase_match_boost;
            entities.push(phrase.to_string());
        }
    }
    if AGGRESSIVE_PATTERNS.iter().any(|p| normalized.contains(p)) {
        total += weights.aggressive_pattern_boost;
    }

    (total, entities)
}

fn confidence_from_score(score: f64) -> f64 {
    (0.7 + 0.1 * score).min(1.0)
}

fn cap_entities(mut entities: Vec<String>) -> Vec<String> {
    entities.truncate(MAX_ENTITIES);
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_always_wins_even_with_domain_keywords() {
        let result = classify("hello, I have a question about collision rules", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::General);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn short_follow_up_inherits_last_hint() {
        let result = classify("why though?", Some(IntentType::Teaching), IntentWeights::default());
        assert_eq!(result.intent, IntentType::Teaching);
    }

    #[test]
    fn short_follow_up_without_hint_defaults_to_knowledge() {
        let result = classify("and then?", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::Knowledge);
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn phrase_match_pushes_teaching_over_knowledge() {
        let result = classify("can you explain the rule on proper lookout", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::Teaching);
    }

    #[test]
    fn plain_knowledge_question_classifies_as_knowledge() {
        let result = classify("what does the give-way vessel have to do under the rule?", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::Knowledge);
    }

    #[test]
    fn unrelated_message_falls_back_to_general() {
        let result = classify("what's the weather like today", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::General);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn entities_are_capped_at_five() {
        let message = "rule colreg solas marpol lookout collision give-way";
        let result = classify(message, None, IntentWeights::default());
        assert!(result.entities.len() <= 5);
    }

    #[test]
    fn vietnamese_greeting_with_self_intro_classifies_as_general() {
        let result = classify("Xin chào, tôi là Minh", None, IntentWeights::default());
        assert_eq!(result.intent, IntentType::General);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn vietnamese_knowledge_question_classifies_as_knowledge() {
        let result = classify(
            "Giải thích quy tắc 15 COLREGs về tình huống cắt hướng",
            None,
            IntentWeights::default(),
        );
        assert_eq!(result.intent, IntentType::Knowledge);
    }

    #[test]
    fn vietnamese_follow_up_cue_inherits_last_hint() {
        let result = classify("Tại sao vậy?", Some(IntentType::Knowledge), IntentWeights::default());
        assert_eq!(result.intent, IntentType::Knowledge);
        assert_eq!(result.confidence, 0.85);
    }
}
