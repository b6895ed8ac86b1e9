use serde::{Deserialize, Serialize};

/// The three ways an incoming or outgoing message can be judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ModerationDecision {
    /// Safe to proceed. `pronouns`, when present, comes from a pronoun
    /// extraction pass over the same message and should be fed into the
    /// turn's persona prompt.
    Allow { pronouns: Option<PronounStyle> },
    /// Must not reach the model or the learner; `reason` is shown to nobody
    /// but logged for audit.
    Block { reason: String },
    /// Allowed to proceed, but recorded for human review.
    Flag { reason: String },
}

impl ModerationDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ModerationDecision::Block { .. })
    }

    pub fn pronouns(&self) -> Option<&PronounStyle> {
        match self {
            ModerationDecision::Allow { pronouns } => pronouns.as_ref(),
            _ => None,
        }
    }
}

/// How a learner refers to themselves and the tutor, extracted when a
/// message establishes or changes a naming preference (e.g. "call me
/// Cadet Reyes", "you can be Poseidon"). Threaded into persona prompt
/// composition so the tutor addresses the learner consistently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronounStyle {
    pub user_self: Option<String>,
    pub user_called: Option<String>,
    pub ai_self: Option<String>,
}

/// The outcome of running the moderation gate on one message, including
/// enough bookkeeping to explain a slow or cached check without re-running it.
#[derive(Debug, Clone)]
pub struct ModerationResult {
    pub decision: ModerationDecision,
    pub used_llm: bool,
    pub latency_ms: u64,
    pub cached: bool,
}
