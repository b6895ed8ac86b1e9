use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::cache::ModerationCache;
use crate::fallback::should_block;
use crate::skip::is_skippable;
use crate::types::{ModerationDecision, ModerationResult, PronounStyle};

/// The narrow seam this crate needs from an LLM provider: classify one
/// message and, if it's clean, optionally extract a pronoun preference.
/// Kept separate from `tutor_agent::LlmProvider` so this crate never has to
/// depend on the agent crate — the orchestrator supplies an adapter that
/// implements this trait over whatever provider it already holds.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, message: &str) -> crate::error::Result<ClassifierVerdict>;
}

#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    pub allowed: bool,
    pub flagged: bool,
    pub reason: Option<String>,
    pub pronouns: Option<PronounStyle>,
}

#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub enable_llm: bool,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

/// The moderation gate: skip-pattern fast path, then cache, then the LLM
/// validator (when enabled and within its timeout), falling back to a
/// conservative word list if the LLM path is disabled, times out, or errors.
pub struct ModerationGate {
    classifier: Option<Arc<dyn Classifier>>,
    cache: ModerationCache,
    config: GateConfig,
}

impl ModerationGate {
    pub fn new(classifier: Option<Arc<dyn Classifier>>, config: GateConfig) -> Self {
        Self {
            classifier,
            cache: ModerationCache::new(config.cache_ttl),
            config,
        }
    }

    #[instrument(skip(self, message))]
    pub async fn check(&self, message: &str) -> ModerationResult {
        let started = Instant::now();

        if is_skippable(message) {
            return ModerationResult {
                decision: ModerationDecision::Allow { pronouns: None },
                used_llm: false,
                latency_ms: started.elapsed().as_millis() as u64,
                cached: false,
            };
        }

        if let Some(decision) = self.cache.get(message) {
            return ModerationResult {
                decision,
                used_llm: false,
                latency_ms: started.elapsed().as_millis() as u64,
                cached: true,
            };
        }

        let decision = if self.config.enable_llm {
            match &self.classifier {
                Some(classifier) => match tokio::time::timeout(self.config.timeout, classifier.classify(message)).await {
                    Ok(Ok(verdict)) => verdict_to_decision(verdict),
                    Ok(Err(err)) => {
                        warn!(%err, "moderation classifier error, falling back to keyword check");
                        fallback_decision(message)
                    }
                    Err(_) => {
                        warn!(timeout_ms = self.config.timeout.as_millis() as u64, "moderation classifier timed out, falling back to keyword check");
                        fallback_decision(message)
                    }
                },
                None => fallback_decision(message),
            }
        } else {
            fallback_decision(message)
        };

        self.cache.put(message, decision.clone());

        ModerationResult {
            decision,
            used_llm: self.config.enable_llm && self.classifier.is_some(),
            latency_ms: started.elapsed().as_millis() as u64,
            cached: false,
        }
    }
}

fn verdict_to_decision(verdict: ClassifierVerdict) -> ModerationDecision {
    if !verdict.allowed {
        return ModerationDecision::Block {
            reason: verdict.reason.unwrap_or_else(|| "blocked by moderation model".to_string()),
        };
    }
    if verdict.flagged {
        return ModerationDecision::Flag {
            reason: verdict.reason.unwrap_or_else(|| "flagged for review".to_string()),
        };
    }
    ModerationDecision::Allow {
        pronouns: verdict.pronouns,
    }
}

fn fallback_decision(message: &str) -> ModerationDecision {
    if should_block(message) {
        ModerationDecision::Block {
            reason: "blocked by keyword fallback".to_string(),
        }
    } else {
        ModerationDecision::Allow { pronouns: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow;
    #[async_trait]
    impl Classifier for AlwaysAllow {
        async fn classify(&self, _message: &str) -> crate::error::Result<ClassifierVerdict> {
            Ok(ClassifierVerdict {
                allowed: true,
                flagged: false,
                reason: None,
                pronouns: None,
            })
        }
    }

    struct AlwaysBlock;
    #[async_trait]
    impl Classifier for AlwaysBlock {
        async fn classify(&self, _message: &str) -> crate::error::Result<ClassifierVerdict> {
            Ok(ClassifierVerdict {
                allowed: false,
                flagged: false,
                reason: Some("nope".to_string()),
                pronouns: None,
            })
        }
    }

    fn config() -> GateConfig {
        GateConfig {
            enable_llm: true,
            timeout: Duration::from_secs(3),
            cache_ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn greeting_skips_the_model_entirely() {
        let gate = ModerationGate::new(Some(Arc::new(AlwaysBlock)), config());
        let result = gate.check("hello").await;
        assert!(!result.decision.is_blocked());
        assert!(!result.used_llm);
    }

    #[tokio::test]
    async fn substantive_message_uses_the_classifier() {
        let gate = ModerationGate::new(Some(Arc::new(AlwaysBlock)), config());
        let result = gate.check("explain rule 5 of the collision regulations").await;
        assert!(result.decision.is_blocked());
        assert!(result.used_llm);
    }

    #[tokio::test]
    async fn repeated_message_is_served_from_cache() {
        let gate = ModerationGate::new(Some(Arc::new(AlwaysAllow)), config());
        let first = gate.check("what is the stand-on vessel's duty?").await;
        assert!(!first.cached);
        let second = gate.check("what is the stand-on vessel's duty?").await;
        assert!(second.cached);
    }

    #[tokio::test]
    async fn disabled_llm_falls_back_to_keyword_check() {
        let mut cfg = config();
        cfg.enable_llm = false;
        let gate = ModerationGate::new(Some(Arc::new(AlwaysBlock)), cfg);
        let result = gate.check("what rules govern collision avoidance?").await;
        assert!(!result.decision.is_blocked());
        assert!(!result.used_llm);
    }

    #[tokio::test]
    async fn missing_classifier_falls_back_even_when_llm_enabled() {
        let gate = ModerationGate::new(None, config());
        let result = gate.check("I want to kill myself").await;
        assert!(result.decision.is_blocked());
    }
}
