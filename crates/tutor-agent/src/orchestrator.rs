//! The turn orchestrator — ties moderation, memory, retrieval, and the
//! reasoning agent together into a single `handle_turn` call. Direct
//! generalization of the teacher's non-streaming pipeline: build tools,
//! build the system prompt, run the tool loop, post-process, persist,
//! fire-and-forget insight extraction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::{instrument, warn};

use tutor_core::Role;
use tutor_knowledge::retrieve::HybridRetriever;
use tutor_knowledge::types::{Citation, EvidenceImage, SearchResult};
use tutor_memory::{CandidateFact, ChatMessage, MemoryManager, MessageRole};
use tutor_moderation::{Classifier, ClassifierVerdict, ModerationDecision, ModerationGate, PronounStyle};

use crate::insight;
use crate::postprocess::postprocess_text;
use crate::proactive;
use crate::prompt::{PromptBuilder, SessionInfo};
use crate::provider::{ChatRequest, LlmProvider, Message as ProviderMessage, ProviderError, Role as ChatRole};
use crate::thinking::ThinkingLevel;
use crate::tools::memory::{ClearAllMemoriesTool, ForgetTool, GetUserInfoTool, ListMemoriesTool, RememberTool, SaveUserInfoTool};
use crate::tools::retrieve::{RetrievalCollector, RetrieveTool};
use crate::tools::tool_loop::run_tool_loop_bounded;
use crate::tools::{to_definitions, Logged, Tool, ToolCallLog};

/// Fixed, polite refusal shown whenever moderation blocks a message.
/// Never reveals the moderation reason or any internal detail.
const REFUSAL_TEXT: &str = "I can't help with that request. Let's get back to maritime regulations whenever you're ready.";

/// Tunables mirroring `AgentConfig` / `MemoryConfig` / `RetrievalConfig`,
/// gathered so the gateway only has to build one struct.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_model: String,
    pub max_tool_calls: usize,
    pub turn_timeout: Duration,
    pub history_window: usize,
    pub memory_cap: usize,
    pub insight_concurrency: usize,
    pub thinking: ThinkingLevel,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-sonnet-4-6".to_string(),
            max_tool_calls: 6,
            turn_timeout: Duration::from_secs(120),
            history_window: 50,
            memory_cap: 50,
            insight_concurrency: 16,
            thinking: ThinkingLevel::Off,
        }
    }
}

/// One turn's input.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub role: Role,
    pub message: String,
    /// Rendered learner-profile context (level, learning style, weak/strong
    /// topics) assembled by the caller from `tutor_users::LearningProfile` —
    /// this crate has no dependency on tutor-users, so the profile is
    /// handed in pre-rendered rather than fetched here.
    pub profile_context: Option<String>,
}

/// How many times a tool was invoked during the turn.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolUsage {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnMetadata {
    pub agent_type: String,
    pub processing_time_ms: u64,
    pub tools_used: Vec<ToolUsage>,
}

/// Result of `Orchestrator::handle_turn`.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub answer: String,
    pub thinking: Option<String>,
    pub sources: Vec<Citation>,
    pub evidence_images: Vec<EvidenceImage>,
    pub suggested_questions: Vec<String>,
    pub metadata: TurnMetadata,
}

/// Adapts whatever `LlmProvider` the orchestrator already holds to the
/// moderation crate's narrow `Classifier` seam, so `tutor-moderation` never
/// has to depend on `tutor-agent`.
struct ProviderClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

#[async_trait]
impl Classifier for ProviderClassifier {
    async fn classify(&self, message: &str) -> tutor_moderation::error::Result<ClassifierVerdict> {
        let system = "You are a content moderation classifier for a maritime-regulations tutoring \
                       service. Respond with ONLY a JSON object: \
                       {\"allowed\": bool, \"flagged\": bool, \"reason\": string|null, \
                       \"pronouns\": {\"user_self\": string|null, \"user_called\": string|null, \
                       \"ai_self\": string|null}|null}. Block only genuinely unsafe, abusive, or \
                       wildly off-topic requests; maritime terminology is always allowed.";
        let req = ChatRequest {
            model: self.model.clone(),
            system: system.to_string(),
            system_prompt: None,
            messages: vec![ProviderMessage { role: ChatRole::User, content: message.to_string() }],
            max_tokens: 256,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: None,
        };
        let resp = self
            .provider
            .send(&req)
            .await
            .map_err(|e| tutor_moderation::error::ModerationError::ModelUnavailable(e.to_string()))?;
        parse_verdict(&resp.content)
            .ok_or_else(|| tutor_moderation::error::ModerationError::InvalidResponse(format!("unparseable classifier response: {}", resp.content)))
    }
}

fn parse_verdict(text: &str) -> Option<ClassifierVerdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    let json: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let allowed = json.get("allowed")?.as_bool()?;
    let flagged = json.get("flagged").and_then(|v| v.as_bool()).unwrap_or(false);
    let reason = json.get("reason").and_then(|v| v.as_str()).map(str::to_string);
    let pronouns = json.get("pronouns").filter(|v| !v.is_null()).map(|p| PronounStyle {
        user_self: p.get("user_self").and_then(|v| v.as_str()).map(str::to_string),
        user_called: p.get("user_called").and_then(|v| v.as_str()).map(str::to_string),
        ai_self: p.get("ai_self").and_then(|v| v.as_str()).map(str::to_string),
    });
    Some(ClassifierVerdict { allowed, flagged, reason, pronouns })
}

/// Ties every collaborator together for one turn.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    moderation: Arc<ModerationGate>,
    memory: Arc<MemoryManager>,
    retriever: Arc<HybridRetriever>,
    config: OrchestratorConfig,
    session_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    insight_semaphore: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, moderation: Arc<ModerationGate>, memory: Arc<MemoryManager>, retriever: Arc<HybridRetriever>, config: OrchestratorConfig) -> Self {
        let insight_semaphore = Arc::new(Semaphore::new(config.insight_concurrency.max(1)));
        Self {
            provider,
            moderation,
            memory,
            retriever,
            config,
            session_locks: DashMap::new(),
            insight_semaphore,
        }
    }

    /// Build the `Classifier` adapter this orchestrator's own provider
    /// backs, for constructing a `ModerationGate` at startup.
    pub fn classifier_for(provider: Arc<dyn LlmProvider>, model: String) -> Arc<dyn Classifier> {
        Arc::new(ProviderClassifier { provider, model })
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.session_locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    #[instrument(skip(self, req), fields(session_id = %req.session_id, user_id = %req.user_id))]
    pub async fn handle_turn(&self, req: TurnRequest) -> TurnResult {
        let started = Instant::now();

        let moderation_result = self.moderation.check(&req.message).await;
        if moderation_result.decision.is_blocked() {
            return self.handle_blocked_turn(&req, &moderation_result.decision, started).await;
        }

        let lock = self.session_lock(&req.session_id);
        let _guard = lock.lock().await;

        match tokio::time::timeout(self.config.turn_timeout, self.run_turn(&req, &moderation_result.decision)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session_id = %req.session_id, "turn timed out");
                TurnResult {
                    answer: "That took longer than expected — please try again.".to_string(),
                    thinking: None,
                    sources: Vec::new(),
                    evidence_images: Vec::new(),
                    suggested_questions: Vec::new(),
                    metadata: TurnMetadata {
                        agent_type: "tutor".to_string(),
                        processing_time_ms: started.elapsed().as_millis() as u64,
                        tools_used: Vec::new(),
                    },
                }
            }
        }
    }

    async fn handle_blocked_turn(&self, req: &TurnRequest, decision: &ModerationDecision, started: Instant) -> TurnResult {
        let reason = match decision {
            ModerationDecision::Block { reason } => reason.clone(),
            _ => "blocked".to_string(),
        };

        let now = chrono::Utc::now().to_rfc3339();
        let user_msg = ChatMessage {
            id: 0,
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
            role: MessageRole::User,
            content: req.message.clone(),
            is_blocked: true,
            block_reason: Some(reason.clone()),
            metadata: None,
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            created_at: now.clone(),
        };
        if let Err(err) = self.memory.save_message(&user_msg) {
            warn!(%err, "failed to persist blocked message");
        }

        let assistant_msg = ChatMessage {
            id: 0,
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
            role: MessageRole::Assistant,
            content: REFUSAL_TEXT.to_string(),
            is_blocked: false,
            block_reason: None,
            metadata: None,
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            created_at: now,
        };
        if let Err(err) = self.memory.save_message(&assistant_msg) {
            warn!(%err, "failed to persist refusal message");
        }

        TurnResult {
            answer: REFUSAL_TEXT.to_string(),
            thinking: None,
            sources: Vec::new(),
            evidence_images: Vec::new(),
            suggested_questions: Vec::new(),
            metadata: TurnMetadata {
                agent_type: "tutor".to_string(),
                processing_time_ms: started.elapsed().as_millis() as u64,
                tools_used: Vec::new(),
            },
        }
    }

    async fn run_turn(&self, req: &TurnRequest, decision: &ModerationDecision) -> TurnResult {
        let started = Instant::now();

        let window = self.memory.load_recent_messages(&req.session_id, self.config.history_window, true).unwrap_or_default();
        let facts_summary = self.memory.render_facts_summary(&req.user_id).unwrap_or_default();
        let combined_facts = match &req.profile_context {
            Some(profile) if !profile.trim().is_empty() => format!("{profile}\n\n{facts_summary}"),
            _ => facts_summary,
        };

        let last_agent_hint = last_agent_hint(&window);
        let intent = crate::intent::classify(&req.message, last_agent_hint, crate::intent::IntentWeights::default());

        let proactive_hint = proactive::detect_resume_offer(&window, &req.message);
        let pronouns = decision.pronouns();

        let session_info = SessionInfo {
            session_key: req.session_id.clone(),
            turn_count: (window.len() as u32) + 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let system_prompt = PromptBuilder::build_prompt(req.role, pronouns, &combined_facts, proactive_hint.as_deref(), Some(&session_info));

        let collector = RetrievalCollector::new();
        let call_log = ToolCallLog::new();
        let tools = self.build_tools(req, collector.clone(), call_log.clone());
        let tool_defs = to_definitions(&tools);

        let mut messages: Vec<ProviderMessage> = window
            .iter()
            .map(|m| ProviderMessage {
                role: match m.role {
                    MessageRole::User => ChatRole::User,
                    MessageRole::Assistant => ChatRole::Assistant,
                    MessageRole::System => ChatRole::System,
                },
                content: m.content.clone(),
            })
            .collect();
        messages.push(ProviderMessage { role: ChatRole::User, content: req.message.clone() });

        let chat_request = ChatRequest {
            model: self.config.default_model.clone(),
            system: system_prompt.to_plain_text(),
            system_prompt: Some(system_prompt),
            messages,
            max_tokens: 4096,
            stream: false,
            thinking: Some(self.config.thinking),
            tools: tool_defs,
            raw_messages: None,
        };

        let response = match run_tool_loop_bounded(self.provider.as_ref(), chat_request, &tools, self.config.max_tool_calls).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, "reasoning agent failed");
                return self.finish_with_failure(req, started);
            }
        };

        let processed = postprocess_text(&response.content);

        let search_results = collector.take().await;
        let (sources, evidence_images) = merge_retrieval(&search_results);
        let tools_used = call_log.summarize().await.into_iter().map(|(name, count)| ToolUsage { name, count }).collect();

        self.persist_turn(req, &req.message, &processed.answer, intent.intent);
        self.spawn_insight_extraction(req.user_id.clone(), req.message.clone());

        TurnResult {
            answer: processed.answer,
            thinking: processed.thinking,
            sources,
            evidence_images,
            suggested_questions: Vec::new(),
            metadata: TurnMetadata {
                agent_type: "tutor".to_string(),
                processing_time_ms: started.elapsed().as_millis() as u64,
                tools_used,
            },
        }
    }

    fn build_tools(&self, req: &TurnRequest, collector: Arc<RetrievalCollector>, log: Arc<ToolCallLog>) -> Vec<Box<dyn Tool>> {
        vec![
            Box::new(Logged::new(RetrieveTool::new(self.retriever.clone(), collector), log.clone())),
            Box::new(Logged::new(SaveUserInfoTool::new(self.memory.clone(), req.user_id.clone()), log.clone())),
            Box::new(Logged::new(GetUserInfoTool::new(self.memory.clone(), req.user_id.clone()), log.clone())),
            Box::new(Logged::new(RememberTool::new(self.memory.clone(), req.user_id.clone(), self.config.memory_cap), log.clone())),
            Box::new(Logged::new(ForgetTool::new(self.memory.clone(), req.user_id.clone()), log.clone())),
            Box::new(Logged::new(ListMemoriesTool::new(self.memory.clone(), req.user_id.clone()), log.clone())),
            Box::new(Logged::new(ClearAllMemoriesTool::new(self.memory.clone(), req.user_id.clone()), log)),
        ]
    }

    fn persist_turn(&self, req: &TurnRequest, user_message: &str, answer: &str, intent: crate::intent::IntentType) {
        let now = chrono::Utc::now().to_rfc3339();
        let user_msg = ChatMessage {
            id: 0,
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
            role: MessageRole::User,
            content: user_message.to_string(),
            is_blocked: false,
            block_reason: None,
            metadata: None,
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            created_at: now.clone(),
        };
        if let Err(err) = self.memory.save_message(&user_msg) {
            warn!(%err, "failed to persist user message");
        }

        let assistant_msg = ChatMessage {
            id: 0,
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
            role: MessageRole::Assistant,
            content: answer.to_string(),
            is_blocked: false,
            block_reason: None,
            metadata: Some(serde_json::json!({ "agent_hint": intent })),
            model_used: Some(self.config.default_model.clone()),
            tokens_in: 0,
            tokens_out: 0,
            created_at: now,
        };
        if let Err(err) = self.memory.save_message(&assistant_msg) {
            warn!(%err, "failed to persist assistant message");
        }
    }

    /// Fire-and-forget insight extraction, gated by the shared semaphore so
    /// a burst of turns can't saturate downstream writes.
    fn spawn_insight_extraction(&self, user_id: String, message: String) {
        let memory = self.memory.clone();
        let semaphore = self.insight_semaphore.clone();
        let cap = self.config.memory_cap;
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            for candidate in insight::extract_candidates(&message) {
                if let Err(err) = memory.write_fact(&user_id, candidate, cap) {
                    warn!(%err, "insight extraction failed to write fact");
                }
            }
        });
    }

    fn finish_with_failure(&self, _req: &TurnRequest, started: Instant) -> TurnResult {
        TurnResult {
            answer: "I ran into a problem reaching the tutoring model. Please try again shortly.".to_string(),
            thinking: None,
            sources: Vec::new(),
            evidence_images: Vec::new(),
            suggested_questions: Vec::new(),
            metadata: TurnMetadata {
                agent_type: "tutor".to_string(),
                processing_time_ms: started.elapsed().as_millis() as u64,
                tools_used: Vec::new(),
            },
        }
    }
}

fn last_agent_hint(window: &[ChatMessage]) -> Option<crate::intent::IntentType> {
    window
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
        .and_then(|m| m.metadata.as_ref())
        .and_then(|meta| meta.get("agent_hint"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Merges every `retrieve` call's citations and evidence images made during
/// one turn, deduplicating evidence images by `(document_id, page_number)`.
fn merge_retrieval(results: &[SearchResult]) -> (Vec<Citation>, Vec<EvidenceImage>) {
    let mut sources = Vec::new();
    let mut seen_images: HashMap<(String, u32), ()> = HashMap::new();
    let mut images = Vec::new();

    for result in results {
        sources.extend(result.citations.iter().cloned());
        for image in &result.evidence_images {
            let key = (image.document_id.clone(), image.page_number);
            if seen_images.insert(key, ()).is_none() {
                images.push(image.clone());
            }
        }
    }

    (sources, images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_knowledge::embed::Embedder;
    use tutor_knowledge::retrieve::RetrievalConfig;
    use tutor_knowledge::store::KnowledgeStore;
    use tutor_moderation::GateConfig;

    struct EchoEmbedder;
    #[async_trait]
    impl Embedder for EchoEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> tutor_knowledge::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    struct CannedProvider;
    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            Ok(crate::provider::ChatResponse {
                content: "<thinking>recall rule 5</thinking>A proper lookout must be maintained at all times.".to_string(),
                model: "canned".to_string(),
                tokens_in: 10,
                tokens_out: 10,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn build_orchestrator() -> Orchestrator {
        let store = Arc::new(KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let retriever = Arc::new(HybridRetriever::new(store, Arc::new(EchoEmbedder), RetrievalConfig::from_top_k(0.6, 8, None, None)));
        let memory = Arc::new(MemoryManager::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let moderation = Arc::new(ModerationGate::new(
            None,
            GateConfig { enable_llm: false, timeout: Duration::from_secs(3), cache_ttl: Duration::from_secs(600) },
        ));
        let provider: Arc<dyn LlmProvider> = Arc::new(CannedProvider);
        Orchestrator::new(provider, moderation, memory, retriever, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn handle_turn_returns_stripped_answer_and_thinking() {
        let orchestrator = build_orchestrator();
        let result = orchestrator
            .handle_turn(TurnRequest {
                user_id: "u1".to_string(),
                session_id: "s1".to_string(),
                role: Role::Student,
                message: "what does rule 5 say about lookout?".to_string(),
                profile_context: None,
            })
            .await;
        assert!(result.answer.contains("proper lookout"));
        assert!(!result.answer.contains("<thinking>"));
        assert_eq!(result.thinking.as_deref(), Some("recall rule 5"));
    }

    #[tokio::test]
    async fn handle_turn_persists_both_messages() {
        let orchestrator = build_orchestrator();
        orchestrator
            .handle_turn(TurnRequest {
                user_id: "u1".to_string(),
                session_id: "s1".to_string(),
                role: Role::Student,
                message: "hello".to_string(),
                profile_context: None,
            })
            .await;
        let history = orchestrator.memory.load_recent_messages("s1", 10, true).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].role, MessageRole::Assistant);
    }
}
