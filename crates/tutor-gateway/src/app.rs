//! Wires every collaborator crate into one `AppState` and assembles the
//! Axum router against a fixed set of domain collaborators rather than a
//! pluggable channel/tool runtime.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tutor_agent::router::{ProviderRouter, ProviderSlot};
use tutor_agent::{LlmProvider, Orchestrator, OrchestratorConfig, ThinkingLevel};
use tutor_core::config::TutorConfig;
use tutor_core::error::TutorError;
use tutor_knowledge::chunk::ChunkerConfig;
use tutor_knowledge::classify::UsabilityWeights;
use tutor_knowledge::{
    FilesystemBlobStore, HybridRetriever, IngestionPipeline, IngestionSettings, KnowledgeStore,
    OpenAiEmbedder, OpenAiVisionExtractor, PdftoppmRenderer, RetrievalConfig,
};
use tutor_memory::MemoryManager;
use tutor_moderation::{GateConfig, ModerationGate};
use tutor_sessions::SessionManager;
use tutor_users::UserManager;

/// Chat-completions model used to transcribe page images during ingestion.
/// Not exposed as a config field since the vision path is a fixed
/// implementation detail of the OpenAI-compatible adapter, not a
/// user-tunable model choice the way the chat model is.
const VISION_MODEL: &str = "gpt-4o-mini";

/// `text-embedding-3-small`'s native dimension. If `providers.openai.
/// embedding_model` is changed to a different model, this constant should
/// change with it — both are fixed by the adapter, not independently
/// configurable.
const EMBEDDING_DIMENSION: usize = 1536;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: TutorConfig,
    pub provider: Arc<dyn LlmProvider>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionManager>,
    pub users: Arc<UserManager>,
    pub memory: Arc<MemoryManager>,
    pub knowledge: Arc<KnowledgeStore>,
    pub retriever: Arc<HybridRetriever>,
    pub ingestion: Arc<IngestionPipeline>,
}

impl AppState {
    /// Opens one SQLite connection per manager against `config.database.path`
    /// (every manager owns a `Mutex<Connection>`, not a shared handle —
    /// the teacher's per-crate manager shape), builds the LLM/embedding/
    /// vision adapters from `config.providers`, and ties it all together
    /// into an `Orchestrator`.
    pub fn build(config: TutorConfig) -> anyhow::Result<Self> {
        let provider = build_provider_router(&config)?;
        let embedder: Arc<dyn tutor_knowledge::Embedder> = Arc::new(build_embedder(&config)?);
        let vision: Arc<dyn tutor_knowledge::VisionExtractor> = Arc::new(build_vision(&config)?);

        let sessions_conn = open_connection(&config.database.path)?;
        tutor_sessions::db::init_db(&sessions_conn)?;
        let sessions = Arc::new(SessionManager::new(sessions_conn));

        let users = Arc::new(UserManager::new(open_connection(&config.database.path)?)?);
        let memory = Arc::new(MemoryManager::new(open_connection(&config.database.path)?)?);
        let knowledge = Arc::new(KnowledgeStore::new(open_connection(&config.database.path)?)?);

        let retrieval_config = RetrievalConfig::from_top_k(
            config.retrieval.dense_weight,
            config.retrieval.top_k,
            config.retrieval.dense_candidates,
            config.retrieval.lexical_candidates,
        );
        let retriever = Arc::new(HybridRetriever::new(knowledge.clone(), embedder.clone(), retrieval_config));

        let classifier = Orchestrator::classifier_for(provider.clone(), config.agent.model.clone());
        let moderation = Arc::new(ModerationGate::new(
            config.moderation.enable_llm.then_some(classifier),
            GateConfig {
                enable_llm: config.moderation.enable_llm,
                timeout: Duration::from_millis(config.moderation.timeout_ms),
                cache_ttl: Duration::from_secs(config.moderation.cache_ttl_s),
            },
        ));

        let orchestrator_config = OrchestratorConfig {
            default_model: config.agent.model.clone(),
            max_tool_calls: config.agent.max_tool_calls,
            turn_timeout: Duration::from_secs(config.agent.turn_timeout_s),
            history_window: config.memory.history_window,
            memory_cap: config.memory.memory_cap,
            insight_concurrency: config.memory.insight_concurrency,
            thinking: ThinkingLevel::Off,
        };
        let orchestrator = Arc::new(Orchestrator::new(
            provider.clone(),
            moderation,
            memory.clone(),
            retriever.clone(),
            orchestrator_config,
        ));

        let blobs = Arc::new(FilesystemBlobStore::new(config.ingestion.blob_store_dir.clone()));
        let (w_chars, w_printable, w_structured) = config.ingestion.usability_weights;
        let ingestion_settings = IngestionSettings {
            chunker: ChunkerConfig {
                max_chars: config.ingestion.chunk_size_max,
                min_chars: config.ingestion.chunk_size_min,
            },
            usability_weights: UsabilityWeights {
                char_count: w_chars,
                printable_ratio: w_printable,
                structured_run: w_structured,
            },
            text_usability_threshold: config.ingestion.text_usability_threshold,
            page_concurrency: config.ingestion.page_concurrency,
            vision_dpi: config.ingestion.vision_dpi,
        };
        let ingestion = Arc::new(IngestionPipeline::new(
            knowledge.clone(),
            embedder,
            vision,
            Arc::new(PdftoppmRenderer::default()),
            blobs,
            ingestion_settings,
        ));

        Ok(Self {
            config,
            provider,
            orchestrator,
            sessions,
            users,
            memory,
            knowledge,
            retriever,
            ingestion,
        })
    }
}

fn open_connection(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

fn build_provider_router(config: &TutorConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let mut slots = Vec::new();
    if let Some(anthropic) = &config.providers.anthropic {
        let provider = tutor_agent::anthropic::AnthropicProvider::new(
            anthropic.api_key.clone(),
            Some(anthropic.base_url.clone()),
        );
        slots.push(ProviderSlot::new(Box::new(provider), 2));
    }
    if let Some(openai) = &config.providers.openai {
        let provider = tutor_agent::openai::OpenAiProvider::new(openai.api_key.clone(), Some(openai.base_url.clone()));
        slots.push(ProviderSlot::new(Box::new(provider), 2));
    }
    if slots.is_empty() {
        return Err(TutorError::Config(
            "at least one of providers.anthropic or providers.openai must be configured".to_string(),
        )
        .into());
    }
    Ok(Arc::new(ProviderRouter::new(slots)))
}

fn build_embedder(config: &TutorConfig) -> anyhow::Result<OpenAiEmbedder> {
    let openai = config
        .providers
        .openai
        .as_ref()
        .ok_or_else(|| TutorError::Config("providers.openai is required for embeddings".to_string()))?;
    Ok(OpenAiEmbedder::new(
        openai.api_key.clone(),
        openai.base_url.clone(),
        openai.embedding_model.clone(),
        EMBEDDING_DIMENSION,
    ))
}

fn build_vision(config: &TutorConfig) -> anyhow::Result<OpenAiVisionExtractor> {
    let openai = config
        .providers
        .openai
        .as_ref()
        .ok_or_else(|| TutorError::Config("providers.openai is required for vision extraction".to_string()))?;
    Ok(OpenAiVisionExtractor::new(
        openai.api_key.clone(),
        openai.base_url.clone(),
        VISION_MODEL.to_string(),
    ))
}

/// Assembles the full Axum router: one `.route()` per endpoint, `X-API-Key`
/// auth and CORS ahead of everything, `TraceLayer` for request logging.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/health/db", get(crate::http::health::health_db_handler))
        .route("/api/v1/chat", post(crate::http::chat::chat_handler))
        .route("/api/v1/chat/stream", post(crate::http::chat::chat_stream_handler))
        .route("/api/v1/history/{user_id}", get(crate::http::history::get_history))
        .route("/api/v1/chat/history/{user_id}", delete(crate::http::history::delete_history))
        .route("/api/v1/memories/{user_id}", get(crate::http::memories::get_memories))
        .route("/api/v1/sources/", get(crate::http::sources::list_sources))
        .route("/api/v1/sources/{node_id}", get(crate::http::sources::get_source))
        .route(
            "/api/v1/knowledge/ingest-multimodal",
            post(crate::http::knowledge::ingest_multimodal),
        )
        .route("/api/v1/knowledge/jobs/{job_id}", get(crate::http::knowledge::get_job))
        .route("/api/v1/knowledge/list", get(crate::http::knowledge::list_documents))
        .route("/api/v1/knowledge/stats", get(crate::http::knowledge::stats))
        .layer(axum::middleware::from_fn_with_state(state.clone(), crate::auth::require_api_key))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn log_startup(config: &TutorConfig) {
    info!(port = config.gateway.port, bind = %config.gateway.bind, "tutor gateway configured");
}
