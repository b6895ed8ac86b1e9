use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Top-level config (tutor.toml + TUTOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingestion: IngestionConfig::default(),
            moderation: ModerationConfig::default(),
            memory: MemoryConfig::default(),
            agent: AgentConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Static API key checked against `X-API-Key`. `None` disables auth
    /// (local development only).
    pub api_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Hybrid retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub dense_candidates: Option<usize>,
    #[serde(default)]
    pub lexical_candidates: Option<usize>,
    #[serde(default = "default_max_evidence_images")]
    pub max_evidence_images: usize,
}

impl RetrievalConfig {
    pub fn dense_candidates(&self) -> usize {
        self.dense_candidates.unwrap_or(4 * self.top_k)
    }

    pub fn lexical_candidates(&self) -> usize {
        self.lexical_candidates.unwrap_or(4 * self.top_k)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_weight: default_dense_weight(),
            top_k: default_top_k(),
            dense_candidates: None,
            lexical_candidates: None,
            max_evidence_images: default_max_evidence_images(),
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_chunk_size_max")]
    pub chunk_size_max: usize,
    #[serde(default = "default_chunk_size_min")]
    pub chunk_size_min: usize,
    #[serde(default = "default_vision_dpi")]
    pub vision_dpi: u32,
    #[serde(default = "default_text_usability_threshold")]
    pub text_usability_threshold: f64,
    #[serde(default = "default_ingestion_page_concurrency")]
    pub page_concurrency: usize,
    /// Weights for the usability-score factors (chars, printable ratio,
    /// structured-run presence). Must not be negative; need not sum to 1.
    #[serde(default = "default_usability_weights")]
    pub usability_weights: (f64, f64, f64),
    /// Base directory page-rendered evidence images are written under.
    /// Served back to clients as `file://` URLs by the filesystem blob store.
    #[serde(default = "default_blob_store_dir")]
    pub blob_store_dir: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size_max: default_chunk_size_max(),
            chunk_size_min: default_chunk_size_min(),
            vision_dpi: default_vision_dpi(),
            text_usability_threshold: default_text_usability_threshold(),
            page_concurrency: default_ingestion_page_concurrency(),
            usability_weights: default_usability_weights(),
            blob_store_dir: default_blob_store_dir(),
        }
    }
}

/// Moderation gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default = "bool_true")]
    pub enable_llm: bool,
    #[serde(default = "default_moderation_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_moderation_cache_ttl_s")]
    pub cache_ttl_s: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enable_llm: true,
            timeout_ms: default_moderation_timeout_ms(),
            cache_ttl_s: default_moderation_cache_ttl_s(),
        }
    }
}

/// Memory subsystem tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_cap")]
    pub memory_cap: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_insight_concurrency")]
    pub insight_concurrency: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_cap: default_memory_cap(),
            history_window: default_history_window(),
            insight_concurrency: default_insight_concurrency(),
        }
    }
}

/// Reasoning-agent tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,
    #[serde(default = "default_turn_timeout_s")]
    pub turn_timeout_s: u64,
    #[serde(default = "default_tool_timeout_s")]
    pub tool_timeout_s: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tool_calls: default_max_tool_calls(),
            turn_timeout_s: default_turn_timeout_s(),
            tool_timeout_s: default_tool_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Embedding model id, e.g. `text-embedding-3-small`.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_dense_weight() -> f64 {
    0.6
}
fn default_top_k() -> usize {
    8
}
fn default_max_evidence_images() -> usize {
    5
}
fn default_chunk_size_max() -> usize {
    1000
}
fn default_chunk_size_min() -> usize {
    120
}
fn default_vision_dpi() -> u32 {
    200
}
fn default_text_usability_threshold() -> f64 {
    0.6
}
fn default_ingestion_page_concurrency() -> usize {
    4
}
fn default_usability_weights() -> (f64, f64, f64) {
    (0.4, 0.4, 0.2)
}
fn default_moderation_timeout_ms() -> u64 {
    3000
}
fn default_moderation_cache_ttl_s() -> u64 {
    600
}
fn default_memory_cap() -> usize {
    50
}
fn default_history_window() -> usize {
    50
}
fn default_insight_concurrency() -> usize {
    16
}
fn default_max_tool_calls() -> usize {
    6
}
fn default_turn_timeout_s() -> u64 {
    120
}
fn default_tool_timeout_s() -> u64 {
    30
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.db", home)
}
fn default_blob_store_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/blobs", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.toml", home)
}

impl TutorConfig {
    /// Load config from a TOML file with `TUTOR_*` env var overrides,
    /// layered via `figment` (file first, then environment).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TutorConfig = Figment::from(figment::providers::Serialized::defaults(
            TutorConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("TUTOR_").split("__"))
        .extract()
        .map_err(|e| crate::error::TutorError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = TutorConfig::default();
        assert_eq!(cfg.retrieval.dense_weight, 0.6);
        assert_eq!(cfg.retrieval.top_k, 8);
        assert_eq!(cfg.retrieval.dense_candidates(), 32);
        assert_eq!(cfg.ingestion.chunk_size_max, 1000);
        assert_eq!(cfg.ingestion.chunk_size_min, 120);
        assert_eq!(cfg.moderation.cache_ttl_s, 600);
        assert_eq!(cfg.memory.memory_cap, 50);
        assert_eq!(cfg.agent.max_tool_calls, 6);
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let cfg = TutorConfig::load(Some("/nonexistent/path/tutor.toml")).unwrap();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
    }
}
