//! Configuration loading, validation, and management for Voltwise.
//!
//! Loads configuration from `~/.voltwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use voltwise_core::{AgentRole, QueryType};

/// The root configuration structure.
///
/// Maps directly to `~/.voltwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Token budgets and context source behavior
    #[serde(default)]
    pub context: ContextConfig,

    /// Query classifier tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Context bundle cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Knowledge base population
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Conversation history storage
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Live system state source
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// User profile context
    #[serde(default)]
    pub user: UserConfig,

    /// Query type → specialist routing
    #[serde(default)]
    pub router: RouterConfig,

    /// LLM completion timeout and retry policy
    #[serde(default)]
    pub completion: CompletionConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .field("context", &self.context)
            .field("classifier", &self.classifier)
            .field("cache", &self.cache)
            .field("knowledge", &self.knowledge)
            .field("conversation", &self.conversation)
            .field("telemetry", &self.telemetry)
            .field("user", &self.user)
            .field("router", &self.router)
            .field("completion", &self.completion)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// One row of the token budget table. Unset fields fall back to the
/// built-in row for the same query type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetRowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_max: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_max_docs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_max_messages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_max_tokens: Option<usize>,
}

impl BudgetRowConfig {
    /// The shipped defaults for a query type.
    pub fn builtin(query_type: QueryType) -> Self {
        let (system, kb_docs, kb_tokens, conv_messages, conv_tokens, user) = match query_type {
            QueryType::System => (1000, 2, 400, 6, 600, 200),
            QueryType::Research => (300, 5, 2000, 4, 400, 200),
            QueryType::Planning => (800, 3, 1000, 6, 600, 200),
            QueryType::General => (400, 3, 800, 6, 600, 200),
        };
        Self {
            system_max: Some(system),
            kb_max_docs: Some(kb_docs),
            kb_max_tokens: Some(kb_tokens),
            conv_max_messages: Some(conv_messages),
            conv_max_tokens: Some(conv_tokens),
            user_max_tokens: Some(user),
        }
    }

    /// Fill unset fields from `base`.
    pub fn or(&self, base: &BudgetRowConfig) -> BudgetRowConfig {
        BudgetRowConfig {
            system_max: self.system_max.or(base.system_max),
            kb_max_docs: self.kb_max_docs.or(base.kb_max_docs),
            kb_max_tokens: self.kb_max_tokens.or(base.kb_max_tokens),
            conv_max_messages: self.conv_max_messages.or(base.conv_max_messages),
            conv_max_tokens: self.conv_max_tokens.or(base.conv_max_tokens),
            user_max_tokens: self.user_max_tokens.or(base.user_max_tokens),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTimeoutConfig {
    #[serde(default = "default_system_timeout_ms")]
    pub system_ms: u64,

    #[serde(default = "default_knowledge_timeout_ms")]
    pub knowledge_ms: u64,

    #[serde(default = "default_conversation_timeout_ms")]
    pub conversation_ms: u64,

    #[serde(default = "default_user_timeout_ms")]
    pub user_ms: u64,
}

fn default_system_timeout_ms() -> u64 {
    1000
}
fn default_knowledge_timeout_ms() -> u64 {
    2000
}
fn default_conversation_timeout_ms() -> u64 {
    1000
}
fn default_user_timeout_ms() -> u64 {
    500
}

impl Default for SourceTimeoutConfig {
    fn default() -> Self {
        Self {
            system_ms: default_system_timeout_ms(),
            knowledge_ms: default_knowledge_timeout_ms(),
            conversation_ms: default_conversation_timeout_ms(),
            user_ms: default_user_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Floor applied to every row's `system_max`
    #[serde(default = "default_reserved_system_tokens")]
    pub reserved_system_tokens: usize,

    /// Knowledge passages scoring below this are never included
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Trim to the aggregate budget; when false, flag over-budget bundles instead
    #[serde(default = "default_true")]
    pub truncate_on_exceed: bool,

    /// Degrade a failing source to empty; when false, fail the request
    #[serde(default = "default_true")]
    pub fallback_on_source_error: bool,

    /// Heuristic ratio for the default token estimator
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    #[serde(default)]
    pub timeouts: SourceTimeoutConfig,

    /// Per query type budget rows, keyed by type name
    #[serde(default = "default_budgets")]
    pub budgets: BTreeMap<String, BudgetRowConfig>,
}

fn default_budgets() -> BTreeMap<String, BudgetRowConfig> {
    QueryType::ALL
        .into_iter()
        .map(|qt| (qt.as_str().to_string(), BudgetRowConfig::builtin(qt)))
        .collect()
}
fn default_reserved_system_tokens() -> usize {
    200
}
fn default_similarity_threshold() -> f32 {
    0.35
}
fn default_chars_per_token() -> usize {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            reserved_system_tokens: default_reserved_system_tokens(),
            similarity_threshold: default_similarity_threshold(),
            truncate_on_exceed: true,
            fallback_on_source_error: true,
            chars_per_token: default_chars_per_token(),
            timeouts: SourceTimeoutConfig::default(),
            budgets: default_budgets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Below this confidence a query is treated as general
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f32,

    /// A deictic follow-up scoring at least this much is a domain change
    #[serde(default = "default_clear_domain_score")]
    pub clear_domain_score: u32,

    /// Longest query still considered a deictic follow-up
    #[serde(default = "default_anaphora_max_words")]
    pub anaphora_max_words: usize,
}

fn default_ambiguity_threshold() -> f32 {
    0.5
}
fn default_clear_domain_score() -> u32 {
    2
}
fn default_anaphora_max_words() -> usize {
    8
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            ambiguity_threshold: default_ambiguity_threshold(),
            clear_domain_score: default_clear_domain_score(),
            anaphora_max_words: default_anaphora_max_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "memory", "sqlite", or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite file; defaults to `~/.voltwise/cache.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Bound on every cache round-trip
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,

    /// In-memory backend capacity
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Mix the session id into cache keys. Bundles carry the session's
    /// history and profile, so only turn this off when neither is in use.
    #[serde(default = "default_true")]
    pub scope_by_session: bool,
}

fn default_memory_backend() -> String {
    "memory".into()
}
fn default_ttl_seconds() -> u64 {
    300
}
fn default_cache_timeout_ms() -> u64 {
    250
}
fn default_max_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_memory_backend(),
            path: None,
            ttl_seconds: default_ttl_seconds(),
            timeout_ms: default_cache_timeout_ms(),
            max_entries: default_max_entries(),
            scope_by_session: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory of `.md` / `.txt` files indexed at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_dir: Option<PathBuf>,

    /// Chunks longer than this are split at paragraph boundaries
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
}

fn default_chunk_max_chars() -> usize {
    1200
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            documents_dir: None,
            chunk_max_chars: default_chunk_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite file; defaults to `~/.voltwise/conversations.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// JSON snapshot maintained by the telemetry collectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    /// Profile used for sessions without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Per-session profiles
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Specialist used when a type has no mapping
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// Reasoning rounds before a specialist must answer
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Query type name → specialist id
    #[serde(default = "default_mapping")]
    pub mapping: BTreeMap<String, String>,
}

fn default_mapping() -> BTreeMap<String, String> {
    [
        (QueryType::System, AgentRole::SolarController),
        (QueryType::Planning, AgentRole::EnergyOrchestrator),
        (QueryType::Research, AgentRole::ResearchAgent),
        (QueryType::General, AgentRole::SolarController),
    ]
    .into_iter()
    .map(|(qt, role)| (qt.as_str().to_string(), role.as_str().to_string()))
    .collect()
}
fn default_agent() -> String {
    AgentRole::SolarController.as_str().into()
}
fn default_max_tool_iterations() -> usize {
    4
}
fn default_tool_timeout_secs() -> u64 {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            max_tool_iterations: default_max_tool_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            mapping: default_mapping(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    4000
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_completion_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.voltwise/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `VOLTWISE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let config = Self::load_from(&config_path)?;
        Ok(config.with_env_overrides())
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var("VOLTWISE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("VOLTWISE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("VOLTWISE_MODEL") {
            self.default_model = model;
        }

        self
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".voltwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.context.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "context.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.context.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.ambiguity_threshold) {
            return Err(ConfigError::ValidationError(
                "classifier.ambiguity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if !matches!(self.cache.backend.as_str(), "memory" | "sqlite" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "cache.backend must be memory, sqlite or none (got '{}')",
                self.cache.backend
            )));
        }

        if !matches!(self.conversation.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "conversation.backend must be memory or sqlite (got '{}')",
                self.conversation.backend
            )));
        }

        for (query_type, agent) in &self.router.mapping {
            if QueryType::parse(query_type).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "router.mapping has unknown query type '{query_type}'"
                )));
            }
            if AgentRole::parse(agent).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "router.mapping.{query_type} names unknown agent '{agent}'"
                )));
            }
        }

        if AgentRole::parse(&self.router.default_agent).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "router.default_agent names unknown agent '{}'",
                self.router.default_agent
            )));
        }

        if self.completion.max_retries > 10 {
            return Err(ConfigError::ValidationError(
                "completion.max_retries must be at most 10".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
            context: ContextConfig::default(),
            classifier: ClassifierConfig::default(),
            cache: CacheConfig::default(),
            knowledge: KnowledgeConfig::default(),
            conversation: ConversationConfig::default(),
            telemetry: TelemetryConfig::default(),
            user: UserConfig::default(),
            router: RouterConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
