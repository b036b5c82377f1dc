//! Wires configuration into a ready [`AskPipeline`].
//!
//! Every store and source is built here exactly once and injected as a
//! trait object; nothing downstream knows which backend it talks to.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voltwise_agent::{
    AgentRouter, AskPipeline, AssemblerSettings, BudgetPlanner, ContextAssembler, ContextSources,
    QueryClassifier, SpecialistSettings, Specialists, ToolSources,
};
use voltwise_cache::{DisabledCache, InMemoryCache, ResilientCache, SqliteCache};
use voltwise_config::AppConfig;
use voltwise_core::{
    CacheStore, CharHeuristicEstimator, ConversationStore, KnowledgeBase, KnowledgeRetriever,
    Provider, SystemStateSource, TokenEstimator,
};
use voltwise_memory::{
    FileSystemState, InMemoryConversationStore, InMemoryKnowledgeBase, ProfileDirectory,
    SharedSystemState, SqliteConversationStore,
};

/// Everything the gateway and the CLI need after startup.
pub struct Services {
    pub pipeline: Arc<AskPipeline>,
    pub cache: Arc<ResilientCache>,
    /// Target of document ingestion.
    pub knowledge: Arc<dyn KnowledgeBase>,
    /// Present when no snapshot file is configured; fed by `PUT /telemetry`.
    pub live_state: Option<Arc<SharedSystemState>>,
}

/// Builds [`Services`]. Overrides replace what configuration would pick,
/// which is how tests inject scripted providers and misbehaving sources.
pub struct ServicesBuilder<'a> {
    config: &'a AppConfig,
    provider: Option<Arc<dyn Provider>>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
}

impl<'a> ServicesBuilder<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            provider: None,
            retriever: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Serve retrieval (context and research tools) from `retriever`
    /// instead of the in-process knowledge base.
    pub fn retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub async fn build(self) -> anyhow::Result<Services> {
        let config = self.config;

        let provider = match self.provider {
            Some(provider) => provider,
            None => voltwise_providers::build_from_config(config)
                .context("Failed to build the completion provider")?,
        };

        let cache = Arc::new(ResilientCache::new(
            build_cache_backend(config).await?,
            Duration::from_millis(config.cache.timeout_ms),
        ));
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(CharHeuristicEstimator::new(config.context.chars_per_token));
        let conversation = build_conversation_store(config, estimator.clone()).await?;

        let knowledge_base = Arc::new(InMemoryKnowledgeBase::new(config.knowledge.chunk_max_chars));
        if let Some(dir) = &config.knowledge.documents_dir {
            if let Err(e) = knowledge_base.load_dir(dir).await {
                warn!(dir = %dir.display(), error = %e, "Knowledge documents not loaded");
            }
        }
        let retriever: Arc<dyn KnowledgeRetriever> = match self.retriever {
            Some(retriever) => retriever,
            None => knowledge_base.clone(),
        };

        let (system, live_state) = match &config.telemetry.snapshot_path {
            Some(path) => {
                let file: Arc<dyn SystemStateSource> = Arc::new(FileSystemState::new(path.clone()));
                (file, None)
            }
            None => {
                let shared = Arc::new(SharedSystemState::new(None));
                let source: Arc<dyn SystemStateSource> = shared.clone();
                (source, Some(shared))
            }
        };

        let user = Arc::new(ProfileDirectory::new(
            config.user.default_profile.clone(),
            config.user.profiles.clone(),
        ));

        let assembler = ContextAssembler::new(
            ContextSources {
                system: system.clone(),
                knowledge: retriever.clone(),
                conversation: conversation.clone(),
                user,
            },
            cache.clone(),
            estimator,
            AssemblerSettings::from_config(config),
        );

        let specialists = Specialists::build(
            provider.clone(),
            &SpecialistSettings {
                model: voltwise_providers::resolve_model(config),
                temperature: config.default_temperature,
                max_tokens: Some(config.default_max_tokens),
                max_tool_iterations: config.router.max_tool_iterations,
            },
            &ToolSources {
                system,
                knowledge: retriever,
                min_similarity: config.context.similarity_threshold,
                tool_timeout: Duration::from_secs(config.router.tool_timeout_secs),
            },
        );

        let pipeline = AskPipeline::new(
            QueryClassifier::new(&config.classifier),
            BudgetPlanner::from_config(&config.context),
            assembler,
            AgentRouter::from_config(&config.router, specialists),
            conversation,
        );

        info!(
            provider = %provider.name(),
            cache = %config.cache.backend,
            conversation = %config.conversation.backend,
            "Services ready"
        );

        Ok(Services {
            pipeline: Arc::new(pipeline),
            cache,
            knowledge: knowledge_base,
            live_state,
        })
    }
}

/// Build with everything taken from configuration.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    ServicesBuilder::new(config).build().await
}

async fn build_cache_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    if !config.cache.enabled {
        return Ok(Arc::new(DisabledCache));
    }
    let backend: Arc<dyn CacheStore> = match config.cache.backend.as_str() {
        "sqlite" => {
            let path = sqlite_path(config.cache.path.clone(), "cache.db")?;
            let cache = SqliteCache::new(&path).await.context("Failed to open the cache database")?;
            match cache.purge_expired().await {
                Ok(purged) => info!(purged, "Expired cache entries removed"),
                Err(e) => warn!(error = %e, "Cannot purge expired cache entries"),
            }
            Arc::new(cache)
        }
        "none" => Arc::new(DisabledCache),
        _ => Arc::new(InMemoryCache::new(config.cache.max_entries)),
    };
    Ok(backend)
}

async fn build_conversation_store(
    config: &AppConfig,
    estimator: Arc<dyn TokenEstimator>,
) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let store: Arc<dyn ConversationStore> = match config.conversation.backend.as_str() {
        "sqlite" => {
            let path = sqlite_path(config.conversation.path.clone(), "conversations.db")?;
            Arc::new(
                SqliteConversationStore::new(&path)
                    .await
                    .context("Failed to open the conversation database")?
                    .with_estimator(estimator),
            )
        }
        _ => Arc::new(InMemoryConversationStore::new().with_estimator(estimator)),
    };
    Ok(store)
}

/// A `sqlite://` URL for `configured`, or for `file_name` in the config dir.
fn sqlite_path(configured: Option<PathBuf>, file_name: &str) -> anyhow::Result<String> {
    let path = match configured {
        Some(path) => path,
        None => {
            let dir = AppConfig::config_dir();
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
            dir.join(file_name)
        }
    };
    Ok(format!("sqlite://{}", path.display()))
}
