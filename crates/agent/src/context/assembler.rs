//! Context assembly: cache lookup, concurrent source fetches, budget
//! enforcement.
//!
//! Four categories feed a bundle, in descending priority:
//!
//! | Category | Source | Trim strategy |
//! |----------|--------|---------------|
//! | System | live snapshot | tail truncated at a line boundary |
//! | Conversation | session history | oldest turns dropped |
//! | Knowledge | ranked passages | lowest-similarity dropped |
//! | User | profile text | truncated |
//!
//! When the aggregate budget is exceeded, categories are trimmed in the
//! reverse of that order: user, knowledge, conversation, system.
//!
//! A source that errors or times out contributes nothing; the bundle lists
//! it in `degraded_sources` unless fallback is disabled, in which case the
//! request fails with that source's [`FailureKind`].

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use voltwise_config::{AppConfig, ContextConfig};
use voltwise_core::conversation::trim_oldest_to_fit;
use voltwise_core::token::truncate_to_tokens;
use voltwise_core::{
    CacheStore, Classification, ConversationMessage, ConversationStore, FailureKind,
    KnowledgeRetriever, Passage, Query, SystemStateSource, TokenEstimator, UserContextSource,
};

use crate::budget::TokenBudget;
use crate::context::bundle::{CategoryTokens, ContextBundle, ContextSource, DropInfo};

/// Source failure surfaced because degrading is disabled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{context_source} context unavailable: {message}")]
pub struct AssemblyError {
    pub context_source: ContextSource,
    pub kind: FailureKind,
    pub message: String,
}

/// The collaborators a bundle is built from.
#[derive(Clone)]
pub struct ContextSources {
    pub system: Arc<dyn SystemStateSource>,
    pub knowledge: Arc<dyn KnowledgeRetriever>,
    pub conversation: Arc<dyn ConversationStore>,
    pub user: Arc<dyn UserContextSource>,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceTimeouts {
    pub system: Duration,
    pub knowledge: Duration,
    pub conversation: Duration,
    pub user: Duration,
}

impl Default for SourceTimeouts {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

impl SourceTimeouts {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            system: Duration::from_millis(config.timeouts.system_ms),
            knowledge: Duration::from_millis(config.timeouts.knowledge_ms),
            conversation: Duration::from_millis(config.timeouts.conversation_ms),
            user: Duration::from_millis(config.timeouts.user_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub similarity_threshold: f32,
    pub truncate_on_exceed: bool,
    pub fallback_on_source_error: bool,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub scope_by_session: bool,
    pub timeouts: SourceTimeouts,
}

impl AssemblerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            similarity_threshold: config.context.similarity_threshold,
            truncate_on_exceed: config.context.truncate_on_exceed,
            fallback_on_source_error: config.context.fallback_on_source_error,
            cache_enabled: config.cache.enabled,
            cache_ttl_seconds: config.cache.ttl_seconds,
            scope_by_session: config.cache.scope_by_session,
            timeouts: SourceTimeouts::from_config(&config.context),
        }
    }
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct ContextAssembler {
    sources: ContextSources,
    cache: Arc<dyn CacheStore>,
    estimator: Arc<dyn TokenEstimator>,
    settings: AssemblerSettings,
}

/// Outcome of one bounded source fetch: the value, or why there is none.
type Fetched<T> = Result<T, String>;

impl ContextAssembler {
    pub fn new(
        sources: ContextSources,
        cache: Arc<dyn CacheStore>,
        estimator: Arc<dyn TokenEstimator>,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            sources,
            cache,
            estimator,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    /// Build the context bundle for one query.
    pub async fn assemble(
        &self,
        query: &Query,
        classification: &Classification,
        budget: &TokenBudget,
    ) -> Result<ContextBundle, AssemblyError> {
        let key = self.cache_key(query, classification);

        if let Some(key) = &key {
            if let Some(mut bundle) = self.cached(key).await {
                bundle.cache_hit = true;
                info!(
                    query_type = %classification.query_type,
                    session_id = %query.session_id,
                    tokens = bundle.total_tokens,
                    cache_hit = true,
                    "Context served from cache"
                );
                return Ok(bundle);
            }
        }

        let timeouts = self.settings.timeouts;
        let threshold = self.settings.similarity_threshold;

        let (system, knowledge, conversation, user) = tokio::join!(
            bounded(timeouts.system, self.sources.system.snapshot()),
            async {
                if budget.kb_max_docs == 0 {
                    return Ok(Vec::new());
                }
                bounded(
                    timeouts.knowledge,
                    self.sources.knowledge.search(&query.text, budget.kb_max_docs, threshold),
                )
                .await
            },
            bounded(
                timeouts.conversation,
                self.sources.conversation.recent(
                    &query.session_id,
                    budget.conv_max_messages,
                    budget.conv_max_tokens,
                ),
            ),
            bounded(timeouts.user, self.sources.user.profile(&query.session_id)),
        );

        let mut degraded = Vec::new();
        let snapshot = self.settle(ContextSource::System, system, &mut degraded)?;
        let passages = self.settle(ContextSource::Knowledge, knowledge, &mut degraded)?;
        let messages = self.settle(ContextSource::Conversation, conversation, &mut degraded)?;
        let profile = self.settle(ContextSource::User, user, &mut degraded)?.flatten();

        let mut drops = Vec::new();
        let system_context = self.shape_text(
            ContextSource::System,
            snapshot.map(|s| s.render()).unwrap_or_default(),
            budget.system_max,
            &mut drops,
        );
        let kb_passages = self.select_passages(passages.unwrap_or_default(), budget, &mut drops);
        let conversation_messages =
            self.window_conversation(messages.unwrap_or_default(), budget, &mut drops);
        let user_context = self.shape_text(
            ContextSource::User,
            profile.unwrap_or_default(),
            budget.user_max_tokens,
            &mut drops,
        );

        let mut bundle = ContextBundle {
            system_context,
            kb_passages,
            conversation_messages,
            user_context,
            tokens: CategoryTokens::default(),
            total_tokens: 0,
            cache_hit: false,
            classification: classification.clone(),
            budget: *budget,
            over_budget: false,
            truncated: false,
            degraded_sources: degraded,
            drops,
        };
        self.recount(&mut bundle);
        self.enforce_aggregate(&mut bundle);
        bundle.truncated = !bundle.drops.is_empty();

        debug!(
            system = bundle.tokens.system,
            knowledge = bundle.tokens.knowledge,
            conversation = bundle.tokens.conversation,
            user = bundle.tokens.user,
            passages = bundle.kb_passages.len(),
            turns = bundle.conversation_messages.len(),
            "Context assembled"
        );
        info!(
            query_type = %classification.query_type,
            session_id = %query.session_id,
            tokens = bundle.total_tokens,
            cache_hit = false,
            degraded = bundle.degraded_sources.len(),
            "Context built from sources"
        );

        // A degraded bundle would pin the outage for a whole TTL.
        if let Some(key) = &key {
            if !bundle.is_degraded() {
                self.store(key, &bundle).await;
            }
        }

        Ok(bundle)
    }

    fn cache_key(&self, query: &Query, classification: &Classification) -> Option<String> {
        if !self.settings.cache_enabled {
            return None;
        }
        // Follow-ups depend on the session's history, so never share them.
        let scope = (self.settings.scope_by_session || classification.inherited)
            .then_some(query.session_id.as_str());
        Some(voltwise_cache::cache_key(classification.query_type, &query.text, scope))
    }

    async fn cached(&self, key: &str) -> Option<ContextBundle> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(kind = %FailureKind::CacheUnavailable, error = %e, "Cache lookup failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cached bundle");
                None
            }
        }
    }

    async fn store(&self, key: &str, bundle: &ContextBundle) {
        let value = match serde_json::to_string(bundle) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to serialize context bundle");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &value, self.settings.cache_ttl_seconds).await {
            warn!(kind = %FailureKind::CacheUnavailable, error = %e, "Cache write failed");
        }
    }

    /// Unwrap a fetch, degrading a failure to `None` or surfacing it.
    fn settle<T>(
        &self,
        source: ContextSource,
        fetched: Fetched<T>,
        degraded: &mut Vec<ContextSource>,
    ) -> Result<Option<T>, AssemblyError> {
        match fetched {
            Ok(value) => Ok(Some(value)),
            Err(message) if self.settings.fallback_on_source_error => {
                warn!(
                    kind = %source.failure_kind(),
                    source = %source,
                    error = %message,
                    "Context source failed; continuing without it"
                );
                degraded.push(source);
                Ok(None)
            }
            Err(message) => Err(AssemblyError {
                context_source: source,
                kind: source.failure_kind(),
                message,
            }),
        }
    }

    /// Truncate free text to its cap, unless truncation is disabled.
    fn shape_text(
        &self,
        source: ContextSource,
        text: String,
        max_tokens: usize,
        drops: &mut Vec<DropInfo>,
    ) -> String {
        if !self.settings.truncate_on_exceed {
            return text;
        }
        let before = self.estimator.estimate(&text);
        let (kept, truncated) = truncate_to_tokens(self.estimator.as_ref(), &text, max_tokens);
        if truncated {
            drops.push(DropInfo {
                category: source,
                items_dropped: 0,
                tokens_dropped: before.saturating_sub(self.estimator.estimate(&kept)),
                reason: format!("{source} cap of {max_tokens} tokens"),
            });
        }
        kept
    }

    fn select_passages(
        &self,
        mut passages: Vec<Passage>,
        budget: &TokenBudget,
        drops: &mut Vec<DropInfo>,
    ) -> Vec<Passage> {
        passages.retain(|p| p.score >= self.settings.similarity_threshold);
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut accepted = Vec::new();
        let mut skipped = Vec::new();
        let mut used = 0;
        let mut ranked = passages.into_iter();
        while accepted.len() < budget.kb_max_docs {
            let Some(passage) = ranked.next() else { break };
            let tokens = self.estimator.estimate(&passage.text);
            if used + tokens > budget.kb_max_tokens {
                skipped.push(passage);
                break;
            }
            used += tokens;
            accepted.push(passage);
        }
        skipped.extend(ranked);

        if !skipped.is_empty() {
            drops.push(DropInfo {
                category: ContextSource::Knowledge,
                items_dropped: skipped.len(),
                tokens_dropped: skipped.iter().map(|p| self.estimator.estimate(&p.text)).sum(),
                reason: "knowledge document or token cap".into(),
            });
        }
        accepted
    }

    fn window_conversation(
        &self,
        mut messages: Vec<ConversationMessage>,
        budget: &TokenBudget,
        drops: &mut Vec<DropInfo>,
    ) -> Vec<ConversationMessage> {
        let before: usize = messages.iter().map(|m| self.estimator.estimate_message(m)).sum();
        let mut dropped = 0;
        if messages.len() > budget.conv_max_messages {
            dropped = messages.len() - budget.conv_max_messages;
            messages.drain(..dropped);
        }
        dropped += trim_oldest_to_fit(&mut messages, budget.conv_max_tokens, |m| {
            self.estimator.estimate_message(m)
        });
        if dropped > 0 {
            let after: usize = messages.iter().map(|m| self.estimator.estimate_message(m)).sum();
            drops.push(DropInfo {
                category: ContextSource::Conversation,
                items_dropped: dropped,
                tokens_dropped: before - after,
                reason: "conversation window".into(),
            });
        }
        messages
    }

    fn recount(&self, bundle: &mut ContextBundle) {
        bundle.tokens = CategoryTokens {
            system: self.estimator.estimate(&bundle.system_context),
            knowledge: bundle.kb_passages.iter().map(|p| self.estimator.estimate(&p.text)).sum(),
            conversation: bundle
                .conversation_messages
                .iter()
                .map(|m| self.estimator.estimate_message(m))
                .sum(),
            user: self.estimator.estimate(&bundle.user_context),
        };
        bundle.total_tokens = bundle.tokens.total();
    }

    /// Bring the bundle within `budget.aggregate()`, or flag it.
    fn enforce_aggregate(&self, bundle: &mut ContextBundle) {
        let aggregate = bundle.budget.aggregate();
        if bundle.total_tokens <= aggregate {
            return;
        }

        warn!(
            kind = %FailureKind::BudgetExceeded,
            tokens = bundle.total_tokens,
            aggregate,
            truncate = self.settings.truncate_on_exceed,
            "Context exceeds aggregate budget"
        );
        if !self.settings.truncate_on_exceed {
            bundle.over_budget = true;
            return;
        }

        let mut excess = bundle.total_tokens - aggregate;

        if bundle.tokens.user > 0 {
            let before = bundle.tokens.user;
            let (kept, _) = truncate_to_tokens(
                self.estimator.as_ref(),
                &bundle.user_context,
                before.saturating_sub(excess),
            );
            bundle.user_context = kept;
            excess = self.record_trim(bundle, ContextSource::User, 0, before, aggregate);
        }

        if excess > 0 && !bundle.kb_passages.is_empty() {
            let before = bundle.tokens.knowledge;
            let mut dropped = 0;
            // Passages are sorted best first, so pop the weakest.
            while excess > 0 && bundle.kb_passages.pop().is_some() {
                dropped += 1;
                excess = self.excess(bundle, aggregate);
            }
            excess = self.record_trim(bundle, ContextSource::Knowledge, dropped, before, aggregate);
        }

        if excess > 0 && !bundle.conversation_messages.is_empty() {
            let before = bundle.tokens.conversation;
            let mut dropped = 0;
            while excess > 0 && !bundle.conversation_messages.is_empty() {
                bundle.conversation_messages.remove(0);
                dropped += 1;
                excess = self.excess(bundle, aggregate);
            }
            excess =
                self.record_trim(bundle, ContextSource::Conversation, dropped, before, aggregate);
        }

        if excess > 0 {
            let before = bundle.tokens.system;
            let (kept, _) = truncate_to_tokens(
                self.estimator.as_ref(),
                &bundle.system_context,
                before.saturating_sub(excess),
            );
            bundle.system_context = kept;
            self.record_trim(bundle, ContextSource::System, 0, before, aggregate);
        }
    }

    fn excess(&self, bundle: &mut ContextBundle, aggregate: usize) -> usize {
        self.recount(bundle);
        bundle.total_tokens.saturating_sub(aggregate)
    }

    /// Recount after trimming `source` and record what it lost.
    fn record_trim(
        &self,
        bundle: &mut ContextBundle,
        source: ContextSource,
        items: usize,
        before: usize,
        aggregate: usize,
    ) -> usize {
        let excess = self.excess(bundle, aggregate);
        bundle.drops.push(DropInfo {
            category: source,
            items_dropped: items,
            tokens_dropped: before.saturating_sub(category_tokens(&bundle.tokens, source)),
            reason: format!("aggregate budget of {aggregate} tokens"),
        });
        excess
    }
}

fn category_tokens(tokens: &CategoryTokens, source: ContextSource) -> usize {
    match source {
        ContextSource::System => tokens.system,
        ContextSource::Knowledge => tokens.knowledge,
        ContextSource::Conversation => tokens.conversation,
        ContextSource::User => tokens.user,
    }
}

/// Run a source call under a timeout, flattening both failure modes to a
/// message.
async fn bounded<T, E: Display>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Fetched<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
    }
}
