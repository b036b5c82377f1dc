//! Agent router: query type → specialist.
//!
//! The set of specialists is closed. Each is built once, with its own tool
//! registry, when the router is built; a routing decision picks exactly one
//! instance and runs it once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voltwise_config::RouterConfig;
use voltwise_core::{
    AgentRole, FailureKind, KnowledgeRetriever, Provider, Query, QueryType, SystemStateSource,
    ToolRegistry,
};
use voltwise_tools::{
    BatteryOptimizerTool, KnowledgeSearchTool, MinerCoordinatorTool, TelemetryReadTool,
};

use crate::context::ContextBundle;
use crate::specialist::{AgentError, AgentResult, Specialist, SpecialistSettings};

/// What the tools of every specialist read from.
#[derive(Clone)]
pub struct ToolSources {
    pub system: Arc<dyn SystemStateSource>,
    pub knowledge: Arc<dyn KnowledgeRetriever>,
    pub min_similarity: f32,
    pub tool_timeout: Duration,
}

/// The tool set each role owns.
pub fn registry_for(role: AgentRole, sources: &ToolSources) -> ToolRegistry {
    let registry = ToolRegistry::new(sources.tool_timeout);
    match role {
        AgentRole::SolarController => registry
            .with(Box::new(TelemetryReadTool::new(sources.system.clone())))
            .with(Box::new(MinerCoordinatorTool::new(Some(sources.system.clone())))),
        AgentRole::EnergyOrchestrator => registry
            .with(Box::new(TelemetryReadTool::new(sources.system.clone())))
            .with(Box::new(BatteryOptimizerTool::new(Some(sources.system.clone()))))
            .with(Box::new(MinerCoordinatorTool::new(Some(sources.system.clone())))),
        AgentRole::ResearchAgent => registry.with(Box::new(KnowledgeSearchTool::new(
            sources.knowledge.clone(),
            sources.min_similarity,
        ))),
    }
}

/// One instance per role.
pub struct Specialists {
    pub solar_controller: Specialist,
    pub energy_orchestrator: Specialist,
    pub research_agent: Specialist,
}

impl Specialists {
    /// Build every role with its own tool registry, sharing one provider.
    pub fn build(
        provider: Arc<dyn Provider>,
        settings: &SpecialistSettings,
        sources: &ToolSources,
    ) -> Self {
        let build = |role| {
            Specialist::new(role, registry_for(role, sources), provider.clone(), settings.clone())
        };
        Self {
            solar_controller: build(AgentRole::SolarController),
            energy_orchestrator: build(AgentRole::EnergyOrchestrator),
            research_agent: build(AgentRole::ResearchAgent),
        }
    }

    pub fn get(&self, role: AgentRole) -> &Specialist {
        match role {
            AgentRole::SolarController => &self.solar_controller,
            AgentRole::EnergyOrchestrator => &self.energy_orchestrator,
            AgentRole::ResearchAgent => &self.research_agent,
        }
    }
}

pub struct AgentRouter {
    specialists: Specialists,
    mapping: HashMap<QueryType, AgentRole>,
    default_agent: AgentRole,
}

impl AgentRouter {
    pub fn new(
        specialists: Specialists,
        mapping: HashMap<QueryType, AgentRole>,
        default_agent: AgentRole,
    ) -> Self {
        Self {
            specialists,
            mapping,
            default_agent,
        }
    }

    /// Read the mapping table from configuration. Entries naming an
    /// unknown query type or role are skipped.
    pub fn from_config(config: &RouterConfig, specialists: Specialists) -> Self {
        let mut mapping = HashMap::new();
        for (query_type, role) in &config.mapping {
            match (QueryType::parse(query_type), AgentRole::parse(role)) {
                (Some(query_type), Some(role)) => {
                    mapping.insert(query_type, role);
                }
                _ => warn!(
                    query_type = %query_type,
                    role = %role,
                    "Ignoring invalid router mapping"
                ),
            }
        }
        let default_agent = AgentRole::parse(&config.default_agent).unwrap_or_else(|| {
            warn!(
                default_agent = %config.default_agent,
                "Unknown default agent, using Solar Controller"
            );
            AgentRole::SolarController
        });
        Self::new(specialists, mapping, default_agent)
    }

    /// The specialist responsible for `query_type`.
    pub fn select(&self, query_type: QueryType) -> &Specialist {
        let role = match self.mapping.get(&query_type) {
            Some(role) => *role,
            None => {
                warn!(
                    kind = %FailureKind::RoutingFailure,
                    query_type = %query_type,
                    default_agent = %self.default_agent,
                    "No specialist mapped, using default"
                );
                self.default_agent
            }
        };
        self.specialists.get(role)
    }

    pub async fn route(
        &self,
        query: &Query,
        bundle: &ContextBundle,
    ) -> Result<AgentResult, AgentError> {
        let specialist = self.select(bundle.classification.query_type);
        info!(
            query_type = %bundle.classification.query_type,
            agent_role = %specialist.role(),
            session_id = %query.session_id,
            "Routing query"
        );
        specialist.run(query, bundle).await
    }
}
