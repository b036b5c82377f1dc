//! Query vocabulary: what a user asked, how it was classified, and which
//! specialist roles exist to answer it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four intent categories a query can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Live state of the installation: battery level, solar output, loads.
    System,
    /// Background knowledge: chemistry, best practices, how things work.
    Research,
    /// Scheduling and optimization decisions.
    Planning,
    /// Everything else, including ambiguous input.
    General,
}

impl QueryType {
    pub const ALL: [QueryType; 4] = [
        QueryType::System,
        QueryType::Research,
        QueryType::Planning,
        QueryType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Research => "research",
            Self::Planning => "planning",
            Self::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "research" => Some(Self::Research),
            "planning" => Some(Self::Planning),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of specialist roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    SolarController,
    EnergyOrchestrator,
    ResearchAgent,
}

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [
        AgentRole::SolarController,
        AgentRole::EnergyOrchestrator,
        AgentRole::ResearchAgent,
    ];

    /// Stable identifier used in configuration and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SolarController => "solar_controller",
            Self::EnergyOrchestrator => "energy_orchestrator",
            Self::ResearchAgent => "research_agent",
        }
    }

    /// Human-facing name returned to API clients.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SolarController => "Solar Controller",
            Self::EnergyOrchestrator => "Energy Orchestrator",
            Self::ResearchAgent => "Research Agent",
        }
    }

    /// Accepts either the identifier or the display name.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|r| r.as_str() == normalized)
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// An incoming question. Lives for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub session_id: String,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            received_at: Utc::now(),
        }
    }
}

/// The classifier's verdict for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub query_type: QueryType,

    /// In `[0, 1]`. Ambiguous input yields `General` with at most 0.5.
    pub confidence: f32,

    /// True when the type was carried over from the previous turn.
    #[serde(default)]
    pub inherited: bool,

    /// Lexicon entries that matched, for diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

impl Classification {
    pub fn new(query_type: QueryType, confidence: f32) -> Self {
        Self {
            query_type,
            confidence: confidence.clamp(0.0, 1.0),
            inherited: false,
            matched: Vec::new(),
        }
    }
}

/// What the classifier needs to know about the previous exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorTurn {
    pub query_type: QueryType,
    pub agent_role: Option<AgentRole>,
}
