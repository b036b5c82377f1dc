//! The Voltwise request engine.
//!
//! A question goes through five stages:
//!
//! 1. **Classify** it as system, research, planning or general
//!    ([`QueryClassifier`]), carrying the previous turn's type over to
//!    short follow-ups
//! 2. **Plan** a token budget for that type ([`BudgetPlanner`])
//! 3. **Assemble** context from the cache, or from system state, knowledge,
//!    conversation and user profile fetched concurrently
//!    ([`ContextAssembler`])
//! 4. **Route** to the specialist that owns the type ([`AgentRouter`]),
//!    which reasons with its own tools
//! 5. **Record** the exchange in the conversation store
//!
//! [`AskPipeline`] runs all five.

pub mod budget;
pub mod classifier;
pub mod context;
pub mod pipeline;
pub mod router;
pub mod specialist;

#[cfg(test)]
mod test_helpers;

pub use budget::{BudgetPlanner, TokenBudget};
pub use classifier::QueryClassifier;
pub use context::{
    AssemblerSettings, AssemblyError, CategoryTokens, ContextAssembler, ContextBundle,
    ContextSource, ContextSources, DropInfo, SourceTimeouts,
};
pub use pipeline::{AskError, AskPipeline, AskResponse};
pub use router::{AgentRouter, Specialists, ToolSources, registry_for};
pub use specialist::{AgentError, AgentResult, Specialist, SpecialistSettings};
