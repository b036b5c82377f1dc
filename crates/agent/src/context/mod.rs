//! Token-budgeted context assembly.
//!
//! [`ContextAssembler`] turns a classified query and its [`TokenBudget`]
//! into a [`ContextBundle`]: live system state, conversation window,
//! retrieved knowledge and user profile, each within its cap and together
//! within the aggregate.
//!
//! [`TokenBudget`]: crate::budget::TokenBudget

pub mod assembler;
pub mod bundle;

pub use assembler::{
    AssemblerSettings, AssemblyError, ContextAssembler, ContextSources, SourceTimeouts,
};
pub use bundle::{CategoryTokens, ContextBundle, ContextSource, DropInfo};
