//! Specialist tools for Voltwise.
//!
//! Tools let a specialist act on the installation: read live telemetry,
//! plan battery charging, dispatch miners, and search the knowledge base.
//! Every tool is invoked through `voltwise_core::ToolRegistry::invoke`.

mod inputs;

pub mod battery_optimizer;
pub mod knowledge_search;
pub mod miner_coordinator;
pub mod telemetry_read;

pub use battery_optimizer::BatteryOptimizerTool;
pub use knowledge_search::KnowledgeSearchTool;
pub use miner_coordinator::MinerCoordinatorTool;
pub use telemetry_read::TelemetryReadTool;
