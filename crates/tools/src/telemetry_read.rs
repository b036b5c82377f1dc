//! Telemetry read tool — the current system snapshot.

use async_trait::async_trait;
use std::sync::Arc;
use voltwise_core::error::ToolError;
use voltwise_core::tool::{Tool, ToolResult};
use voltwise_core::SystemStateSource;

pub struct TelemetryReadTool {
    state: Arc<dyn SystemStateSource>,
}

impl TelemetryReadTool {
    pub fn new(state: Arc<dyn SystemStateSource>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for TelemetryReadTool {
    fn name(&self) -> &str {
        "telemetry_read"
    }

    fn description(&self) -> &str {
        "Read the live state of the installation: battery state of charge, power flows, \
         solar production, household load, grid import/export, miners and active alerts."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let snapshot = self
            .state
            .snapshot()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let data = serde_json::to_value(&snapshot)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(ToolResult::ok(snapshot.render(), data))
    }
}
