//! Tool trait — the abstraction over specialist capabilities.
//!
//! Tools are what let a specialist act on the energy system: read live
//! telemetry, compute a battery schedule, decide miner dispatch, search the
//! knowledge base.
//!
//! [`ToolRegistry::invoke`] is the only way a tool is ever executed. It
//! never fails: errors and timeouts come back as a failed [`ToolCallRecord`]
//! so the caller can keep reasoning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: Some(data),
        }
    }
}

/// What happened when a tool was invoked, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "telemetry_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The fixed set of tools a specialist owns.
///
/// Registration happens once at construction; afterwards the registry is
/// only read. Names are kept sorted so tool definitions go to the LLM in a
/// stable order.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout,
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Invoke a tool call and record the outcome.
    pub async fn invoke(&self, call: &ToolCall) -> ToolCallRecord {
        let started = Instant::now();
        let outcome = match self.tools.get(&call.name) {
            None => Err(ToolError::NotFound(call.name.clone())),
            Some(tool) => {
                let execution = tool.execute(call.arguments.clone());
                match tokio::time::timeout(self.timeout, execution).await {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_secs: self.timeout.as_secs(),
                    }),
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) if result.success => {
                debug!(tool = %call.name, duration_ms, "Tool call succeeded");
                ToolCallRecord {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    success: true,
                    output: result.output,
                    error: None,
                    duration_ms,
                }
            }
            Ok(result) => {
                warn!(tool = %call.name, "Tool reported failure");
                ToolCallRecord {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    success: false,
                    error: Some(result.output.clone()),
                    output: result.output,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolCallRecord {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    success: false,
                    output: String::new(),
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
