//! Miner coordinator tool — decides how many miners the surplus can carry.
//!
//! Miners are the dispatchable load: they only run on power the battery
//! does not need. Surplus is measured with the miners' own draw added back,
//! so a running fleet does not talk itself out of running.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use voltwise_core::error::ToolError;
use voltwise_core::tool::{Tool, ToolResult};
use voltwise_core::SystemStateSource;

use crate::inputs::{number_arg, percent_arg, snapshot_if_needed};

const DEFAULT_MIN_SOC: f32 = 80.0;
const DEFAULT_PER_MINER_W: f32 = 1400.0;

#[derive(Debug, Clone, Serialize)]
pub struct MinerDecision {
    pub run: bool,
    pub miners_to_run: u32,
    pub available_w: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MinerInputs {
    /// Surplus with the miners' current draw added back.
    pub available_w: f32,
    pub soc_pct: f32,
    pub min_soc_pct: f32,
    pub per_miner_w: f32,
    pub miners_total: u32,
}

pub fn decide(inputs: &MinerInputs) -> MinerDecision {
    let MinerInputs { available_w, soc_pct, min_soc_pct, per_miner_w, miners_total } = *inputs;

    if soc_pct < min_soc_pct {
        return MinerDecision {
            run: false,
            miners_to_run: 0,
            available_w,
            reason: format!(
                "Battery at {soc_pct:.0}% is below the {min_soc_pct:.0}% needed before mining"
            ),
        };
    }

    let affordable = if per_miner_w > 0.0 && available_w > 0.0 {
        (available_w / per_miner_w).floor() as u32
    } else {
        0
    };
    let miners_to_run = if miners_total > 0 { affordable.min(miners_total) } else { affordable };

    if miners_to_run == 0 {
        return MinerDecision {
            run: false,
            miners_to_run: 0,
            available_w,
            reason: format!(
                "{available_w:.0} W available is less than one miner's {per_miner_w:.0} W draw"
            ),
        };
    }

    MinerDecision {
        run: true,
        miners_to_run,
        available_w,
        reason: format!(
            "{available_w:.0} W available covers {miners_to_run} miner(s) at {per_miner_w:.0} W each"
        ),
    }
}

pub struct MinerCoordinatorTool {
    state: Option<Arc<dyn SystemStateSource>>,
}

impl MinerCoordinatorTool {
    pub fn new(state: Option<Arc<dyn SystemStateSource>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for MinerCoordinatorTool {
    fn name(&self) -> &str {
        "miner_coordinator"
    }

    fn description(&self) -> &str {
        "Decide whether the bitcoin miners should run, and how many, given solar surplus \
         and battery state of charge. Any figure left out is taken from live telemetry."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "surplus_w": { "type": "number", "description": "Solar production minus non-mining load, watts" },
                "soc_pct": { "type": "number", "description": "Current state of charge, percent" },
                "min_soc_pct": { "type": "number", "description": "Battery must be at least this full before mining, percent (default 80)" },
                "per_miner_w": { "type": "number", "description": "Power draw of one miner, watts (default 1400)" }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let surplus = number_arg(&arguments, "surplus_w")?;
        let soc = percent_arg(&arguments, "soc_pct")?;
        let per_miner = number_arg(&arguments, "per_miner_w")?;

        let snapshot = snapshot_if_needed(
            self.name(),
            self.state.as_ref(),
            surplus.is_none() || soc.is_none(),
        )
        .await?;

        let per_miner_w = per_miner
            .or_else(|| {
                snapshot
                    .as_ref()
                    .filter(|s| s.miners_online > 0 && s.miner_power_w > 0.0)
                    .map(|s| s.miner_power_w / s.miners_online as f32)
            })
            .unwrap_or(DEFAULT_PER_MINER_W);

        let inputs = MinerInputs {
            available_w: surplus
                .or(snapshot.as_ref().map(|s| s.surplus_w() + s.miner_power_w))
                .unwrap_or_default(),
            soc_pct: soc.or(snapshot.as_ref().map(|s| s.battery_soc_pct)).unwrap_or_default(),
            min_soc_pct: percent_arg(&arguments, "min_soc_pct")?.unwrap_or(DEFAULT_MIN_SOC),
            per_miner_w,
            miners_total: snapshot.as_ref().map(|s| s.miners_total).unwrap_or(0),
        };

        let decision = decide(&inputs);
        debug!(
            run = decision.run,
            miners = decision.miners_to_run,
            available_w = decision.available_w,
            "Miner decision"
        );
        let output = if decision.run {
            format!("Run {} miner(s). {}.", decision.miners_to_run, decision.reason)
        } else {
            format!("Keep miners off. {}.", decision.reason)
        };

        let data = serde_json::to_value(&decision).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(output, data))
    }
}
