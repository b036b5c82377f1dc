//! Battery optimizer tool — charge/discharge recommendation.
//!
//! The decision is a small rule table over state of charge and solar
//! surplus:
//!
//! | condition | action |
//! |---|---|
//! | SOC below reserve | charge (from grid if there is no surplus) |
//! | surplus and SOC below target | charge at the surplus, capped |
//! | deficit and SOC above reserve | discharge to cover the deficit, capped |
//! | otherwise | hold |

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use voltwise_core::error::ToolError;
use voltwise_core::tool::{Tool, ToolResult};
use voltwise_core::SystemStateSource;

use crate::inputs::{number_arg, percent_arg, snapshot_if_needed};

const DEFAULT_RESERVE_SOC: f32 = 20.0;
const DEFAULT_TARGET_SOC: f32 = 90.0;
const DEFAULT_MAX_RATE_W: f32 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryAction {
    Charge,
    Discharge,
    Hold,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatteryPlan {
    pub action: BatteryAction,
    pub rate_w: f32,
    pub from_grid: bool,
    /// Time to reach the target (charging) or the reserve (discharging).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f32>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BatteryInputs {
    pub soc_pct: f32,
    pub surplus_w: f32,
    pub reserve_soc_pct: f32,
    pub target_soc_pct: f32,
    pub max_rate_w: f32,
    pub capacity_kwh: Option<f32>,
}

pub fn plan(inputs: &BatteryInputs) -> BatteryPlan {
    let BatteryInputs {
        soc_pct,
        surplus_w,
        reserve_soc_pct,
        target_soc_pct,
        max_rate_w,
        capacity_kwh,
    } = *inputs;

    let hours_for = |from: f32, to: f32, rate_w: f32| -> Option<f32> {
        let capacity = capacity_kwh?;
        if rate_w <= 0.0 {
            return None;
        }
        Some(((to - from).abs() / 100.0 * capacity * 1000.0 / rate_w * 10.0).round() / 10.0)
    };

    if soc_pct < reserve_soc_pct {
        let from_grid = surplus_w <= 0.0;
        let rate_w = if from_grid { max_rate_w } else { surplus_w.min(max_rate_w) };
        return BatteryPlan {
            action: BatteryAction::Charge,
            rate_w,
            from_grid,
            hours: hours_for(soc_pct, reserve_soc_pct, rate_w),
            reason: format!(
                "State of charge {soc_pct:.0}% is below the {reserve_soc_pct:.0}% reserve"
            ),
        };
    }

    if surplus_w > 0.0 && soc_pct < target_soc_pct {
        let rate_w = surplus_w.min(max_rate_w);
        return BatteryPlan {
            action: BatteryAction::Charge,
            rate_w,
            from_grid: false,
            hours: hours_for(soc_pct, target_soc_pct, rate_w),
            reason: format!(
                "{surplus_w:.0} W of solar surplus and {soc_pct:.0}% is below the {target_soc_pct:.0}% target"
            ),
        };
    }

    if surplus_w < 0.0 && soc_pct > reserve_soc_pct {
        let rate_w = (-surplus_w).min(max_rate_w);
        return BatteryPlan {
            action: BatteryAction::Discharge,
            rate_w,
            from_grid: false,
            hours: hours_for(soc_pct, reserve_soc_pct, rate_w),
            reason: format!(
                "Load exceeds solar by {:.0} W and {soc_pct:.0}% is above the {reserve_soc_pct:.0}% reserve",
                -surplus_w
            ),
        };
    }

    BatteryPlan {
        action: BatteryAction::Hold,
        rate_w: 0.0,
        from_grid: false,
        hours: None,
        reason: if soc_pct >= target_soc_pct {
            format!("Battery is at or above the {target_soc_pct:.0}% target")
        } else {
            "Solar production matches the load".to_string()
        },
    }
}

pub struct BatteryOptimizerTool {
    state: Option<Arc<dyn SystemStateSource>>,
}

impl BatteryOptimizerTool {
    /// Missing figures are read from `state` when given.
    pub fn new(state: Option<Arc<dyn SystemStateSource>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for BatteryOptimizerTool {
    fn name(&self) -> &str {
        "battery_optimizer"
    }

    fn description(&self) -> &str {
        "Recommend whether the battery should charge, discharge or hold, and at what rate. \
         Any figure left out is taken from live telemetry."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "soc_pct": { "type": "number", "description": "Current state of charge, percent" },
                "surplus_w": { "type": "number", "description": "Solar production minus household load, watts (negative for a deficit)" },
                "reserve_soc_pct": { "type": "number", "description": "Never discharge below this, percent (default 20)" },
                "target_soc_pct": { "type": "number", "description": "Stop charging at this, percent (default 90)" },
                "max_rate_w": { "type": "number", "description": "Inverter charge/discharge limit, watts (default 5000)" },
                "capacity_kwh": { "type": "number", "description": "Usable battery capacity, kWh" }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let soc = percent_arg(&arguments, "soc_pct")?;
        let surplus = number_arg(&arguments, "surplus_w")?;
        let capacity = number_arg(&arguments, "capacity_kwh")?;

        let snapshot =
            snapshot_if_needed(self.name(), self.state.as_ref(), soc.is_none() || surplus.is_none())
                .await?;

        let inputs = BatteryInputs {
            soc_pct: soc.or(snapshot.as_ref().map(|s| s.battery_soc_pct)).unwrap_or_default(),
            surplus_w: surplus.or(snapshot.as_ref().map(|s| s.surplus_w())).unwrap_or_default(),
            reserve_soc_pct: percent_arg(&arguments, "reserve_soc_pct")?
                .unwrap_or(DEFAULT_RESERVE_SOC),
            target_soc_pct: percent_arg(&arguments, "target_soc_pct")?
                .unwrap_or(DEFAULT_TARGET_SOC),
            max_rate_w: number_arg(&arguments, "max_rate_w")?.unwrap_or(DEFAULT_MAX_RATE_W),
            capacity_kwh: capacity.or(snapshot.as_ref().and_then(|s| s.battery_capacity_kwh)),
        };

        if inputs.reserve_soc_pct > inputs.target_soc_pct {
            return Err(ToolError::InvalidArguments(
                "reserve_soc_pct must not exceed target_soc_pct".into(),
            ));
        }

        let plan = plan(&inputs);
        debug!(
            action = ?plan.action,
            rate_w = plan.rate_w,
            soc_pct = inputs.soc_pct,
            "Battery plan"
        );
        let mut output = match plan.action {
            BatteryAction::Charge if plan.from_grid => {
                format!("Charge from grid at {:.0} W", plan.rate_w)
            }
            BatteryAction::Charge => format!("Charge at {:.0} W", plan.rate_w),
            BatteryAction::Discharge => format!("Discharge at {:.0} W", plan.rate_w),
            BatteryAction::Hold => "Hold".to_string(),
        };
        if let Some(hours) = plan.hours {
            output.push_str(&format!(" (~{hours} h)"));
        }
        output.push_str(&format!(". {}.", plan.reason));

        let data = serde_json::to_value(&plan).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult::ok(output, data))
    }
}
