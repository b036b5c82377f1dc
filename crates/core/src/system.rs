//! Live system state and user profile sources.
//!
//! How telemetry is acquired (inverter polling, BMS bus, miner APIs) is
//! outside this crate: collectors produce a [`SystemSnapshot`] and a
//! [`SystemStateSource`] hands the latest one to the request path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::SourceError;

/// Point-in-time view of the installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub captured_at: DateTime<Utc>,

    /// Battery state of charge, percent.
    pub battery_soc_pct: f32,

    /// Positive while charging, negative while discharging.
    pub battery_power_w: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_temp_c: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_capacity_kwh: Option<f32>,

    pub solar_power_w: f32,

    pub load_power_w: f32,

    /// Positive while importing, negative while exporting.
    #[serde(default)]
    pub grid_power_w: f32,

    #[serde(default)]
    pub miners_online: u32,

    #[serde(default)]
    pub miners_total: u32,

    #[serde(default)]
    pub miner_power_w: f32,

    /// Active alarms, most severe first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,

    /// Historical notes, newest first. Least important when space is short.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SystemSnapshot {
    /// Solar production not consumed by the household load.
    pub fn surplus_w(&self) -> f32 {
        self.solar_power_w - self.load_power_w
    }

    /// Render for a prompt, most structurally important lines first.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Current state (as of {}):\n",
            self.captured_at.format("%Y-%m-%d %H:%M UTC")
        );

        let direction = if self.battery_power_w > 0.0 {
            "charging"
        } else if self.battery_power_w < 0.0 {
            "discharging"
        } else {
            "idle"
        };
        out.push_str(&format!(
            "- Battery: {:.0}% SOC, {} at {:.0} W",
            self.battery_soc_pct,
            direction,
            self.battery_power_w.abs()
        ));
        if let Some(temp) = self.battery_temp_c {
            out.push_str(&format!(", {temp:.1} °C"));
        }
        if let Some(capacity) = self.battery_capacity_kwh {
            out.push_str(&format!(", capacity {capacity:.1} kWh"));
        }
        out.push('\n');

        out.push_str(&format!("- Solar: {:.0} W\n", self.solar_power_w));

        let grid = if self.grid_power_w >= 0.0 { "importing" } else { "exporting" };
        out.push_str(&format!(
            "- Load: {:.0} W; grid {} {:.0} W\n",
            self.load_power_w,
            grid,
            self.grid_power_w.abs()
        ));

        if self.miners_total > 0 {
            out.push_str(&format!(
                "- Miners: {}/{} online drawing {:.0} W\n",
                self.miners_online, self.miners_total, self.miner_power_w
            ));
        }

        if !self.alerts.is_empty() {
            out.push_str("Alerts:\n");
            for alert in &self.alerts {
                out.push_str(&format!("- {alert}\n"));
            }
        }

        if !self.notes.is_empty() {
            out.push_str("Recent notes:\n");
            for note in &self.notes {
                out.push_str(&format!("- {note}\n"));
            }
        }

        out.trim_end().to_string()
    }
}

#[async_trait]
pub trait SystemStateSource: Send + Sync {
    fn name(&self) -> &str;

    /// The latest snapshot.
    async fn snapshot(&self) -> std::result::Result<SystemSnapshot, SourceError>;
}

#[async_trait]
pub trait UserContextSource: Send + Sync {
    fn name(&self) -> &str;

    /// Profile and preference text for the session's user, if any.
    async fn profile(&self, session_id: &str) -> std::result::Result<Option<String>, SourceError>;
}
