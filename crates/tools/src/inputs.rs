//! Energy figures a tool needs, taken from its arguments or, when the model
//! left them out, from the live snapshot.

use std::sync::Arc;
use voltwise_core::error::ToolError;
use voltwise_core::{SystemSnapshot, SystemStateSource};

pub(crate) fn number_arg(
    arguments: &serde_json::Value,
    key: &str,
) -> Result<Option<f32>, ToolError> {
    match arguments.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(|v| Some(v as f32))
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number"))),
    }
}

pub(crate) fn percent_arg(
    arguments: &serde_json::Value,
    key: &str,
) -> Result<Option<f32>, ToolError> {
    let value = number_arg(arguments, key)?;
    if let Some(v) = value {
        if !(0.0..=100.0).contains(&v) {
            return Err(ToolError::InvalidArguments(format!(
                "'{key}' must be between 0 and 100"
            )));
        }
    }
    Ok(value)
}

/// Fetch the snapshot only if some required figure is missing.
pub(crate) async fn snapshot_if_needed(
    tool_name: &str,
    state: Option<&Arc<dyn SystemStateSource>>,
    needed: bool,
) -> Result<Option<SystemSnapshot>, ToolError> {
    if !needed {
        return Ok(None);
    }
    let Some(state) = state else {
        return Err(ToolError::InvalidArguments(
            "missing inputs and no live telemetry is available".into(),
        ));
    };
    state
        .snapshot()
        .await
        .map(Some)
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_arg_variants() {
        let args = serde_json::json!({"soc_pct": 55, "surplus_w": "lots", "reserve": null});
        assert_eq!(number_arg(&args, "soc_pct").unwrap(), Some(55.0));
        assert!(number_arg(&args, "surplus_w").is_err());
        assert_eq!(number_arg(&args, "reserve").unwrap(), None);
        assert_eq!(number_arg(&args, "absent").unwrap(), None);
    }

    #[test]
    fn percent_arg_bounds() {
        assert!(percent_arg(&serde_json::json!({"soc_pct": 140}), "soc_pct").is_err());
        assert_eq!(percent_arg(&serde_json::json!({"soc_pct": 0}), "soc_pct").unwrap(), Some(0.0));
    }
}
