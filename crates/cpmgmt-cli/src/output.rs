//! Result renderers for invocation outcomes.

use anyhow::anyhow;
use cpmgmt_core::Outcome;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

/// Render `outcome` for stdout. JSON output is the `{response, changed}`
/// object consumed by automation; pretty output is meant for people.
pub(crate) fn render_outcome(outcome: &Outcome, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(outcome)
            .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}"))),
        OutputFormat::Pretty => {
            let body = match &outcome.response {
                Value::String(message) => message.clone(),
                other => serde_json::to_string_pretty(other)
                    .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?,
            };
            Ok(format!("changed: {}\n{body}", outcome.changed))
        }
    }
}
