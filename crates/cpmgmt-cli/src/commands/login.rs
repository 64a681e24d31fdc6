use std::fs;
use std::path::Path;

use anyhow::Context;
use cpmgmt_core::{LoginInvocation, Outcome};
use serde_json::Value;
use tracing::info;

use crate::cli::Settings;
use crate::client::{CliDependencies, CliError, CliResult};

pub(crate) async fn handle_login(deps: &CliDependencies, settings: &Settings) -> CliResult<Outcome> {
    let invocation = LoginInvocation {
        payload: settings.payload.clone(),
        fingerprint: settings.fingerprint.clone(),
        api_context: settings.api_context.clone(),
        api_version: settings.api_version.clone(),
    };
    let outcome = deps.dispatcher.login(&invocation).await?;

    if let Some(path) = &settings.save_session {
        save_session(path, &outcome.response)?;
        info!(path = %path.display(), "session data saved");
    }
    Ok(outcome)
}

fn save_session(path: &Path, session: &Value) -> CliResult<()> {
    fs::write(path, session.to_string())
        .with_context(|| format!("failed to write session data to {}", path.display()))
        .map_err(CliError::failure)
}
