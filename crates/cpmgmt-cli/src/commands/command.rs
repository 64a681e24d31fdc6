use cpmgmt_core::{CommandInvocation, Outcome};
use serde_json::Value;
use tracing::info;

use crate::cli::Settings;
use crate::client::{CliDependencies, CliResult};

/// Run a non-login command. Non-fatal conditions are reported as a
/// successful outcome whose response is the explanatory message.
pub(crate) async fn handle_command(
    deps: &CliDependencies,
    settings: &Settings,
) -> CliResult<Outcome> {
    let invocation = CommandInvocation {
        command: settings.command.clone(),
        payload: settings.payload.clone(),
        session_data: settings.session_data.clone(),
        fingerprint: settings.fingerprint.clone(),
        api_version: settings.api_version.clone(),
        mode: settings.mode,
    };

    match deps.dispatcher.run(&invocation).await {
        Ok(outcome) => Ok(outcome),
        Err(err) if !err.is_fatal() => {
            info!(command = %settings.command, "command not run: {err}");
            Ok(Outcome {
                response: Value::String(err.to_string()),
                changed: false,
            })
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{harness, settings};
    use anyhow::{Result, anyhow};
    use cpmgmt_core::CommandResult;
    use cpmgmt_test_support::fixtures::{FOREIGN_FINGERPRINT, echoed_session_data};
    use serde_json::json;

    #[tokio::test]
    async fn changing_command_reports_changed() -> Result<()> {
        let h = harness();
        h.server
            .respond("add-host", CommandResult::ok(json!({"uid": "u-1"})));
        let session = echoed_session_data();
        let settings = settings(&[
            "add-host",
            "--payload",
            "{'name': 'web', 'ip-address': '10.0.0.5'}",
            "--session-data",
            &session,
        ])
        .map_err(|err| anyhow!(err.display_message()))?;

        let outcome = handle_command(&h.deps, &settings)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(outcome.changed);
        assert_eq!(outcome.response, json!({"uid": "u-1"}));
        assert_eq!(h.server.commands(), vec!["add-host"]);
        Ok(())
    }

    #[tokio::test]
    async fn publish_in_check_mode_succeeds_with_instruction() -> Result<()> {
        let h = harness();
        let session = echoed_session_data();
        let settings = settings(&["publish", "--check", "--session-data", &session])
            .map_err(|err| anyhow!(err.display_message()))?;

        let outcome = handle_command(&h.deps, &settings)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(!outcome.changed);
        let message = outcome
            .response
            .as_str()
            .ok_or_else(|| anyhow!("expected a message response"))?;
        assert!(message.contains("run it without check mode"));
        assert_eq!(h.server.commands(), vec!["discard"]);
        Ok(())
    }

    #[tokio::test]
    async fn remote_failure_exits_with_failure_after_unwinding() -> Result<()> {
        let h = harness();
        h.server.respond(
            "add-host",
            CommandResult::failed("Requested object [web] already exists"),
        );
        let session = echoed_session_data();
        let settings = settings(&[
            "add-host",
            "--payload",
            "{'name': 'web'}",
            "--session-data",
            &session,
        ])
        .map_err(|err| anyhow!(err.display_message()))?;

        let Err(err) = handle_command(&h.deps, &settings).await else {
            return Err(anyhow!("remote failure should be fatal"));
        };
        assert_eq!(err.exit_code(), 3);
        assert!(err.display_message().contains("already exists"));
        assert_eq!(h.server.commands(), vec!["add-host", "discard", "logout"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_session_data_is_a_validation_error() -> Result<()> {
        if std::env::var_os("CPMGMT_SESSION_DATA").is_some() {
            return Ok(());
        }
        let h = harness();
        let settings =
            settings(&["show-hosts"]).map_err(|err| anyhow!(err.display_message()))?;

        let Err(err) = handle_command(&h.deps, &settings).await else {
            return Err(anyhow!("session data should be required"));
        };
        assert_eq!(err.exit_code(), 2);
        assert!(h.server.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn explicit_fingerprint_overrides_session_token() -> Result<()> {
        let h = harness();
        let session = echoed_session_data();
        let settings = settings(&[
            "show-hosts",
            "--session-data",
            &session,
            "--fingerprint",
            FOREIGN_FINGERPRINT,
        ])
        .map_err(|err| anyhow!(err.display_message()))?;

        let Err(err) = handle_command(&h.deps, &settings).await else {
            return Err(anyhow!("foreign fingerprint should not be trusted"));
        };
        assert_eq!(err.exit_code(), 3);
        assert!(h.server.commands().is_empty());
        Ok(())
    }
}
