//! Per-command dry-run eligibility and change classification.

use serde_json::{Map, Value, json};

use crate::error::{SessionError, SessionResult};

/// Commands whose effect is immediate and cannot be simulated.
pub const IMMEDIATE_EFFECT_COMMANDS: [&str; 4] =
    ["publish", "run-script", "install-policy", "add-domain"];

/// Leading command verbs that mutate server state.
pub const CHANGING_VERBS: [&str; 3] = ["add", "delete", "set"];

/// Read-only stand-in for `install-policy` under dry-run.
pub const VERIFY_POLICY_COMMAND: &str = "verify-policy";

const INSTALL_POLICY_COMMAND: &str = "install-policy";
const PUBLISH_COMMAND: &str = "publish";
const POLICY_PACKAGE_FIELD: &str = "policy-package";

/// Whether an invocation commits its effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Commands run for real.
    #[default]
    Live,
    /// Commands are simulated; nothing is committed.
    DryRun,
}

impl RunMode {
    /// Map a boolean check-mode flag onto a mode.
    #[must_use]
    pub const fn from_check_flag(check: bool) -> Self {
        if check { Self::DryRun } else { Self::Live }
    }

    /// Whether this is the simulated mode.
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// What the dispatcher should do with a command after eligibility checks.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchPlan {
    /// Send `command` with `payload`.
    Run {
        /// Command actually dispatched (may differ from the requested one).
        command: String,
        /// Payload actually dispatched.
        payload: Value,
    },
    /// Do not send anything; discard pending changes and stop.
    Skip {
        /// Whether the skipped command was `publish`.
        publish: bool,
    },
}

/// Whether `command` is in [`IMMEDIATE_EFFECT_COMMANDS`].
#[must_use]
pub fn is_immediate_effect(command: &str) -> bool {
    IMMEDIATE_EFFECT_COMMANDS.contains(&command)
}

/// Decide how `command` is dispatched under `mode`.
///
/// `install-policy` under dry-run becomes `verify-policy` carrying only
/// the `policy-package` field; this is evaluated before the skip rule.
///
/// # Errors
///
/// Returns [`SessionError::InvalidPayload`] when `install-policy` is
/// substituted but the payload names no policy package.
pub fn plan(command: &str, payload: Value, mode: RunMode) -> SessionResult<DispatchPlan> {
    if !mode.is_dry_run() {
        return Ok(DispatchPlan::Run {
            command: command.to_string(),
            payload,
        });
    }

    if command == INSTALL_POLICY_COMMAND {
        let package = payload.get(POLICY_PACKAGE_FIELD).cloned().ok_or_else(|| {
            SessionError::invalid_payload(format!(
                "'{INSTALL_POLICY_COMMAND}' in check mode requires '{POLICY_PACKAGE_FIELD}'"
            ))
        })?;
        let mut substituted = Map::new();
        substituted.insert(POLICY_PACKAGE_FIELD.to_string(), package);
        return Ok(DispatchPlan::Run {
            command: VERIFY_POLICY_COMMAND.to_string(),
            payload: Value::Object(substituted),
        });
    }

    if is_immediate_effect(command) {
        return Ok(DispatchPlan::Skip {
            publish: command == PUBLISH_COMMAND,
        });
    }

    Ok(DispatchPlan::Run {
        command: command.to_string(),
        payload,
    })
}

/// Derive the `changed` flag for a dispatched command.
#[must_use]
pub fn is_change(command: &str, success: bool, mode: RunMode) -> bool {
    success
        && !mode.is_dry_run()
        && command
            .split('-')
            .next()
            .is_some_and(|verb| CHANGING_VERBS.contains(&verb))
}

/// Empty payload sent with bookkeeping calls such as `discard` and `logout`.
#[must_use]
pub fn empty_payload() -> Value {
    json!({})
}
