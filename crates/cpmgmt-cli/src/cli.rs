//! Argument parsing, settings resolution, and invocation dispatch.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use cpmgmt_core::{DEFAULT_API_CONTEXT, Fingerprint, Outcome, RunMode};
use cpmgmt_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{CliDependencies, CliError, CliResult, TelemetryEmitter};
use crate::commands::{handle_command, handle_login};
use crate::output::render_outcome;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FINGERPRINT_STORE: &str = "fingerprints.json";
const LOGIN_COMMAND: &str = "login";

/// Parses CLI arguments, runs the invocation, and reports the outcome.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.unwrap_or_else(LogFormat::infer),
        build_sha: build_sha(),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }

    let command_name = cli.command.clone();
    let trace_id = Uuid::new_v4().to_string();
    let telemetry = TelemetryEmitter::from_env();

    let result = execute(cli, &trace_id).await;

    let (exit_code, message, outcome) = match result {
        Ok(rendered) => {
            println!("{rendered}");
            (0, None, "success")
        }
        Err(err) => {
            let exit_code = err.exit_code();
            let message = err.display_message();
            eprintln!("error: {message}");
            (exit_code, Some(message), "error")
        }
    };

    if let Some(emitter) = &telemetry {
        emitter
            .emit(
                &trace_id,
                &command_name,
                outcome,
                exit_code,
                message.as_deref(),
            )
            .await;
    }

    exit_code
}

async fn execute(cli: Cli, trace_id: &str) -> CliResult<String> {
    let settings = Settings::from_cli(cli)?;
    let deps = CliDependencies::from_settings(&settings, trace_id);
    let outcome = dispatch(&settings, &deps).await?;
    render_outcome(&outcome, settings.output)
}

async fn dispatch(settings: &Settings, deps: &CliDependencies) -> CliResult<Outcome> {
    debug!(command = %settings.command, mode = ?settings.mode, "dispatching invocation");
    if settings.command == LOGIN_COMMAND {
        handle_login(deps, settings).await
    } else {
        info!(command = %settings.command, "running management command");
        handle_command(deps, settings).await
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cpmgmt",
    about = "Run one management Web API command inside a fingerprint-pinned session"
)]
pub(crate) struct Cli {
    /// Web API command to run; `login` opens a new session.
    command: String,
    /// Command payload as JSON (single-quoted literals are accepted).
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,
    /// Read the command payload from a file.
    #[arg(long)]
    payload_file: Option<PathBuf>,
    /// Session data returned by a previous `login`.
    #[arg(long, env = "CPMGMT_SESSION_DATA")]
    session_data: Option<String>,
    /// Read session data from a file written by `login --save-session`;
    /// takes precedence over `--session-data`.
    #[arg(long)]
    session_file: Option<PathBuf>,
    /// Fingerprint to trust for the management server.
    #[arg(long)]
    fingerprint: Option<String>,
    /// Web API context path.
    #[arg(long, default_value = DEFAULT_API_CONTEXT)]
    context: String,
    /// Web API version, e.g. `1.8`.
    #[arg(long)]
    api_version: Option<String>,
    /// Validate instead of committing changes.
    #[arg(long)]
    check: bool,
    /// With `login`, also write the session data to this file.
    #[arg(long)]
    save_session: Option<PathBuf>,
    #[arg(
        long,
        env = "CPMGMT_FINGERPRINT_STORE",
        default_value = DEFAULT_FINGERPRINT_STORE
    )]
    fingerprint_store: PathBuf,
    /// Per-request timeout in seconds.
    #[arg(long, env = "CPMGMT_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    #[arg(long, env = "CPMGMT_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(long, env = "CPMGMT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
    #[arg(
        long = "output",
        alias = "format",
        value_enum,
        default_value_t = OutputFormat::Json,
        help = "Select how the invocation result is written to stdout"
    )]
    output: OutputFormat,
}

/// Output format for the invocation result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Json,
    Pretty,
}

/// Resolved, immutable invocation settings.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) command: String,
    pub(crate) payload: Option<String>,
    pub(crate) session_data: Option<String>,
    pub(crate) fingerprint: Option<Fingerprint>,
    pub(crate) api_context: String,
    pub(crate) api_version: Option<String>,
    pub(crate) mode: RunMode,
    pub(crate) save_session: Option<PathBuf>,
    pub(crate) fingerprint_store: PathBuf,
    pub(crate) timeout: Duration,
    pub(crate) output: OutputFormat,
}

impl Settings {
    /// Resolve file-backed inputs and freeze the parsed arguments.
    pub(crate) fn from_cli(cli: Cli) -> CliResult<Self> {
        let command = cli.command.trim().to_string();
        if command.is_empty() {
            return Err(CliError::validation("command name cannot be empty"));
        }
        if cli.save_session.is_some() && command != LOGIN_COMMAND {
            return Err(CliError::validation(
                "--save-session is only valid with the login command",
            ));
        }

        let payload = match cli.payload_file {
            Some(path) => Some(read_input(&path, "payload")?),
            None => cli.payload,
        };
        let session_data = match cli.session_file {
            Some(path) => Some(read_input(&path, "session data")?),
            None => cli.session_data,
        };
        let fingerprint = cli
            .fingerprint
            .map(Fingerprint::new)
            .filter(|fingerprint| !fingerprint.is_blank());
        let api_version = cli
            .api_version
            .map(|version| version.trim().to_string())
            .filter(|version| !version.is_empty());

        Ok(Self {
            command,
            payload,
            session_data,
            fingerprint,
            api_context: cli.context,
            api_version,
            mode: RunMode::from_check_flag(cli.check),
            save_session: cli.save_session,
            fingerprint_store: cli.fingerprint_store,
            timeout: Duration::from_secs(cli.timeout),
            output: cli.output,
        })
    }
}

fn read_input(path: &Path, what: &str) -> CliResult<String> {
    fs::read_to_string(path).map_err(|err| {
        CliError::validation(format!(
            "failed to read {what} from {}: {err}",
            path.display()
        ))
    })
}

/// Parse arguments without touching the process environment's argv.
#[cfg(test)]
pub(crate) fn parse_args<I, T>(args: I) -> CliResult<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| CliError::failure(anyhow::anyhow!(err.to_string())))
}
