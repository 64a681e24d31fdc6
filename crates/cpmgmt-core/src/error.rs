//! Error types for the trust-and-session layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::policy::IMMEDIATE_EFFECT_COMMANDS;

/// Primary error type surfaced by every invocation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No fingerprint was supplied and none is stored for the host.
    #[error(
        "no trusted fingerprint is known for server '{host}'; supply one via the --fingerprint option"
    )]
    MissingFingerprint {
        /// Host the lookup was made for.
        host: String,
    },
    /// The live server fingerprint differs from the trusted candidate.
    #[error(
        "Cannot operate on an unverified server. Please verify the server's fingerprint: '{live}' and add it via the --fingerprint option."
    )]
    UntrustedServer {
        /// Host that failed verification.
        host: String,
        /// Fingerprint the server actually presented.
        live: Fingerprint,
    },
    /// The textual payload could not be parsed or lacks a required field.
    #[error("payload is invalid: {reason}")]
    InvalidPayload {
        /// Human-readable parse or validation failure.
        reason: String,
    },
    /// A non-login command was invoked without session data.
    #[error(
        "You must specify session-data for commands that are not login (use the command \"login\" to obtain the session data)."
    )]
    MissingSessionData,
    /// Session data was present but not a decodable session token.
    #[error("session-data variable is invalid: {reason}")]
    InvalidSessionData {
        /// Which part of the structure failed to decode.
        reason: String,
    },
    /// The remote API reported `success = false` for a command.
    #[error(
        "Command '{command} {payload}' failed{}. All changes are discarded and the session is invalidated.",
        error_message.as_ref().map(|message| format!(" with error message: {message}")).unwrap_or_default()
    )]
    RemoteCommandFailed {
        /// Command that was dispatched.
        command: String,
        /// Compact JSON rendering of the dispatched payload.
        payload: String,
        /// Error message reported by the server, when present.
        error_message: Option<String>,
    },
    /// An immediate-effect command was requested in dry-run mode.
    #[error("{}", check_mode_message(*publish))]
    CheckModeUnavailable {
        /// Command that was not executed.
        command: String,
        /// Whether the command was `publish`.
        publish: bool,
    },
    /// The login call was rejected by the server.
    #[error("Login failed: {message}")]
    LoginFailed {
        /// Reason reported by the server.
        message: String,
    },
    /// The transport collaborator failed.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport error.
        source: TransportError,
    },
    /// The fingerprint store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Whether the invocation must terminate with a failing status.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::CheckModeUnavailable { .. })
    }

    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        Self::Transport { operation, source }
    }

    pub(crate) fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}

fn check_mode_message(publish: bool) -> String {
    let tail = if publish {
        "and we've discarded the changes made, you can now run it without check mode."
    } else {
        "and we are skipping this command."
    };
    format!(
        "Can't run the following commands in check mode: [{}]. Know that your script ran fine up to this point {tail}",
        IMMEDIATE_EFFECT_COMMANDS.join(", ")
    )
}

/// Convenience alias for session-layer results.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures raised by a transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying client could not be constructed.
    #[error("failed to build transport client: {message}")]
    Client {
        /// Construction failure detail.
        message: String,
    },
    /// The request could not be completed.
    #[error("request to '{endpoint}' failed: {message}")]
    Request {
        /// Endpoint the request targeted.
        endpoint: String,
        /// Failure detail.
        message: String,
    },
    /// The TLS handshake finished without a server certificate.
    #[error("server at '{endpoint}' presented no certificate")]
    NoCertificate {
        /// Endpoint the handshake targeted.
        endpoint: String,
    },
    /// The response body was not the expected structure.
    #[error("response from '{endpoint}' could not be decoded: {message}")]
    Decode {
        /// Endpoint that produced the response.
        endpoint: String,
        /// Decode failure detail.
        message: String,
    },
}

/// Failures raised by fingerprint stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("fingerprint store '{}' could not be accessed: {source}", path.display())]
    Io {
        /// Store location.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The backing file is not a host-to-fingerprint mapping.
    #[error("fingerprint store '{}' is malformed: {source}", path.display())]
    Malformed {
        /// Store location.
        path: PathBuf,
        /// Source parse error.
        source: serde_json::Error,
    },
    /// An in-memory store lock was poisoned by a panicking writer.
    #[error("fingerprint store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrusted_server_message_names_live_fingerprint() {
        let err = SessionError::UntrustedServer {
            host: "10.0.0.1".into(),
            live: Fingerprint::new("AA:BB:CC"),
        };
        assert!(err.to_string().contains("'AA:BB:CC'"));
        assert!(err.is_fatal());
    }

    #[test]
    fn check_mode_messages_differ_for_publish() {
        let publish = SessionError::CheckModeUnavailable {
            command: "publish".into(),
            publish: true,
        };
        let skipped = SessionError::CheckModeUnavailable {
            command: "run-script".into(),
            publish: false,
        };
        assert!(publish.to_string().contains("run it without check mode"));
        assert!(skipped.to_string().contains("skipping this command"));
        assert!(!publish.is_fatal());
        assert!(!skipped.is_fatal());
    }

    #[test]
    fn remote_failure_message_includes_server_reason() {
        let err = SessionError::RemoteCommandFailed {
            command: "add-host".into(),
            payload: r#"{"name":"h"}"#.into(),
            error_message: Some("Validation failed".into()),
        };
        let text = err.to_string();
        assert!(text.starts_with("Command 'add-host {\"name\":\"h\"}' failed with error message: Validation failed."));

        let bare = SessionError::RemoteCommandFailed {
            command: "add-host".into(),
            payload: "{}".into(),
            error_message: None,
        };
        assert!(bare.to_string().starts_with("Command 'add-host {}' failed. All changes"));
    }
}
