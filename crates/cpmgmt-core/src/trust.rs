//! Trust-on-first-use server verification.
//!
//! # Design
//! - [`TrustVerifier::verify`] is the single trust decision point. Every
//!   login and every command passes through it, including calls on a
//!   resumed session; nothing is cached in memory between invocations.
//! - A supplied fingerprint is persisted before it is compared, so trust
//!   extended by a caller survives even when this particular check fails.
//! - The only way to obtain a [`TrustedConnection`] is a successful check,
//!   and every remote call after that point is pinned to the verified
//!   fingerprint.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::api::{
    CommandResult, ConnectionTarget, LoginReply, LoginRequest, ManagementApi, SessionAuth,
};
use crate::error::{SessionError, SessionResult};
use crate::fingerprint::Fingerprint;
use crate::store::FingerprintStore;

/// Reconciles a candidate fingerprint with the one the server presents.
#[derive(Clone)]
pub struct TrustVerifier {
    store: Arc<dyn FingerprintStore>,
}

impl TrustVerifier {
    /// Verifier backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// Establish trust in the server behind `api`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingFingerprint`] when nothing is supplied and
    ///   nothing is stored for the host.
    /// - [`SessionError::UntrustedServer`] when the live fingerprint differs
    ///   from the candidate.
    /// - [`SessionError::Store`] / [`SessionError::Transport`] when a
    ///   collaborator fails.
    pub async fn verify(
        &self,
        api: Box<dyn ManagementApi>,
        target: &ConnectionTarget,
        supplied: Option<&Fingerprint>,
    ) -> SessionResult<TrustedConnection> {
        let host = target.host.as_str();
        let candidate = match supplied.filter(|fingerprint| !fingerprint.is_blank()) {
            Some(fingerprint) => {
                self.store.save(host, fingerprint)?;
                info!(host, "trusting supplied fingerprint");
                fingerprint.clone()
            }
            None => self
                .store
                .load(host)?
                .ok_or_else(|| SessionError::MissingFingerprint {
                    host: host.to_string(),
                })?,
        };

        let live = api
            .server_fingerprint()
            .await
            .map_err(|source| SessionError::transport("server_fingerprint", source))?;

        if live != candidate {
            warn!(host, live = %live, "server fingerprint does not match trusted fingerprint");
            return Err(SessionError::UntrustedServer {
                host: host.to_string(),
                live,
            });
        }

        info!(host, "server fingerprint verified");
        Ok(TrustedConnection {
            api,
            target: target.clone(),
            fingerprint: live,
        })
    }
}

/// A connection whose server identity has been verified in this invocation.
pub struct TrustedConnection {
    api: Box<dyn ManagementApi>,
    target: ConnectionTarget,
    fingerprint: Fingerprint,
}

impl TrustedConnection {
    /// Endpoint this connection talks to.
    #[must_use]
    pub const fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Fingerprint the server presented during verification.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Session authentication for `session_id`, pinned to this connection.
    #[must_use]
    pub fn auth(&self, session_id: &str) -> SessionAuth {
        SessionAuth {
            session_id: session_id.to_string(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Log in over the pinned channel.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the call cannot complete.
    pub async fn login(&self, request: &LoginRequest) -> SessionResult<LoginReply> {
        self.api
            .login(&self.fingerprint, request)
            .await
            .map_err(|source| SessionError::transport("login", source))
    }

    /// Run `command` inside the session `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the call cannot complete.
    /// A server-side failure is reported through [`CommandResult::success`].
    pub async fn call(
        &self,
        session_id: &str,
        command: &str,
        payload: &Value,
    ) -> SessionResult<CommandResult> {
        self.api
            .api_call(&self.auth(session_id), command, payload)
            .await
            .map_err(|source| SessionError::transport("api_call", source))
    }
}
