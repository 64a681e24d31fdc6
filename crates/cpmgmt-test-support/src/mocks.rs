//! Scripted in-memory management server.
//!
//! A [`MockServer`] hands out [`MockConnector`]s; every client they create
//! shares the server's script and appends to the same ordered call log.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cpmgmt_core::{
    CommandResult, ConnectionTarget, Connector, Fingerprint, LoginReply, LoginRequest,
    ManagementApi, SessionAuth, TransportError,
};
use serde_json::{Value, json};

/// One interaction observed by the mock server.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// A client was created for `target`.
    Connect {
        /// Target the connector was asked for.
        target: ConnectionTarget,
    },
    /// The live fingerprint was requested.
    ServerFingerprint,
    /// `login` was called.
    Login {
        /// Fingerprint the login channel was pinned to.
        pinned: Fingerprint,
        /// Administrator name.
        user: String,
        /// Requested domain.
        domain: Option<String>,
        /// Requested session timeout.
        session_timeout: u64,
    },
    /// A command was sent inside a session.
    ApiCall {
        /// Command name.
        command: String,
        /// Payload sent.
        payload: Value,
        /// Session identifier presented.
        session_id: String,
        /// Fingerprint the channel was pinned to.
        pinned: Fingerprint,
    },
}

enum Scripted {
    Reply(CommandResult),
    TransportFailure,
}

struct ServerState {
    fingerprint: Fingerprint,
    login: LoginReply,
    responses: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<RecordedCall>,
}

/// Shared script and call log for mock clients.
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    /// Server presenting `fingerprint` and accepting any login with
    /// session id `mock-sid`.
    #[must_use]
    pub fn new(fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                fingerprint: fingerprint.into(),
                login: LoginReply {
                    success: true,
                    sid: Some("mock-sid".to_string()),
                    error_message: None,
                },
                responses: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Connector whose clients talk to this server.
    #[must_use]
    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(MockConnector {
            server: self.clone(),
        })
    }

    /// Change the fingerprint presented from now on.
    pub fn present_fingerprint(&self, fingerprint: impl Into<Fingerprint>) {
        self.lock().fingerprint = fingerprint.into();
    }

    /// Accept logins, issuing `sid`.
    pub fn accept_login(&self, sid: &str) {
        self.lock().login = LoginReply {
            success: true,
            sid: Some(sid.to_string()),
            error_message: None,
        };
    }

    /// Reject logins with `message`.
    pub fn reject_login(&self, message: &str) {
        self.lock().login = LoginReply {
            success: false,
            sid: None,
            error_message: Some(message.to_string()),
        };
    }

    /// Queue `result` for the next call of `command`. Unscripted commands
    /// succeed with `{"command": <name>}`.
    pub fn respond(&self, command: &str, result: CommandResult) {
        self.queue(command, Scripted::Reply(result));
    }

    /// Make the next call of `command` fail at the transport level.
    pub fn fail_transport(&self, command: &str) {
        self.queue(command, Scripted::TransportFailure);
    }

    /// Every recorded interaction, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Names of the commands sent inside sessions, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::ApiCall { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times `command` was sent.
    #[must_use]
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|name| *name == command).count()
    }

    /// Whether a login call reached the server.
    #[must_use]
    pub fn login_attempted(&self) -> bool {
        self.lock()
            .calls
            .iter()
            .any(|call| matches!(call, RecordedCall::Login { .. }))
    }

    fn queue(&self, command: &str, scripted: Scripted) {
        self.lock()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(scripted);
    }

    fn record(&self, call: RecordedCall) {
        self.lock().calls.push(call);
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Connector`] handing out [`MockManagementApi`] clients.
pub struct MockConnector {
    server: MockServer,
}

impl Connector for MockConnector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn ManagementApi>, TransportError> {
        self.server.record(RecordedCall::Connect {
            target: target.clone(),
        });
        Ok(Box::new(MockManagementApi {
            server: self.server.clone(),
            endpoint: target.authority(),
        }))
    }
}

/// Client bound to a [`MockServer`].
pub struct MockManagementApi {
    server: MockServer,
    endpoint: String,
}

#[async_trait]
impl ManagementApi for MockManagementApi {
    async fn server_fingerprint(&self) -> Result<Fingerprint, TransportError> {
        self.server.record(RecordedCall::ServerFingerprint);
        Ok(self.server.lock().fingerprint.clone())
    }

    async fn login(
        &self,
        pinned: &Fingerprint,
        request: &LoginRequest,
    ) -> Result<LoginReply, TransportError> {
        self.server.record(RecordedCall::Login {
            pinned: pinned.clone(),
            user: request.user.clone(),
            domain: request.domain.clone(),
            session_timeout: request.session_timeout,
        });
        Ok(self.server.lock().login.clone())
    }

    async fn api_call(
        &self,
        auth: &SessionAuth,
        command: &str,
        payload: &Value,
    ) -> Result<CommandResult, TransportError> {
        self.server.record(RecordedCall::ApiCall {
            command: command.to_string(),
            payload: payload.clone(),
            session_id: auth.session_id.clone(),
            pinned: auth.fingerprint.clone(),
        });
        let scripted = self
            .server
            .lock()
            .responses
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted::Reply(result)) => Ok(result),
            Some(Scripted::TransportFailure) => Err(TransportError::Request {
                endpoint: self.endpoint.clone(),
                message: "connection reset by mock".to_string(),
            }),
            None => Ok(CommandResult::ok(json!({ "command": command }))),
        }
    }
}
