#![forbid(unsafe_code)]
#![deny(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Trust-and-session layer for driving a management server's Web API.
//!
//! Layout:
//! - `fingerprint.rs`: normalized server identity fingerprints
//! - `store.rs`: persisted per-host trusted fingerprints
//! - `trust.rs`: trust-on-first-use verification against the live server
//! - `token.rs`: session token codec and server URL decomposition
//! - `payload.rs`: textual payload normalization ahead of JSON parsing
//! - `api.rs`: transport collaborator traits and wire shapes
//! - `policy.rs`: per-command dry-run eligibility and change classification
//! - `dispatch.rs`: login and command state machine
//! - `unwind.rs`: discard/logout cleanup on fatal conditions
//! - `error.rs`: error taxonomy

pub mod api;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod payload;
pub mod policy;
pub mod store;
pub mod token;
pub mod trust;
pub mod unwind;

pub use api::{
    CommandResult, ConnectionTarget, Connector, DEFAULT_SESSION_TIMEOUT_SECS, LoginReply,
    LoginRequest, ManagementApi, SessionAuth,
};
pub use dispatch::{CommandDispatcher, CommandInvocation, LoginInvocation, Outcome};
pub use error::{SessionError, SessionResult, StoreError, TransportError};
pub use fingerprint::Fingerprint;
pub use payload::{normalize_payload, parse_payload};
pub use policy::{DispatchPlan, RunMode};
pub use store::{FileFingerprintStore, FingerprintStore, MemoryFingerprintStore};
pub use token::{DEFAULT_API_CONTEXT, DEFAULT_PORT, ServerAddress, SessionToken};
pub use trust::{TrustVerifier, TrustedConnection};
pub use unwind::FailureUnwinder;
