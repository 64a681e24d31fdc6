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

//! HTTPS Web API transport for the management server.
//!
//! Layout:
//! - `tls.rs`: certificate fingerprints, the pinning verifier, handshake probe
//! - `client.rs`: `WebApiConnector` / `WebApiClient` over reqwest

pub mod client;
pub mod tls;

pub use client::{ClientOptions, WebApiClient, WebApiConnector};
pub use tls::{FingerprintVerifier, certificate_fingerprint, handshake, probe_fingerprint};
