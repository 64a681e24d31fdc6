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
#![allow(clippy::redundant_pub_crate)]

//! Command-line surface for driving a management server's Web API.
//!
//! Layout:
//! - `cli.rs`: argument parsing, settings resolution, and command dispatch
//! - `commands/`: `login` and generic command handlers
//! - `client.rs`: dependencies, errors, and telemetry helpers
//! - `output.rs`: result rendering
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod output;

pub use cli::run;
