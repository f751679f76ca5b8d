//! TreeMirror Remote - Remote object store adapters
//!
//! Implementations of the `IRemoteBackend` port:
//! - Driving an external object-store CLI (one process per operation)
//! - A simulated backend for load testing without touching any account
//!
//! ## Modules
//!
//! - [`cli`] - [`CliBackend`], spawns the configured CLI program
//! - [`simulated`] - [`SimulatedBackend`], sleeps and returns a dummy id

pub mod cli;
pub mod simulated;

pub use cli::CliBackend;
pub use simulated::SimulatedBackend;

use thiserror::Error;

/// Errors raised by the remote adapters
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The CLI program could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI program exited unsuccessfully
    #[error("{program} exited with {status}: {output}")]
    CommandFailed {
        program: String,
        status: String,
        output: String,
    },

    /// The CLI program succeeded but printed no object id
    #[error("{program} returned an empty object id")]
    EmptyId { program: String },

    /// The local path has no file name or no parent directory
    #[error("Invalid local path: {0}")]
    InvalidPath(String),
}
