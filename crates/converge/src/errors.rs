//! Error types for the convergence run.
//!
//! [`ProvisioningError`] covers conditions that abort the whole run: missing
//! tooling, failed local commands, and unwritable artifacts. They are raised
//! during preflight and local bootstrap only, so an aborted run never leaves
//! the remote control plane half-provisioned.
//!
//! [`GatewayRequestError`] covers failures of a single admin or proxy request.
//! It is never propagated past a step boundary; the pipeline converts it into
//! a soft-failure step result and keeps going.

use thiserror::Error;

/// A condition severe enough to abort the entire run with exit code 1.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// A required external tool could not be found on the search path.
    ///
    /// Raised during preflight, before any resource is touched.
    #[error("required tool '{tool}' is not installed")]
    MissingTool {
        /// Name of the missing binary (e.g. `"docker"`).
        tool: String,
    },

    /// An external command exited non-zero or could not be spawned.
    #[error("command `{command}` failed: {detail}")]
    CommandFailed {
        /// The command line that was attempted.
        command: String,
        /// Captured stderr, or the spawn error.
        detail: String,
    },

    /// A local artifact could not be written.
    #[error("failed to write artifact '{path}'")]
    ArtifactWrite {
        /// Path of the artifact, relative to the artifact root.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A local artifact could not be read.
    #[error("failed to read artifact '{path}'")]
    ArtifactRead {
        /// Path of the artifact, relative to the artifact root.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The run configuration is invalid.
    ///
    /// Produced at startup; a run never begins with an invalid configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

/// A failed request against the gateway's admin API or proxy listener.
///
/// One request, one error: there is no internal retry. Callers decide whether
/// the failure is recoverable; the standard steps always treat it as a
/// soft failure.
#[derive(Debug, Error)]
pub enum GatewayRequestError {
    /// The gateway answered with a status outside the accepted set
    /// (200 for reads, 201 for creates, 409 as already-exists).
    #[error("gateway returned status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code of the response.
        status: u16,
        /// Bounded excerpt of the response body.
        body: String,
    },

    /// The request never produced a response (connection refused, timeout,
    /// malformed body).
    #[error("gateway request failed: {reason}")]
    Transport {
        /// Human-readable description of the transport problem.
        reason: String,
    },
}
