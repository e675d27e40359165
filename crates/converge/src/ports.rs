//! Port trait definitions.
//!
//! The domain sees external systems only through these traits; the
//! infrastructure crates supply the concrete implementations (`host` for
//! process execution and the artifact store, `gateway` for the admin API).
//! [`crate::testing`] provides recording doubles for all three.

use async_trait::async_trait;

use crate::errors::{GatewayRequestError, ProvisioningError};
use crate::identifiers::ArtifactPath;
use crate::types::{
    GatewayId, GatewayStatus, PluginSpec, ProxyResponse, RouteSpec, ServiceSpec, ServiceSummary,
};

/// Executes external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Returns `true` when `tool` resolves on the search path.
    async fn lookup(&self, tool: &str) -> bool;

    /// Runs a command purely as a probe: `true` on zero exit, `false` on any
    /// failure. Used for inspect-style existence checks.
    async fn succeeds(&self, program: &str, args: &[&str]) -> bool;

    /// Runs a command that is expected to succeed, returning captured stdout.
    /// A non-zero exit or spawn failure is a hard failure.
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProvisioningError>;
}

/// Reads and writes local artifacts under the artifact root.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns `true` when the artifact exists as a regular file.
    async fn exists(&self, path: &ArtifactPath) -> bool;

    /// Reads the artifact's full content.
    async fn read(&self, path: &ArtifactPath) -> Result<String, ProvisioningError>;

    /// Writes the artifact with default permissions, replacing any previous
    /// content.
    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), ProvisioningError>;

    /// Writes a secret artifact. Owner-only access must be in force from the
    /// moment the file exists; content must never pass through a
    /// world-readable window.
    async fn write_secret(
        &self,
        path: &ArtifactPath,
        content: &str,
    ) -> Result<(), ProvisioningError>;
}

/// The gateway control plane and its traffic path.
///
/// One operation per resource kind; every call is a single attempt with no
/// internal retry, so each failure surfaces individually to the pipeline's
/// soft-failure handling.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Reads the control plane's health summary.
    async fn status(&self) -> Result<GatewayStatus, GatewayRequestError>;

    /// Creates a service, returning its server-assigned id when the response
    /// carries one.
    async fn create_service(&self, spec: &ServiceSpec)
        -> Result<GatewayId, GatewayRequestError>;

    /// Creates a route under the service addressed by `service_ref`
    /// (server-assigned id, or declared name as fallback).
    async fn create_route(
        &self,
        service_ref: &str,
        spec: &RouteSpec,
    ) -> Result<GatewayId, GatewayRequestError>;

    /// Creates a plugin instance under the service addressed by `service_ref`.
    async fn create_plugin(
        &self,
        service_ref: &str,
        spec: &PluginSpec,
    ) -> Result<GatewayId, GatewayRequestError>;

    /// Lists the services currently known to the control plane.
    async fn list_services(&self) -> Result<Vec<ServiceSummary>, GatewayRequestError>;

    /// Issues a plain GET through the traffic path (not the admin API).
    async fn proxy_get(&self, path: &str) -> Result<ProxyResponse, GatewayRequestError>;
}
