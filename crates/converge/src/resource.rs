//! Check-before-create convergence for local prerequisites.
//!
//! Each declared resource is queried fresh on every run; nothing is cached
//! between runs. A resource that already exists is left exactly as found:
//! presence alone is sufficient, and existing content is never diffed or
//! regenerated, so operator edits survive later runs.

use std::fmt;

use crate::errors::ProvisioningError;
use crate::identifiers::{ArtifactPath, NetworkName};
use crate::ports::{ArtifactStore, CommandRunner};

/// Lazily renders the desired content of a file resource.
///
/// Only invoked when the resource is absent and about to be created.
pub type ContentProducer = Box<dyn Fn() -> String + Send + Sync>;

/// The kinds of local resource a run converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A container network, queried and created through the container CLI.
    Network,
    /// The gateway configuration document.
    ConfigFile,
    /// An owner-only credential/TLS store file, created empty.
    SecretFile,
    /// The compose stack definition.
    StackFile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Network => "network",
            ResourceKind::ConfigFile => "config file",
            ResourceKind::SecretFile => "secret file",
            ResourceKind::StackFile => "stack file",
        };
        write!(f, "{label}")
    }
}

/// One declared external resource and how to materialize it when absent.
pub enum ResourceSpec {
    /// A container network known to the container runtime.
    Network {
        /// Network name, used for both the inspect query and the create call.
        name: NetworkName,
    },
    /// A generated configuration document.
    ConfigFile {
        /// Artifact path relative to the artifact root.
        path: ArtifactPath,
        /// Renders the desired content; invoked only on creation.
        producer: ContentProducer,
    },
    /// A secret file created empty with owner-only access.
    SecretFile {
        /// Artifact path relative to the artifact root.
        path: ArtifactPath,
    },
    /// A generated stack definition.
    StackFile {
        /// Artifact path relative to the artifact root.
        path: ArtifactPath,
        /// Renders the desired content; invoked only on creation.
        producer: ContentProducer,
    },
}

impl ResourceSpec {
    /// The kind tag, for logging and reports.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network { .. } => ResourceKind::Network,
            ResourceSpec::ConfigFile { .. } => ResourceKind::ConfigFile,
            ResourceSpec::SecretFile { .. } => ResourceKind::SecretFile,
            ResourceSpec::StackFile { .. } => ResourceKind::StackFile,
        }
    }

    /// The resource's name or path, for logging and reports.
    pub fn target(&self) -> &str {
        match self {
            ResourceSpec::Network { name } => name.as_str(),
            ResourceSpec::ConfigFile { path, .. }
            | ResourceSpec::SecretFile { path }
            | ResourceSpec::StackFile { path, .. } => path.as_str(),
        }
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("kind", &self.kind())
            .field("target", &self.target())
            .finish()
    }
}

/// How `ensure` left a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Converged {
    /// The existence check found the resource; nothing was mutated.
    AlreadyPresent,
    /// The resource was absent and has been created.
    Created,
}

/// What `inject_contact` did to the configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// The placeholder was present and has been replaced.
    Applied,
    /// The placeholder was absent (or the file unreadable); content untouched.
    NotNeeded,
}

/// Converges declared resources against observed external state.
pub struct ResourceConvergence<'a> {
    commands: &'a dyn CommandRunner,
    store: &'a dyn ArtifactStore,
}

impl<'a> ResourceConvergence<'a> {
    pub fn new(commands: &'a dyn CommandRunner, store: &'a dyn ArtifactStore) -> Self {
        Self { commands, store }
    }

    /// Brings one resource to its desired state.
    ///
    /// Fails only if creation is attempted and the underlying call fails;
    /// absence itself is never an error, it is what triggers creation.
    pub async fn ensure(&self, spec: &ResourceSpec) -> Result<Converged, ProvisioningError> {
        let converged = match spec {
            ResourceSpec::Network { name } => {
                if self
                    .commands
                    .succeeds("docker", &["network", "inspect", name.as_str()])
                    .await
                {
                    Converged::AlreadyPresent
                } else {
                    self.commands
                        .run("docker", &["network", "create", name.as_str()])
                        .await?;
                    Converged::Created
                }
            }
            ResourceSpec::ConfigFile { path, producer }
            | ResourceSpec::StackFile { path, producer } => {
                if self.store.exists(path).await {
                    Converged::AlreadyPresent
                } else {
                    self.store.write(path, &producer()).await?;
                    Converged::Created
                }
            }
            ResourceSpec::SecretFile { path } => {
                if self.store.exists(path).await {
                    Converged::AlreadyPresent
                } else {
                    // Created empty; the gateway populates it at runtime.
                    self.store.write_secret(path, "").await?;
                    Converged::Created
                }
            }
        };

        match converged {
            Converged::AlreadyPresent => {
                tracing::info!(kind = %spec.kind(), target = spec.target(), "resource already present");
            }
            Converged::Created => {
                tracing::info!(kind = %spec.kind(), target = spec.target(), "resource created");
            }
        }
        Ok(converged)
    }
}

/// Replaces `placeholder` in the artifact at `path` with `replacement`.
///
/// A no-op when the file cannot be read or no longer contains the
/// placeholder: an operator who edited the value out keeps their edit.
/// Only a failed write is an error.
pub async fn inject_placeholder(
    store: &dyn ArtifactStore,
    path: &ArtifactPath,
    placeholder: &str,
    replacement: &str,
) -> Result<Injection, ProvisioningError> {
    let content = match store.read(path).await {
        Ok(content) => content,
        Err(_) => return Ok(Injection::NotNeeded),
    };
    if !content.contains(placeholder) {
        tracing::debug!(path = path.as_str(), "placeholder absent; nothing to inject");
        return Ok(Injection::NotNeeded);
    }
    let updated = content.replace(placeholder, replacement);
    store.write(path, &updated).await?;
    tracing::info!(path = path.as_str(), "replaced placeholder value");
    Ok(Injection::Applied)
}
