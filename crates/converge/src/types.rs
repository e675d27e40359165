//! Shared value types for the convergence domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values: the gateway resource descriptors sent to the control
//! plane, the responses read back from it, and the timestamp wrapper used in
//! run reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PluginName, RouteName, ServiceName};

// ---------------------------------------------------------------------------
// Server-assigned identity
// ---------------------------------------------------------------------------

/// The server-side identity of a gateway resource after a create call.
///
/// The control plane assigns an id and returns it in a 201 response. A 409
/// response means the resource already exists; the call still counts as
/// success, but no fresh id is available. Callers that need the real id must
/// re-query, and the standard steps instead fall back to addressing the
/// resource by its declared name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayId {
    /// Id assigned by the control plane in the creation response.
    Assigned(String),
    /// The resource exists but this run never saw its id.
    Unknown,
}

impl GatewayId {
    /// Returns the assigned id, if this run observed one.
    pub fn assigned(&self) -> Option<&str> {
        match self {
            GatewayId::Assigned(id) => Some(id),
            GatewayId::Unknown => None,
        }
    }
}

impl std::fmt::Display for GatewayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayId::Assigned(id) => write!(f, "{id}"),
            GatewayId::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway resource descriptors
// ---------------------------------------------------------------------------

/// Declares a gateway service: a named upstream the gateway proxies to.
///
/// Required fields are typed; provider-specific options (connect timeouts,
/// TLS verification flags, ...) go through `extra` and are flattened into the
/// request body as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Operator-declared service name; identity from the caller's perspective.
    pub name: ServiceName,
    /// Upstream URL the gateway forwards matched traffic to.
    pub url: String,
    /// Open extension mapping for provider-specific options.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ServiceSpec {
    /// Creates a service descriptor with no extension options.
    pub fn new(name: ServiceName, url: impl Into<String>) -> Self {
        Self {
            name,
            url: url.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Declares a route: the match rules that steer traffic into a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Operator-declared route name.
    pub name: RouteName,
    /// Path prefixes matched by this route.
    pub paths: Vec<String>,
    /// HTTP methods matched by this route; empty means all methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Open extension mapping for provider-specific options.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RouteSpec {
    /// Creates a route descriptor with no extension options.
    pub fn new(name: RouteName, paths: Vec<String>, methods: Vec<String>) -> Self {
        Self {
            name,
            paths,
            methods,
            extra: BTreeMap::new(),
        }
    }
}

/// Declares a plugin instance scoped to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Plugin registry name (e.g. `"rate-limiting"`).
    pub name: PluginName,
    /// Plugin-specific configuration block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    /// Whether the plugin is active once created.
    pub enabled: bool,
    /// Open extension mapping for provider-specific options.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PluginSpec {
    /// Creates an enabled plugin descriptor from a configuration block.
    pub fn enabled(name: PluginName, config: BTreeMap<String, Value>) -> Self {
        Self {
            name,
            config,
            enabled: true,
            extra: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Control-plane responses
// ---------------------------------------------------------------------------

/// Health summary returned by the control plane's status endpoint.
///
/// The interesting fields are provider-defined structures; they are carried
/// opaquely and logged for the operator rather than interpreted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayStatus {
    /// Datastore health block, when the gateway reports one.
    #[serde(default)]
    pub database: Option<Value>,
    /// Server/connection statistics block, when the gateway reports one.
    #[serde(default)]
    pub server: Option<Value>,
}

/// One entry of the service listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    /// Declared service name.
    pub name: String,
    /// Upstream host, when the gateway reports one.
    #[serde(default)]
    pub host: Option<String>,
}

/// The observable outcome of one request through the gateway's traffic path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    /// HTTP status code of the proxied response.
    pub status: u16,
    /// Bounded excerpt of the response body; never the full payload.
    pub body_excerpt: String,
    /// Value of the rate-limit remaining header, when present.
    pub rate_limit_remaining: Option<String>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
