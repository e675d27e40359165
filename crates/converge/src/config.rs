//! Run configuration.
//!
//! All environment-derived options are resolved exactly once, at startup,
//! into an immutable [`RunConfiguration`] that is passed by reference into
//! every component. No other module performs ambient environment lookups.

use crate::errors::ProvisioningError;
use crate::identifiers::NetworkName;

/// Environment variable naming the container network.
pub const NETWORK_VAR: &str = "GATEWAY_NETWORK";
/// Environment variable naming the gateway image version.
pub const VERSION_VAR: &str = "GATEWAY_VERSION";
/// Environment variable naming the published dashboard port.
pub const DASHBOARD_PORT_VAR: &str = "GATEWAY_DASHBOARD_PORT";
/// Environment variable naming the operator contact address.
pub const CONTACT_EMAIL_VAR: &str = "GATEWAY_CONTACT_EMAIL";

const DEFAULT_NETWORK: &str = "gateway-net";
const DEFAULT_VERSION: &str = "3.7";
const DEFAULT_DASHBOARD_PORT: &str = "8002";
const DEFAULT_CONTACT_EMAIL: &str = "your-email@example.com";
const DEFAULT_ADMIN_URL: &str = "http://localhost:8001";
const DEFAULT_PROXY_URL: &str = "http://localhost:8000";

/// Immutable options for one convergence run.
///
/// Constructed once via [`RunConfiguration::from_lookup`]; every unset or
/// blank option falls back to its documented default.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Container network the stack attaches to.
    pub network: NetworkName,
    /// Gateway image version pinned in the stack definition.
    pub gateway_version: String,
    /// Host port the dashboard is published on.
    pub dashboard_port: u16,
    /// Operator contact address injected into the generated configuration.
    pub contact_email: String,
    /// Base URL of the admin API.
    pub admin_url: String,
    /// Base URL of the traffic (proxy) listener.
    pub proxy_url: String,
}

impl RunConfiguration {
    /// Resolves the configuration through `lookup` (typically
    /// `std::env::var`). Values are trimmed; blank or missing values take
    /// the default.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProvisioningError> {
        let network_raw = resolve(&lookup, NETWORK_VAR, DEFAULT_NETWORK);
        let network =
            NetworkName::new(network_raw).ok_or_else(|| ProvisioningError::Configuration {
                message: format!("{NETWORK_VAR} must not be empty"),
            })?;

        let port_raw = resolve(&lookup, DASHBOARD_PORT_VAR, DEFAULT_DASHBOARD_PORT);
        let dashboard_port =
            port_raw
                .parse::<u16>()
                .map_err(|_| ProvisioningError::Configuration {
                    message: format!("{DASHBOARD_PORT_VAR} must be a port number, got '{port_raw}'"),
                })?;

        Ok(Self {
            network,
            gateway_version: resolve(&lookup, VERSION_VAR, DEFAULT_VERSION),
            dashboard_port,
            contact_email: resolve(&lookup, CONTACT_EMAIL_VAR, DEFAULT_CONTACT_EMAIL),
            admin_url: DEFAULT_ADMIN_URL.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
        })
    }

    /// URL of the published dashboard, for the closing summary.
    pub fn dashboard_url(&self) -> String {
        format!("http://localhost:{}", self.dashboard_port)
    }
}

fn resolve(lookup: &impl Fn(&str) -> Option<String>, key: &str, fallback: &str) -> String {
    match lookup(key) {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            }
        }
        None => fallback.to_string(),
    }
}
