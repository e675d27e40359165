//! Desired-state declarations: the artifacts a run converges and the
//! content generated for them when absent.

use crate::config::RunConfiguration;
use crate::identifiers::ArtifactPath;
use crate::resource::ResourceSpec;

/// Token embedded in the generated configuration; replaced with the
/// operator-supplied contact address after materialization.
pub const CONTACT_PLACEHOLDER: &str = "your-email@example.com";

/// Path of the gateway configuration document, relative to the artifact root.
pub const GATEWAY_CONFIG_PATH: &str = "gateway.yml";
/// Path of the compose stack definition.
pub const STACK_PATH: &str = "docker-compose.yml";
/// Path of the TLS/credential store.
pub const TLS_STORE_PATH: &str = "tls-store.json";

/// Renders the gateway configuration document.
pub fn gateway_config(cfg: &RunConfiguration) -> String {
    format!(
        r#"admin:
  listen: ":8001"
  dashboard: true

proxy:
  listen: ":8000"

providers:
  docker:
    endpoint: "unix:///var/run/docker.sock"
    exposed_by_default: false
    network: {network}

acme:
  contact: {placeholder}
  storage: /tls-store.json

log:
  level: info
"#,
        network = cfg.network,
        placeholder = CONTACT_PLACEHOLDER,
    )
}

/// Renders the compose stack definition.
pub fn stack_config(cfg: &RunConfiguration) -> String {
    format!(
        r#"services:
  gateway:
    image: ghcr.io/gatewright/edge-gateway:{version}
    container_name: gateway
    restart: unless-stopped
    ports:
      - "8000:8000"
      - "8001:8001"
      - "{dashboard_port}:8002"
    volumes:
      - /var/run/docker.sock:/var/run/docker.sock:ro
      - ./gateway.yml:/gateway.yml:ro
      - ./tls-store.json:/tls-store.json
    networks:
      - {network}

networks:
  {network}:
    external: true
"#,
        version = cfg.gateway_version,
        dashboard_port = cfg.dashboard_port,
        network = cfg.network,
    )
}

/// The full resource list for one run, in convergence order.
pub fn desired_resources(cfg: &RunConfiguration) -> Vec<ResourceSpec> {
    let for_gateway = cfg.clone();
    let for_stack = cfg.clone();
    vec![
        ResourceSpec::Network {
            name: cfg.network.clone(),
        },
        ResourceSpec::ConfigFile {
            path: ArtifactPath::from(GATEWAY_CONFIG_PATH),
            producer: Box::new(move || gateway_config(&for_gateway)),
        },
        ResourceSpec::StackFile {
            path: ArtifactPath::from(STACK_PATH),
            producer: Box::new(move || stack_config(&for_stack)),
        },
        ResourceSpec::SecretFile {
            path: ArtifactPath::from(TLS_STORE_PATH),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn test_config() -> RunConfiguration {
        RunConfiguration::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn gateway_config_embeds_network_and_placeholder() {
        let rendered = gateway_config(&test_config());
        assert!(rendered.contains("network: gateway-net"));
        assert!(rendered.contains(CONTACT_PLACEHOLDER));
    }

    #[test]
    fn stack_config_pins_version_and_references_network() {
        let rendered = stack_config(&test_config());
        assert!(rendered.contains("edge-gateway:3.7"));
        assert!(rendered.contains("\"8002:8002\""));
        assert!(rendered.contains("external: true"));
    }

    #[test]
    fn resource_list_covers_every_kind_in_order() {
        let kinds: Vec<ResourceKind> = desired_resources(&test_config())
            .iter()
            .map(|spec| spec.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Network,
                ResourceKind::ConfigFile,
                ResourceKind::StackFile,
                ResourceKind::SecretFile,
            ]
        );
    }
}
