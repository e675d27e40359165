//! The standard provisioning steps driven against the gateway's admin API.
//!
//! Every step folds [`GatewayRequestError`] into a soft failure at its own
//! boundary, so one step's failure can never corrupt the execution of
//! unrelated later steps. A 409 from the control plane is already folded
//! into success (without a fresh id) by the client.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::identifiers::{PluginName, RouteName, ServiceName, StepName};
use crate::ports::GatewayApi;
use crate::step::{PipelineContext, PipelineStep, StepResult};
use crate::types::{GatewayId, PluginSpec, RouteSpec, ServiceSpec};

/// Step name: control-plane health check.
pub const STATUS_STEP: &str = "gateway-status";
/// Step name: service creation.
pub const CREATE_SERVICE_STEP: &str = "create-service";
/// Step name: route creation.
pub const CREATE_ROUTE_STEP: &str = "create-route";
/// Step name: one request through the traffic path.
pub const PROXY_SMOKE_STEP: &str = "proxy-smoke";
/// Step name: rate-limiting plugin creation.
pub const RATE_LIMIT_STEP: &str = "enable-rate-limit";
/// Step name: service listing.
pub const LIST_SERVICES_STEP: &str = "list-services";

/// Resolves the reference later admin calls use to address a service: the
/// server-assigned id when an earlier step recorded one, the declared name
/// otherwise (409 creations never yield a fresh id).
fn service_ref(ctx: &PipelineContext, producer: &StepName, fallback: &ServiceName) -> String {
    match ctx.identifier(producer) {
        Some(GatewayId::Assigned(id)) => id.clone(),
        _ => fallback.as_str().to_string(),
    }
}

/// Checks that the control plane is up and logs its health blocks.
pub struct StatusStep {
    gateway: Arc<dyn GatewayApi>,
}

#[async_trait]
impl PipelineStep for StatusStep {
    fn name(&self) -> StepName {
        StepName::from(STATUS_STEP)
    }

    async fn execute(&self, _ctx: &PipelineContext) -> StepResult {
        match self.gateway.status().await {
            Ok(status) => {
                tracing::info!(
                    database = ?status.database,
                    server = ?status.server,
                    "control plane is up"
                );
                StepResult::success(self.name())
            }
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// Creates the declared service and records its server-assigned id.
pub struct CreateServiceStep {
    gateway: Arc<dyn GatewayApi>,
    spec: ServiceSpec,
}

#[async_trait]
impl PipelineStep for CreateServiceStep {
    fn name(&self) -> StepName {
        StepName::from(CREATE_SERVICE_STEP)
    }

    async fn execute(&self, _ctx: &PipelineContext) -> StepResult {
        match self.gateway.create_service(&self.spec).await {
            Ok(id) => {
                tracing::info!(service = %self.spec.name, %id, "service in place");
                StepResult::success_with_id(self.name(), id)
            }
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// Attaches the declared route to the service created earlier.
pub struct CreateRouteStep {
    gateway: Arc<dyn GatewayApi>,
    service: ServiceName,
    spec: RouteSpec,
}

#[async_trait]
impl PipelineStep for CreateRouteStep {
    fn name(&self) -> StepName {
        StepName::from(CREATE_ROUTE_STEP)
    }

    fn depends_on(&self) -> Vec<StepName> {
        vec![StepName::from(CREATE_SERVICE_STEP)]
    }

    async fn execute(&self, ctx: &PipelineContext) -> StepResult {
        let service_ref = service_ref(ctx, &StepName::from(CREATE_SERVICE_STEP), &self.service);
        match self.gateway.create_route(&service_ref, &self.spec).await {
            Ok(id) => {
                tracing::info!(route = %self.spec.name, %id, "route in place");
                StepResult::success_with_id(self.name(), id)
            }
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// Sends one request through the traffic path to confirm the route works.
pub struct ProxySmokeStep {
    gateway: Arc<dyn GatewayApi>,
    path: String,
}

#[async_trait]
impl PipelineStep for ProxySmokeStep {
    fn name(&self) -> StepName {
        StepName::from(PROXY_SMOKE_STEP)
    }

    fn depends_on(&self) -> Vec<StepName> {
        vec![StepName::from(CREATE_ROUTE_STEP)]
    }

    async fn execute(&self, _ctx: &PipelineContext) -> StepResult {
        match self.gateway.proxy_get(&self.path).await {
            Ok(response) if response.status == 200 => {
                tracing::info!(
                    status = response.status,
                    preview = %response.body_excerpt,
                    "traffic path answers"
                );
                StepResult::success(self.name())
            }
            Ok(response) => StepResult::soft_failure(
                self.name(),
                format!("traffic path returned status {}", response.status),
            ),
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// Enables the rate-limiting plugin on the service.
pub struct RateLimitStep {
    gateway: Arc<dyn GatewayApi>,
    service: ServiceName,
    spec: PluginSpec,
}

#[async_trait]
impl PipelineStep for RateLimitStep {
    fn name(&self) -> StepName {
        StepName::from(RATE_LIMIT_STEP)
    }

    fn depends_on(&self) -> Vec<StepName> {
        vec![StepName::from(CREATE_SERVICE_STEP)]
    }

    async fn execute(&self, ctx: &PipelineContext) -> StepResult {
        let service_ref = service_ref(ctx, &StepName::from(CREATE_SERVICE_STEP), &self.service);
        match self.gateway.create_plugin(&service_ref, &self.spec).await {
            Ok(id) => {
                tracing::info!(plugin = %self.spec.name, %id, "plugin in place");
                StepResult::success_with_id(self.name(), id)
            }
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// Lists the services the control plane knows about.
pub struct ListServicesStep {
    gateway: Arc<dyn GatewayApi>,
}

#[async_trait]
impl PipelineStep for ListServicesStep {
    fn name(&self) -> StepName {
        StepName::from(LIST_SERVICES_STEP)
    }

    async fn execute(&self, _ctx: &PipelineContext) -> StepResult {
        match self.gateway.list_services().await {
            Ok(services) => {
                tracing::info!(total = services.len(), "service listing");
                for service in &services {
                    tracing::info!(
                        name = %service.name,
                        host = service.host.as_deref().unwrap_or("-"),
                        "service"
                    );
                }
                StepResult::success(self.name())
            }
            Err(err) => StepResult::soft_failure(self.name(), err.to_string()),
        }
    }
}

/// The upstream the demo service points at.
const UPSTREAM_URL: &str = "http://httpbin.org";
/// Route prefix steered into the demo service.
const ROUTE_PREFIX: &str = "/httpbin";
/// Traffic-path probe target used by the smoke step and verification phase.
pub const PROBE_PATH: &str = "/httpbin/get";
/// Requests allowed per minute by the rate-limiting policy.
pub const RATE_LIMIT_PER_MINUTE: u64 = 5;

/// The standard step sequence, in execution order.
pub fn standard_steps(gateway: Arc<dyn GatewayApi>) -> Vec<Box<dyn PipelineStep>> {
    let service = ServiceName::from("httpbin");
    let mut rate_limit_config = BTreeMap::new();
    rate_limit_config.insert("minute".to_string(), json!(RATE_LIMIT_PER_MINUTE));
    rate_limit_config.insert("policy".to_string(), json!("local"));

    vec![
        Box::new(StatusStep {
            gateway: gateway.clone(),
        }),
        Box::new(CreateServiceStep {
            gateway: gateway.clone(),
            spec: ServiceSpec::new(service.clone(), UPSTREAM_URL),
        }),
        Box::new(CreateRouteStep {
            gateway: gateway.clone(),
            service: service.clone(),
            spec: RouteSpec::new(
                RouteName::from("httpbin-route"),
                vec![ROUTE_PREFIX.to_string()],
                vec!["GET".to_string(), "POST".to_string()],
            ),
        }),
        Box::new(ProxySmokeStep {
            gateway: gateway.clone(),
            path: PROBE_PATH.to_string(),
        }),
        Box::new(RateLimitStep {
            gateway: gateway.clone(),
            service,
            spec: PluginSpec::enabled(PluginName::from("rate-limiting"), rate_limit_config),
        }),
        Box::new(ListServicesStep { gateway }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayRequestError;
    use crate::step::{StepOutcome, StepPipeline};
    use crate::testing::ScriptedGateway;
    use crate::types::ProxyResponse;

    #[tokio::test]
    async fn conflict_create_reports_success_with_unknown_id() {
        // The client folds a 409 into Ok(Unknown); the step must surface
        // that as Success, not as a soft failure.
        let gateway = Arc::new(
            ScriptedGateway::default().script_create_service(Ok(GatewayId::Unknown)),
        );
        let step = CreateServiceStep {
            gateway,
            spec: ServiceSpec::new(ServiceName::from("httpbin"), UPSTREAM_URL),
        };

        let result = step.execute(&PipelineContext::new()).await;
        assert_eq!(result.outcome, StepOutcome::Success);
        assert_eq!(result.identifier, Some(GatewayId::Unknown));
    }

    #[tokio::test]
    async fn route_step_uses_assigned_service_id() {
        let gateway = Arc::new(ScriptedGateway::default());
        let step = CreateRouteStep {
            gateway: gateway.clone(),
            service: ServiceName::from("httpbin"),
            spec: RouteSpec::new(RouteName::from("httpbin-route"), vec!["/httpbin".into()], vec![]),
        };

        let mut ctx = PipelineContext::new();
        ctx.record(StepResult::success_with_id(
            StepName::from(CREATE_SERVICE_STEP),
            GatewayId::Assigned("svc-1".into()),
        ));
        step.execute(&ctx).await;
        assert_eq!(gateway.calls(), vec!["create_route svc-1".to_string()]);
    }

    #[tokio::test]
    async fn route_step_falls_back_to_service_name() {
        let gateway = Arc::new(ScriptedGateway::default());
        let step = CreateRouteStep {
            gateway: gateway.clone(),
            service: ServiceName::from("httpbin"),
            spec: RouteSpec::new(RouteName::from("httpbin-route"), vec!["/httpbin".into()], vec![]),
        };

        let mut ctx = PipelineContext::new();
        ctx.record(StepResult::success_with_id(
            StepName::from(CREATE_SERVICE_STEP),
            GatewayId::Unknown,
        ));
        step.execute(&ctx).await;
        assert_eq!(gateway.calls(), vec!["create_route httpbin".to_string()]);
    }

    #[tokio::test]
    async fn gateway_errors_become_soft_failures() {
        let gateway = Arc::new(ScriptedGateway::default().script_create_service(Err(
            GatewayRequestError::UnexpectedStatus {
                status: 500,
                body: "upstream exploded".into(),
            },
        )));
        let step = CreateServiceStep {
            gateway,
            spec: ServiceSpec::new(ServiceName::from("httpbin"), UPSTREAM_URL),
        };

        let result = step.execute(&PipelineContext::new()).await;
        assert!(matches!(result.outcome, StepOutcome::SoftFailure { .. }));
    }

    #[tokio::test]
    async fn smoke_step_requires_a_200() {
        let gateway = Arc::new(ScriptedGateway::default().script_proxy(Ok(ProxyResponse {
            status: 502,
            body_excerpt: "bad gateway".into(),
            rate_limit_remaining: None,
        })));
        let step = ProxySmokeStep {
            gateway,
            path: PROBE_PATH.to_string(),
        };

        let result = step.execute(&PipelineContext::new()).await;
        assert!(matches!(result.outcome, StepOutcome::SoftFailure { .. }));
    }

    #[tokio::test]
    async fn standard_sequence_provisions_service_route_and_plugin() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .script_create_service(Ok(GatewayId::Assigned("svc-1".into())))
                .script_create_route(Ok(GatewayId::Assigned("rt-1".into())))
                .script_create_plugin(Ok(GatewayId::Assigned("pl-1".into()))),
        );

        let pipeline = StepPipeline::new(standard_steps(gateway.clone()));
        let report = pipeline.run().await;

        assert!(!report.has_hard_failure());
        assert_eq!(report.soft_failure_count(), 0);
        assert_eq!(report.results.len(), 6);
        // The assigned service id flows into both dependent admin calls.
        let calls = gateway.calls();
        assert!(calls.contains(&"create_route svc-1".to_string()));
        assert!(calls.contains(&"create_plugin svc-1".to_string()));
    }
}
