//! The top-level convergence run.
//!
//! Composes the phases in a fixed order: tooling preflight, local resource
//! convergence, stack start, the admin-API step pipeline, and finally the
//! verification probes. Hard failures can only arise from the first three
//! phases, so an aborted run never leaves the control plane half-provisioned.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::RunConfiguration;
use crate::desired::{self, CONTACT_PLACEHOLDER, GATEWAY_CONFIG_PATH};
use crate::errors::ProvisioningError;
use crate::identifiers::{ArtifactPath, RunId};
use crate::ports::{ArtifactStore, CommandRunner, GatewayApi};
use crate::resource::{inject_placeholder, Converged, ResourceConvergence, ResourceKind};
use crate::step::{PipelineReport, StepPipeline};
use crate::steps::{standard_steps, PROBE_PATH};
use crate::types::Timestamp;
use crate::verify::{VerificationProbe, VerificationReport};

/// Pause after provisioning so the control plane's internal state settles
/// before verification begins.
const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Pause between verification probes, keeping rate-limit windows observable.
const PROBE_PAUSE: Duration = Duration::from_millis(500);
/// Number of verification probes per run.
const PROBE_ATTEMPTS: u32 = 6;

/// Which compose flavor preflight resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeFlavor {
    /// `docker compose` (the CLI plugin).
    DockerPlugin,
    /// The standalone `docker-compose` binary.
    Standalone,
}

impl ComposeFlavor {
    /// Program and leading arguments for invoking compose.
    pub fn invocation(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ComposeFlavor::DockerPlugin => ("docker", &["compose"]),
            ComposeFlavor::Standalone => ("docker-compose", &[]),
        }
    }
}

/// How one resource was left by convergence.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutcome {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Resource name or path.
    pub target: String,
    /// Whether the resource was found or created.
    pub converged: Converged,
}

/// The full record of one convergence run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Correlates all activity from this run.
    pub run_id: RunId,
    /// When the run started.
    pub started: Timestamp,
    /// When the run finished.
    pub finished: Timestamp,
    /// Local resources, in convergence order.
    pub resources: Vec<ResourceOutcome>,
    /// Step results, in execution order.
    pub pipeline: PipelineReport,
    /// Probe observations from the verification phase.
    pub verification: VerificationReport,
}

impl RunReport {
    /// `true` when any pipeline step ended in a hard failure.
    ///
    /// Soft failures and verification findings never flip this; they are
    /// reported but do not change the run's exit status.
    pub fn has_hard_failure(&self) -> bool {
        self.pipeline.has_hard_failure()
    }
}

/// Drives one full convergence run.
pub struct ConvergenceRunner {
    config: RunConfiguration,
    commands: Arc<dyn CommandRunner>,
    store: Arc<dyn ArtifactStore>,
    gateway: Arc<dyn GatewayApi>,
    settle_delay: Duration,
    probe_pause: Duration,
}

impl ConvergenceRunner {
    pub fn new(
        config: RunConfiguration,
        commands: Arc<dyn CommandRunner>,
        store: Arc<dyn ArtifactStore>,
        gateway: Arc<dyn GatewayApi>,
    ) -> Self {
        Self {
            config,
            commands,
            store,
            gateway,
            settle_delay: SETTLE_DELAY,
            probe_pause: PROBE_PAUSE,
        }
    }

    /// Overrides the fixed delays. Tests run with zero.
    pub fn with_delays(mut self, settle_delay: Duration, probe_pause: Duration) -> Self {
        self.settle_delay = settle_delay;
        self.probe_pause = probe_pause;
        self
    }

    /// Runs every phase in order and assembles the report.
    ///
    /// An `Err` is a hard failure: missing tooling, an unwritable artifact,
    /// or a failed local command. Remote failures never surface here; they
    /// are folded into the pipeline and verification reports.
    pub async fn run(&self) -> Result<RunReport, ProvisioningError> {
        let run_id = RunId::new_random();
        let started = Timestamp::now();
        tracing::info!(%run_id, network = %self.config.network, "starting convergence run");

        let compose = self.preflight().await?;
        let resources = self.converge_resources().await?;
        self.start_stack(compose).await?;

        let pipeline = StepPipeline::new(standard_steps(self.gateway.clone()));
        let pipeline_report = pipeline.run().await;

        let verification = if pipeline_report.has_hard_failure() {
            VerificationReport::default()
        } else {
            tokio::time::sleep(self.settle_delay).await;
            VerificationProbe::new(
                self.gateway.clone(),
                PROBE_PATH,
                PROBE_ATTEMPTS,
                self.probe_pause,
            )
            .run()
            .await
        };

        let report = RunReport {
            run_id,
            started,
            finished: Timestamp::now(),
            resources,
            pipeline: pipeline_report,
            verification,
        };
        tracing::info!(
            %run_id,
            soft_failures = report.pipeline.soft_failure_count(),
            throttled_probes = report.verification.throttled_count(),
            "convergence run finished"
        );
        Ok(report)
    }

    /// Verifies required tooling before anything is touched.
    async fn preflight(&self) -> Result<ComposeFlavor, ProvisioningError> {
        if !self.commands.lookup("docker").await {
            return Err(ProvisioningError::MissingTool {
                tool: "docker".to_string(),
            });
        }
        if self.commands.succeeds("docker", &["compose", "version"]).await {
            return Ok(ComposeFlavor::DockerPlugin);
        }
        if self.commands.lookup("docker-compose").await {
            return Ok(ComposeFlavor::Standalone);
        }
        Err(ProvisioningError::MissingTool {
            tool: "docker compose".to_string(),
        })
    }

    async fn converge_resources(&self) -> Result<Vec<ResourceOutcome>, ProvisioningError> {
        let convergence = ResourceConvergence::new(self.commands.as_ref(), self.store.as_ref());
        let specs = desired::desired_resources(&self.config);
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in &specs {
            let converged = convergence.ensure(spec).await?;
            outcomes.push(ResourceOutcome {
                kind: spec.kind(),
                target: spec.target().to_string(),
                converged,
            });
        }

        inject_placeholder(
            self.store.as_ref(),
            &ArtifactPath::from(GATEWAY_CONFIG_PATH),
            CONTACT_PLACEHOLDER,
            &self.config.contact_email,
        )
        .await?;

        Ok(outcomes)
    }

    async fn start_stack(&self, compose: ComposeFlavor) -> Result<(), ProvisioningError> {
        let (program, leading) = compose.invocation();
        let mut args: Vec<&str> = leading.to_vec();
        args.extend(["up", "-d"]);
        self.commands.run(program, &args).await?;
        tracing::info!("stack is up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryArtifactStore, MockCommandRunner, ScriptedGateway};
    use crate::types::{GatewayId, ProxyResponse};

    fn test_config() -> RunConfiguration {
        RunConfiguration::from_lookup(|key| match key {
            "GATEWAY_CONTACT_EMAIL" => Some("ops@example.com".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn runner_with(
        commands: Arc<MockCommandRunner>,
        store: Arc<MemoryArtifactStore>,
        gateway: Arc<ScriptedGateway>,
    ) -> ConvergenceRunner {
        ConvergenceRunner::new(test_config(), commands, store, gateway)
            .with_delays(Duration::ZERO, Duration::ZERO)
    }

    fn tooling() -> MockCommandRunner {
        let commands = MockCommandRunner::default();
        commands.add_tool("docker");
        commands.allow_probe("docker compose version");
        commands
    }

    #[tokio::test]
    async fn missing_docker_aborts_before_any_resource_is_touched() {
        let commands = Arc::new(MockCommandRunner::default());
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let runner = runner_with(commands.clone(), store.clone(), gateway);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, ProvisioningError::MissingTool { ref tool } if tool == "docker"));
        assert!(commands.executed().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_compose_flavor_is_a_hard_failure() {
        let commands = MockCommandRunner::default();
        commands.add_tool("docker");
        let commands = Arc::new(commands);
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let runner = runner_with(commands, store.clone(), gateway);

        let err = runner.run().await.unwrap_err();
        assert!(
            matches!(err, ProvisioningError::MissingTool { ref tool } if tool == "docker compose")
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn standalone_compose_is_accepted_as_fallback() {
        let commands = MockCommandRunner::default();
        commands.add_tool("docker");
        commands.add_tool("docker-compose");
        let commands = Arc::new(commands);
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let runner = runner_with(commands.clone(), store, gateway);

        runner.run().await.unwrap();
        assert!(commands
            .executed()
            .contains(&"docker-compose up -d".to_string()));
    }

    #[tokio::test]
    async fn full_run_converges_resources_and_provisions_the_gateway() {
        let commands = Arc::new(tooling());
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(
            ScriptedGateway::default()
                .script_create_service(Ok(GatewayId::Assigned("svc-1".into())))
                .script_proxy(Ok(ProxyResponse {
                    status: 200,
                    body_excerpt: "{}".into(),
                    rate_limit_remaining: Some("4".into()),
                })),
        );
        let runner = runner_with(commands.clone(), store.clone(), gateway);

        let report = runner.run().await.unwrap();
        assert!(!report.has_hard_failure());
        assert_eq!(report.resources.len(), 4);

        // Network created, stack brought up.
        let executed = commands.executed();
        assert!(executed.contains(&"docker network create gateway-net".to_string()));
        assert!(executed.contains(&"docker compose up -d".to_string()));

        // Config materialized with the operator contact injected.
        let config = store.contents("gateway.yml").unwrap();
        assert!(config.contains("contact: ops@example.com"));
        assert!(!config.contains("your-email@example.com"));

        // Secret created through the owner-only path.
        assert_eq!(store.secret_paths(), vec!["tls-store.json".to_string()]);

        // Verification sent every probe.
        assert_eq!(report.verification.probes.len(), 6);
    }

    #[tokio::test]
    async fn second_run_issues_no_duplicate_creates() {
        let commands = Arc::new(tooling());
        // Everything already exists.
        commands.allow_probe("docker network inspect gateway-net");
        let store = Arc::new(
            MemoryArtifactStore::default()
                .with_file("gateway.yml", "contact: ops@corp.io")
                .with_file("docker-compose.yml", "services: {}")
                .with_file("tls-store.json", ""),
        );
        let gateway = Arc::new(ScriptedGateway::default());
        let runner = runner_with(commands.clone(), store.clone(), gateway);

        let report = runner.run().await.unwrap();
        assert!(report
            .resources
            .iter()
            .all(|r| r.converged == Converged::AlreadyPresent));
        // The only command run is the idempotent stack start.
        assert_eq!(
            commands.executed(),
            vec!["docker compose up -d".to_string()]
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_probes_are_reported_without_failing_the_run() {
        fn probe(status: u16, remaining: &str) -> Result<ProxyResponse, crate::errors::GatewayRequestError> {
            Ok(ProxyResponse {
                status,
                body_excerpt: String::new(),
                rate_limit_remaining: Some(remaining.to_string()),
            })
        }

        let commands = Arc::new(tooling());
        let store = Arc::new(MemoryArtifactStore::default());
        // First proxy response feeds the smoke step; the remaining six feed
        // the verification probes against a 5/minute policy.
        let gateway = Arc::new(
            ScriptedGateway::default()
                .script_create_service(Ok(GatewayId::Assigned("svc-1".into())))
                .script_create_route(Ok(GatewayId::Assigned("rt-1".into())))
                .script_create_plugin(Ok(GatewayId::Assigned("pl-1".into())))
                .script_proxy(probe(200, "4"))
                .script_proxy(probe(200, "3"))
                .script_proxy(probe(200, "2"))
                .script_proxy(probe(200, "1"))
                .script_proxy(probe(200, "0"))
                .script_proxy(probe(200, "0"))
                .script_proxy(probe(429, "0")),
        );
        let runner = runner_with(commands, store, gateway.clone());

        let report = runner.run().await.unwrap();
        assert!(!report.has_hard_failure());
        assert_eq!(report.pipeline.soft_failure_count(), 0);
        assert!(report
            .pipeline
            .results
            .iter()
            .all(crate::step::StepResult::is_success));
        assert_eq!(report.verification.probes.len(), 6);
        assert!(report.verification.saw_throttle());
        // The assigned service id reached the dependent admin calls.
        let calls = gateway.calls();
        assert!(calls.contains(&"create_route svc-1".to_string()));
        assert!(calls.contains(&"create_plugin svc-1".to_string()));
    }

    #[tokio::test]
    async fn failed_stack_start_is_a_hard_failure() {
        let commands = tooling();
        commands.fail_run("docker compose up -d", "port already allocated");
        let commands = Arc::new(commands);
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let runner = runner_with(commands, store, gateway);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, ProvisioningError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn soft_failures_do_not_fail_the_run() {
        let commands = Arc::new(tooling());
        let store = Arc::new(MemoryArtifactStore::default());
        let gateway = Arc::new(ScriptedGateway::default().script_create_service(Err(
            crate::errors::GatewayRequestError::Transport {
                reason: "connection refused".into(),
            },
        )));
        let runner = runner_with(commands, store, gateway);

        let report = runner.run().await.unwrap();
        assert!(!report.has_hard_failure());
        assert!(report.pipeline.soft_failure_count() >= 1);
    }
}
