//! Recording test doubles for the port traits.
//!
//! Used by the unit tests across the workspace: each double records the calls
//! it receives and returns scripted responses, falling back to a benign
//! default when the script runs dry.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{GatewayRequestError, ProvisioningError};
use crate::identifiers::ArtifactPath;
use crate::ports::{ArtifactStore, CommandRunner, GatewayApi};
use crate::types::{
    GatewayId, GatewayStatus, PluginSpec, ProxyResponse, RouteSpec, ServiceSpec, ServiceSummary,
};

fn render(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Command-runner double: tools and probe outcomes are declared up front,
/// executed commands are recorded.
#[derive(Default)]
pub struct MockCommandRunner {
    tools: Mutex<HashSet<String>>,
    passing_probes: Mutex<HashSet<String>>,
    failing_runs: Mutex<HashMap<String, String>>,
    executed: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    /// Declares `tool` as present on the search path.
    pub fn add_tool(&self, tool: &str) {
        self.tools.lock().unwrap().insert(tool.to_string());
    }

    /// Declares the probe command line (joined with spaces) as passing.
    pub fn allow_probe(&self, command: &str) {
        self.passing_probes
            .lock()
            .unwrap()
            .insert(command.to_string());
    }

    /// Declares the command line as failing with `detail`.
    pub fn fail_run(&self, command: &str, detail: &str) {
        self.failing_runs
            .lock()
            .unwrap()
            .insert(command.to_string(), detail.to_string());
    }

    /// Every command line passed to `run`, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn lookup(&self, tool: &str) -> bool {
        self.tools.lock().unwrap().contains(tool)
    }

    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        self.passing_probes
            .lock()
            .unwrap()
            .contains(&render(program, args))
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProvisioningError> {
        let line = render(program, args);
        if let Some(detail) = self.failing_runs.lock().unwrap().get(&line) {
            return Err(ProvisioningError::CommandFailed {
                command: line,
                detail: detail.clone(),
            });
        }
        self.executed.lock().unwrap().push(line);
        Ok(String::new())
    }
}

/// In-memory artifact store: mutations are counted, secret writes are
/// tracked separately so tests can assert the owner-only path was taken.
#[derive(Default)]
pub struct MemoryArtifactStore {
    files: Mutex<HashMap<String, String>>,
    secrets: Mutex<Vec<String>>,
    writes: Mutex<usize>,
}

impl MemoryArtifactStore {
    /// Seeds a file as pre-existing state; not counted as a write.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Current content of `path`, if it exists.
    pub fn contents(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Number of mutating calls (`write` and `write_secret`) received.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Paths created through `write_secret`, in call order.
    pub fn secret_paths(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, path: &ArtifactPath) -> bool {
        self.files.lock().unwrap().contains_key(path.as_str())
    }

    async fn read(&self, path: &ArtifactPath) -> Result<String, ProvisioningError> {
        self.files.lock().unwrap().get(path.as_str()).cloned().ok_or_else(|| {
            ProvisioningError::ArtifactRead {
                path: path.as_str().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact"),
            }
        })
    }

    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), ProvisioningError> {
        *self.writes.lock().unwrap() += 1;
        self.files
            .lock()
            .unwrap()
            .insert(path.as_str().to_string(), content.to_string());
        Ok(())
    }

    async fn write_secret(
        &self,
        path: &ArtifactPath,
        content: &str,
    ) -> Result<(), ProvisioningError> {
        *self.writes.lock().unwrap() += 1;
        self.secrets.lock().unwrap().push(path.as_str().to_string());
        self.files
            .lock()
            .unwrap()
            .insert(path.as_str().to_string(), content.to_string());
        Ok(())
    }
}

type Scripted<T> = Mutex<VecDeque<Result<T, GatewayRequestError>>>;

/// Gateway double: responses are scripted per operation and consumed in
/// order; an empty script yields a benign default (creates answer with
/// [`GatewayId::Unknown`], probes answer 200).
#[derive(Default)]
pub struct ScriptedGateway {
    status: Scripted<GatewayStatus>,
    create_service: Scripted<GatewayId>,
    create_route: Scripted<GatewayId>,
    create_plugin: Scripted<GatewayId>,
    proxy: Scripted<ProxyResponse>,
    services: Mutex<Vec<ServiceSummary>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn script_status(self, response: Result<GatewayStatus, GatewayRequestError>) -> Self {
        self.status.lock().unwrap().push_back(response);
        self
    }

    pub fn script_create_service(self, response: Result<GatewayId, GatewayRequestError>) -> Self {
        self.create_service.lock().unwrap().push_back(response);
        self
    }

    pub fn script_create_route(self, response: Result<GatewayId, GatewayRequestError>) -> Self {
        self.create_route.lock().unwrap().push_back(response);
        self
    }

    pub fn script_create_plugin(self, response: Result<GatewayId, GatewayRequestError>) -> Self {
        self.create_plugin.lock().unwrap().push_back(response);
        self
    }

    pub fn script_proxy(self, response: Result<ProxyResponse, GatewayRequestError>) -> Self {
        self.proxy.lock().unwrap().push_back(response);
        self
    }

    /// Sets the listing returned by `list_services`.
    pub fn with_services(self, services: Vec<ServiceSummary>) -> Self {
        *self.services.lock().unwrap() = services;
        self
    }

    /// Every operation invoked, with the service reference or path it
    /// addressed, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl GatewayApi for ScriptedGateway {
    async fn status(&self) -> Result<GatewayStatus, GatewayRequestError> {
        self.record("status");
        self.status
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GatewayStatus::default()))
    }

    async fn create_service(
        &self,
        _spec: &ServiceSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.record("create_service");
        self.create_service
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(GatewayId::Unknown))
    }

    async fn create_route(
        &self,
        service_ref: &str,
        _spec: &RouteSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.record(format!("create_route {service_ref}"));
        self.create_route
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(GatewayId::Unknown))
    }

    async fn create_plugin(
        &self,
        service_ref: &str,
        _spec: &PluginSpec,
    ) -> Result<GatewayId, GatewayRequestError> {
        self.record(format!("create_plugin {service_ref}"));
        self.create_plugin
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(GatewayId::Unknown))
    }

    async fn list_services(&self) -> Result<Vec<ServiceSummary>, GatewayRequestError> {
        self.record("list_services");
        Ok(self.services.lock().unwrap().clone())
    }

    async fn proxy_get(&self, path: &str) -> Result<ProxyResponse, GatewayRequestError> {
        self.record(format!("proxy_get {path}"));
        self.proxy.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ProxyResponse {
                status: 200,
                body_excerpt: String::new(),
                rate_limit_remaining: None,
            })
        })
    }
}
