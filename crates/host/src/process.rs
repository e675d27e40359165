//! Command execution over `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use converge::{CommandRunner, ProvisioningError};

/// Production command runner.
///
/// Output is captured, not streamed: stdout is returned to the caller (and
/// traced), stderr becomes the failure detail on a non-zero exit.
pub struct ProcessRunner;

fn render(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Search-path resolution, the same contract a shell applies: the first
/// matching regular file wins.
fn on_search_path(tool: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file())
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn lookup(&self, tool: &str) -> bool {
        on_search_path(tool)
    }

    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProvisioningError> {
        let command = render(program, args);
        tracing::debug!(%command, "running command");
        let output = Command::new(program).args(args).output().await.map_err(|err| {
            ProvisioningError::CommandFailed {
                command: command.clone(),
                detail: err.to_string(),
            }
        })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            if !stdout.trim().is_empty() {
                tracing::debug!(%command, output = stdout.trim(), "command output");
            }
            Ok(stdout)
        } else {
            Err(ProvisioningError::CommandFailed {
                command,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
