//! Post-convergence verification: repeated traffic-path probes.
//!
//! After provisioning settles, a fixed number of probes is sent through the
//! gateway to surface whether the throttling policy took effect. Probe
//! failures are reported, never escalated: the run's exit status reflects
//! hard failures only.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::GatewayApi;

/// Status code the gateway answers with once the rate limit is exhausted.
pub const THROTTLED_STATUS: u16 = 429;

/// What one probe observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The probe got a response.
    Completed {
        /// HTTP status of the proxied response.
        status: u16,
        /// Rate-limit remaining header, when the gateway sent one.
        remaining: Option<String>,
    },
    /// The probe never reached the gateway.
    Unreachable {
        /// Transport-level reason.
        reason: String,
    },
}

/// One probe's record in the verification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// 1-based probe number.
    pub attempt: u32,
    /// What the probe observed.
    pub outcome: ProbeOutcome,
}

impl ProbeRecord {
    /// `true` when the gateway answered with [`THROTTLED_STATUS`].
    pub fn is_throttled(&self) -> bool {
        matches!(
            self.outcome,
            ProbeOutcome::Completed { status, .. } if status == THROTTLED_STATUS
        )
    }
}

/// All probe observations from one verification phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Probe records in send order.
    pub probes: Vec<ProbeRecord>,
}

impl VerificationReport {
    /// `true` when at least one probe was throttled.
    pub fn saw_throttle(&self) -> bool {
        self.probes.iter().any(ProbeRecord::is_throttled)
    }

    /// Number of throttled probes.
    pub fn throttled_count(&self) -> usize {
        self.probes.iter().filter(|p| p.is_throttled()).count()
    }
}

/// Sends repeated probes through the traffic path with a fixed pause between
/// them, so rate-limit windows are observable instead of burst through.
pub struct VerificationProbe {
    gateway: Arc<dyn GatewayApi>,
    path: String,
    attempts: u32,
    pause: Duration,
}

impl VerificationProbe {
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        path: impl Into<String>,
        attempts: u32,
        pause: Duration,
    ) -> Self {
        Self {
            gateway,
            path: path.into(),
            attempts,
            pause,
        }
    }

    /// Runs the probe sequence and collects every observation.
    pub async fn run(&self) -> VerificationReport {
        let mut probes = Vec::with_capacity(self.attempts as usize);
        for attempt in 1..=self.attempts {
            let outcome = match self.gateway.proxy_get(&self.path).await {
                Ok(response) => {
                    if response.status == THROTTLED_STATUS {
                        tracing::warn!(attempt, status = response.status, "probe throttled");
                    } else {
                        tracing::info!(
                            attempt,
                            status = response.status,
                            remaining = response.rate_limit_remaining.as_deref().unwrap_or("-"),
                            "probe completed"
                        );
                    }
                    ProbeOutcome::Completed {
                        status: response.status,
                        remaining: response.rate_limit_remaining,
                    }
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "probe unreachable");
                    ProbeOutcome::Unreachable {
                        reason: err.to_string(),
                    }
                }
            };
            probes.push(ProbeRecord { attempt, outcome });

            if attempt < self.attempts {
                tokio::time::sleep(self.pause).await;
            }
        }
        VerificationReport { probes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayRequestError;
    use crate::testing::ScriptedGateway;
    use crate::types::ProxyResponse;

    fn ok_probe(status: u16, remaining: &str) -> Result<ProxyResponse, GatewayRequestError> {
        Ok(ProxyResponse {
            status,
            body_excerpt: String::new(),
            rate_limit_remaining: Some(remaining.to_string()),
        })
    }

    #[tokio::test]
    async fn six_probes_against_a_five_per_minute_policy_see_a_throttle() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .script_proxy(ok_probe(200, "4"))
                .script_proxy(ok_probe(200, "3"))
                .script_proxy(ok_probe(200, "2"))
                .script_proxy(ok_probe(200, "1"))
                .script_proxy(ok_probe(200, "0"))
                .script_proxy(ok_probe(429, "0")),
        );

        let probe = VerificationProbe::new(gateway, "/httpbin/get", 6, Duration::ZERO);
        let report = probe.run().await;

        assert_eq!(report.probes.len(), 6);
        assert!(report.saw_throttle());
        assert_eq!(report.throttled_count(), 1);
        assert!(report.probes[5].is_throttled());
    }

    #[tokio::test]
    async fn unreachable_probes_are_recorded_not_escalated() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .script_proxy(Err(GatewayRequestError::Transport {
                    reason: "connection refused".into(),
                }))
                .script_proxy(ok_probe(200, "4")),
        );

        let probe = VerificationProbe::new(gateway, "/httpbin/get", 2, Duration::ZERO);
        let report = probe.run().await;

        assert_eq!(report.probes.len(), 2);
        assert!(matches!(
            report.probes[0].outcome,
            ProbeOutcome::Unreachable { .. }
        ));
        assert!(!report.saw_throttle());
    }
}
