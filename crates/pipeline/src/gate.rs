use std::time::Duration;

use tracing::{info, warn};

use common::collab::ReviewChannel;
use common::{ApprovalDecision, ApprovalVerdict, ReviewPayload};

/// Bounded human decision point.
///
/// Races the reviewer's reply against the deadline; whichever resolves
/// first wins and the other is dropped, so a late reply can never override
/// a fired timeout (and vice versa). The gate itself performs no side
/// effects — the orchestrator alone acts on the resolved decision, which
/// also makes cancelling the wait safe for the config store.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate {
    timeout: Duration,
}

impl ApprovalGate {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Present the payload and wait for one resolution.
    ///
    /// No reply within the deadline resolves to `TimedOut`, which counts as
    /// an approval: unattended runs keep moving, while an explicit
    /// rejection is always honored. A failing review channel is treated
    /// the same way as silence.
    pub async fn resolve(
        &self,
        payload: &ReviewPayload,
        channel: &dyn ReviewChannel,
    ) -> ApprovalDecision {
        match &payload.delta {
            Some(delta) => info!(%delta, timeout = ?self.timeout, "Awaiting reviewer decision"),
            None => info!(timeout = ?self.timeout, "Awaiting reviewer confirmation (no change)"),
        }

        let decision = match tokio::time::timeout(self.timeout, channel.prompt(payload)).await {
            Ok(Ok(reply)) => ApprovalDecision {
                verdict: if reply.approved {
                    ApprovalVerdict::Approved
                } else {
                    ApprovalVerdict::Rejected
                },
                rationale: reply.rationale,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Review channel failed; defaulting to approval");
                ApprovalDecision {
                    verdict: ApprovalVerdict::TimedOut,
                    rationale: Some(format!("review channel error: {e}")),
                }
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "No reviewer response; approving by default");
                ApprovalDecision {
                    verdict: ApprovalVerdict::TimedOut,
                    rationale: None,
                }
            }
        };

        info!(verdict = ?decision.verdict, "Approval gate resolved");
        decision
    }
}
