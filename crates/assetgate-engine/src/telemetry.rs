use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use assetgate_core::model::{ApprovalId, AssetId, EventId, UserId};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metrics server failed: {0}")]
    Server(std::io::Error),
}

/// One custody transaction outcome, logged structurally.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent<'a> {
    pub action: &'a str,
    pub decision: &'a str,
    pub rule: &'a str,
    pub asset_id: AssetId,
    pub actor_user_id: UserId,
    pub event_id: Option<EventId>,
    pub approval_id: Option<ApprovalId>,
}

#[derive(Debug, Default)]
struct TelemetryState {
    decisions_total: HashMap<(String, String), u64>,
    precondition_rejects_total: HashMap<String, u64>,
    approvals_resolved_total: HashMap<String, u64>,
    verification_timeouts_total: u64,
    chain_verifications_total: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle_event(&self, event: &LifecycleEvent<'_>) {
        tracing::info!(target: "assetgate.lifecycle", event = ?event, "custody transaction");
    }

    pub fn record_decision(&self, action: &str, decision: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .decisions_total
            .entry((action.to_string(), decision.to_string()))
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_precondition_reject(&self, action: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .precondition_rejects_total
            .entry(action.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_approval_resolved(&self, outcome: &str) {
        let mut guard = self.state.lock();
        let entry = guard
            .approvals_resolved_total
            .entry(outcome.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn record_verification_timeout(&self) {
        let mut guard = self.state.lock();
        guard.verification_timeouts_total = guard.verification_timeouts_total.saturating_add(1);
    }

    pub fn record_chain_verification(&self) {
        let mut guard = self.state.lock();
        guard.chain_verifications_total = guard.chain_verifications_total.saturating_add(1);
    }

    pub fn render(&self) -> String {
        let guard = self.state.lock();
        let mut out = String::new();
        out.push_str("# TYPE custody_decisions_total counter\n");
        for ((action, decision), value) in &guard.decisions_total {
            let _ = writeln!(
                out,
                "custody_decisions_total{{action=\"{}\",decision=\"{}\"}} {}",
                action, decision, value
            );
        }
        out.push_str("# TYPE custody_precondition_rejects_total counter\n");
        for (action, value) in &guard.precondition_rejects_total {
            let _ = writeln!(
                out,
                "custody_precondition_rejects_total{{action=\"{}\"}} {}",
                action, value
            );
        }
        out.push_str("# TYPE custody_approvals_resolved_total counter\n");
        for (outcome, value) in &guard.approvals_resolved_total {
            let _ = writeln!(
                out,
                "custody_approvals_resolved_total{{outcome=\"{}\"}} {}",
                outcome, value
            );
        }
        out.push_str("# TYPE custody_verification_timeouts_total counter\n");
        let _ = writeln!(
            out,
            "custody_verification_timeouts_total {}",
            guard.verification_timeouts_total
        );
        out.push_str("# TYPE custody_chain_verifications_total counter\n");
        let _ = writeln!(
            out,
            "custody_chain_verifications_total {}",
            guard.chain_verifications_total
        );
        out
    }

    pub async fn spawn_metrics_server(
        self: Arc<Self>,
        addr: SocketAddr,
    ) -> Result<tokio::task::JoinHandle<()>, TelemetryError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(TelemetryError::Server)?;
        Ok(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        let telemetry = self.clone();
                        tokio::spawn(async move {
                            let mut buf = vec![0_u8; 2048];
                            match socket.read(&mut buf).await {
                                Ok(n) if n > 0 => {
                                    let req = String::from_utf8_lossy(&buf[..n]);
                                    let (status, body) = if req.starts_with("GET /metrics ") {
                                        ("200 OK", telemetry.render())
                                    } else {
                                        ("404 Not Found", "not found".to_string())
                                    };
                                    let response = format!(
                                        "HTTP/1.1 {status}\r\ncontent-type: text/plain; version=0.0.4\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                                        body.len(), body
                                    );
                                    let _ = socket.write_all(response.as_bytes()).await;
                                }
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::warn!(error=%err, "metrics socket read failed");
                                }
                            }
                        });
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::error!(error=%err, "metrics server accept failed");
                        break;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_counters() {
        let telemetry = Telemetry::new();
        telemetry.record_decision("CHECK_OUT", "ALLOW");
        telemetry.record_decision("CHECK_OUT", "ALLOW");
        telemetry.record_decision("TRANSFER", "STEP_UP");
        telemetry.record_precondition_reject("CHECK_IN");
        telemetry.record_approval_resolved("APPROVED");
        telemetry.record_verification_timeout();
        telemetry.record_chain_verification();

        let rendered = telemetry.render();
        assert!(rendered
            .contains("custody_decisions_total{action=\"CHECK_OUT\",decision=\"ALLOW\"} 2"));
        assert!(rendered
            .contains("custody_decisions_total{action=\"TRANSFER\",decision=\"STEP_UP\"} 1"));
        assert!(rendered.contains("custody_precondition_rejects_total{action=\"CHECK_IN\"} 1"));
        assert!(rendered.contains("custody_approvals_resolved_total{outcome=\"APPROVED\"} 1"));
        assert!(rendered.contains("custody_verification_timeouts_total 1"));
        assert!(rendered.contains("custody_chain_verifications_total 1"));
    }
}
