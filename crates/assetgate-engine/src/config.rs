use std::path::PathBuf;

/// Engine tuning knobs. `data_dir` holds the audit ledger file.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// Upper bound on one verification-provider round-trip. On expiry the
    /// transaction proceeds with a conservative fail-closed snapshot
    /// instead of hanging.
    pub verification_timeout_ms: u64,
    /// Optional `host:port` for the Prometheus text endpoint.
    pub metrics_listen: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            verification_timeout_ms: 3_000,
            metrics_listen: None,
        }
    }
}

impl EngineConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("audit.log")
    }
}
