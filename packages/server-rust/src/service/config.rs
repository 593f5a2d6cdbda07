//! Configuration for the AS4 server services.
//!
//! Every section is defaulted, so a partial JSON document (or none at all)
//! yields a working in-memory setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct As4Config {
    /// Identifier of this node, attached to log output.
    pub node_id: String,
    pub pmode: PModeStoreConfig,
    pub dispatch: DispatchConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

impl As4Config {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails [`As4Config::check`].
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config file {}: {e}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending setting.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.pmode.backend != StorageBackend::Memory && self.pmode.path.is_none() {
            anyhow::bail!("pmode.path is required for the {:?} backend", self.pmode.backend);
        }
        if self.audit.enabled && self.audit.channel_capacity == 0 {
            anyhow::bail!("audit.channelCapacity must be greater than zero");
        }
        Ok(())
    }
}

/// Which durable store backs the PMode store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageBackend {
    /// No persistence; records live only in memory.
    #[default]
    Memory,
    /// JSON snapshot plus an append-only write-ahead log.
    Wal,
    /// Embedded redb database.
    Redb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PModeStoreConfig {
    pub backend: StorageBackend,
    /// Snapshot file (WAL backend) or database file (redb backend).
    pub path: Option<PathBuf>,
    /// Number of logged mutations after which the WAL is folded into the snapshot.
    /// 0 disables automatic checkpoints.
    pub checkpoint_threshold: u64,
    /// Whether service start fails when a stored PMode is structurally invalid.
    pub validate_on_start: bool,
}

impl Default for PModeStoreConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            checkpoint_threshold: 256,
            validate_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Maximum number of concurrently executing tasks. 0 = twice the available parallelism.
    pub worker_count: usize,
    /// Upper bound on the drain wait during shutdown.
    pub shutdown_timeout_ms: u64,
}

impl DispatchConfig {
    /// Resolves `worker_count`, substituting the default for 0.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get) * 2
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            shutdown_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    pub enabled: bool,
    /// Capacity of the queue between the store and the audit forwarder.
    pub channel_capacity: usize,
    /// Interval at which the forwarder reports dropped events.
    pub report_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 1024,
            report_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = As4Config::default();
        assert_eq!(config.pmode.backend, StorageBackend::Memory);
        assert!(config.pmode.path.is_none());
        assert_eq!(config.pmode.checkpoint_threshold, 256);
        assert!(config.pmode.validate_on_start);
        assert_eq!(config.dispatch.worker_count, 0);
        assert_eq!(config.dispatch.shutdown_timeout(), Duration::from_secs(30));
        assert!(config.audit.enabled);
        assert_eq!(config.audit.channel_capacity, 1024);
        assert_eq!(config.logging.filter, "info");
        assert!(config.check().is_ok());
    }

    #[test]
    fn effective_worker_count_defaults_to_twice_parallelism() {
        let config = DispatchConfig::default();
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        assert_eq!(config.effective_worker_count(), cpus * 2);

        let fixed = DispatchConfig {
            worker_count: 3,
            ..DispatchConfig::default()
        };
        assert_eq!(fixed.effective_worker_count(), 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = As4Config::from_json_str(
            r#"{ "nodeId": "msh-1", "dispatch": { "workerCount": 4 }, "logging": { "format": "json" } }"#,
        )
        .unwrap();
        assert_eq!(config.node_id, "msh-1");
        assert_eq!(config.dispatch.worker_count, 4);
        assert_eq!(config.dispatch.shutdown_timeout_ms, 30_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn durable_backend_requires_path() {
        let err = As4Config::from_json_str(r#"{ "pmode": { "backend": "wal" } }"#).unwrap_err();
        assert!(err.to_string().contains("pmode.path"));

        let ok = As4Config::from_json_str(
            r#"{ "pmode": { "backend": "wal", "path": "/var/lib/as4/pmodes.json" } }"#,
        )
        .unwrap();
        assert_eq!(ok.pmode.backend, StorageBackend::Wal);
    }

    #[test]
    fn from_json_file_reads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("as4.json");
        std::fs::write(&path, r#"{ "audit": { "enabled": false } }"#).unwrap();

        let config = As4Config::from_json_file(&path).unwrap();
        assert!(!config.audit.enabled);
        assert!(As4Config::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
