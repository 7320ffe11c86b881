//! Configuration structures for Tessera.

use crate::constants::{DEFAULT_COLUMN_CAPACITY, DEFAULT_MAX_TABLES};
use crate::error::{Result, TesseraError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration for the column store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for database files.
    pub data_dir: PathBuf,
    /// Name of the file in `data_dir` recording the active database.
    pub session_file: String,
    /// Enable fsync after writing a database file.
    pub fsync_enabled: bool,
    /// Number of tables a new database can hold.
    pub max_tables: usize,
    /// Initial capacity of a new column, in values.
    pub column_base_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            session_file: ".session".to_string(),
            fsync_enabled: true,
            max_tables: DEFAULT_MAX_TABLES,
            column_base_capacity: DEFAULT_COLUMN_CAPACITY,
        }
    }
}

impl StorageConfig {
    /// Returns the path of the session file.
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(&self.session_file)
    }

    /// Returns the path of the file holding the named database.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.tdb", name))
    }
}

/// Execution configuration for joins and batched scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Maximum worker threads running concurrently in one batch phase.
    pub max_worker_threads: usize,
    /// Maximum selects (or fetches) coalesced into one shared scan.
    pub shared_scan_fan_in: usize,
    /// Number of partitions used by the partitioned hash join.
    pub join_partitions: usize,
    /// Combined input size at which the hash join is partitioned.
    pub partition_threshold: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_worker_threads: num_cpus(),
            shared_scan_fan_in: 16,
            join_partitions: 16,
            partition_threshold: 1024,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub exec: ExecConfig,
}

impl EngineConfig {
    /// Checks that every sizing parameter is usable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("storage.max_tables", self.storage.max_tables),
            ("storage.column_base_capacity", self.storage.column_base_capacity),
            ("exec.max_worker_threads", self.exec.max_worker_threads),
            ("exec.shared_scan_fan_in", self.exec.shared_scan_fan_in),
            ("exec.join_partitions", self.exec.join_partitions),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(TesseraError::ConfigError(format!("{} must be positive", name)));
            }
        }
        if self.storage.session_file.is_empty() {
            return Err(TesseraError::ConfigError(
                "storage.session_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the number of available CPUs.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.session_file, ".session");
        assert!(config.fsync_enabled);
        assert_eq!(config.max_tables, 16);
        assert_eq!(config.column_base_capacity, 4096);
    }

    #[test]
    fn test_storage_config_paths() {
        let config = StorageConfig {
            data_dir: PathBuf::from("/var/lib/tessera"),
            ..StorageConfig::default()
        };
        assert_eq!(
            config.session_path(),
            PathBuf::from("/var/lib/tessera/.session")
        );
        assert_eq!(
            config.database_path("db1"),
            PathBuf::from("/var/lib/tessera/db1.tdb")
        );
    }

    #[test]
    fn test_exec_config_defaults() {
        let config = ExecConfig::default();
        assert!(config.max_worker_threads >= 1);
        assert_eq!(config.shared_scan_fan_in, 16);
        assert_eq!(config.join_partitions, 16);
        assert_eq!(config.partition_threshold, 1024);
    }

    #[test]
    fn test_engine_config_serde_roundtrip() {
        let original = EngineConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.storage.data_dir, deserialized.storage.data_dir);
        assert_eq!(original.storage.max_tables, deserialized.storage.max_tables);
        assert_eq!(
            original.exec.max_worker_threads,
            deserialized.exec.max_worker_threads
        );
        assert_eq!(original.exec.join_partitions, deserialized.exec.join_partitions);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut config = EngineConfig::default();
        config.exec.join_partitions = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: exec.join_partitions must be positive"
        );

        let mut config = EngineConfig::default();
        config.storage.session_file.clear();
        assert!(config.validate().is_err());
    }
}
