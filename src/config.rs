//! Engine configuration, populated from environment variables.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GalenaError, Result};

/// Storage backend for shard data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Disk,
    S3,
}

impl StorageKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "disk" => Ok(StorageKind::Disk),
            "s3" => Ok(StorageKind::S3),
            other => Err(GalenaError::parsing(format!(
                "unknown storage type [{other}]"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Disk => "disk",
            StorageKind::S3 => "s3",
        }
    }
}

/// Object-store parameters, read from the environment when `storage=s3`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for index shards and metadata.
    pub data_path: PathBuf,

    /// Byte size at which the active shard is rolled.
    pub shard_max_size: u64,

    /// Concurrency limit for shard reader fan-out.
    pub read_thread_num: usize,

    /// Upper bound on the `size` parameter of a search.
    pub max_results: usize,

    /// Worker parallelism hint for the metadata store.
    pub kv_worker_num: usize,

    /// HTTP listen port.
    pub server_port: u16,

    /// Default storage backend for new indexes.
    pub storage: StorageKind,

    /// Object-store parameters (used when `storage=s3`).
    pub s3: S3Config,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: PathBuf::from("./data"),
            shard_max_size: 1024 * 1024 * 1024,
            read_thread_num: 16,
            max_results: 10_000,
            kv_worker_num: num_cpus::get() * 8,
            server_port: 4080,
            storage: StorageKind::Disk,
            s3: S3Config::default(),
        }
    }
}

impl Config {
    /// Build a configuration from `GALENA_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(v) = env::var("GALENA_DATA_PATH") {
            config.data_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GALENA_SHARD_MAX_SIZE") {
            config.shard_max_size = parse_env("GALENA_SHARD_MAX_SIZE", &v)?;
        }
        if let Ok(v) = env::var("GALENA_READ_THREAD_NUM") {
            config.read_thread_num = parse_env("GALENA_READ_THREAD_NUM", &v)?;
        }
        if let Ok(v) = env::var("GALENA_MAX_RESULTS") {
            config.max_results = parse_env("GALENA_MAX_RESULTS", &v)?;
        }
        if let Ok(v) = env::var("GALENA_KV_WORKER_NUM") {
            config.kv_worker_num = parse_env("GALENA_KV_WORKER_NUM", &v)?;
        }
        if let Ok(v) = env::var("GALENA_SERVER_PORT") {
            config.server_port = parse_env("GALENA_SERVER_PORT", &v)?;
        }
        if let Ok(v) = env::var("GALENA_STORAGE_TYPE") {
            config.storage = StorageKind::parse(&v)?;
        }
        if let Ok(v) = env::var("GALENA_S3_BUCKET") {
            config.s3.bucket = v;
        }
        if let Ok(v) = env::var("GALENA_S3_REGION") {
            config.s3.region = v;
        }
        if let Ok(v) = env::var("GALENA_S3_ACCESS_KEY") {
            config.s3.access_key = v;
        }
        if let Ok(v) = env::var("GALENA_S3_SECRET_KEY") {
            config.s3.secret_key = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.shard_max_size == 0 {
            return Err(GalenaError::parsing("GALENA_SHARD_MAX_SIZE must be > 0"));
        }
        if self.read_thread_num == 0 {
            return Err(GalenaError::parsing("GALENA_READ_THREAD_NUM must be > 0"));
        }
        if self.max_results == 0 {
            return Err(GalenaError::parsing("GALENA_MAX_RESULTS must be > 0"));
        }
        Ok(())
    }

    /// Directory holding the metadata key-value store.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_path.join("_metadata")
    }

    /// Directory for one shard of one index: `{data.path}/{index}/{%06x}`.
    pub fn shard_path(&self, index: &str, shard_id: u64) -> PathBuf {
        self.data_path.join(index).join(format!("{shard_id:06x}"))
    }

    /// Directory holding every shard of one index.
    pub fn index_path(&self, index: &str) -> PathBuf {
        self.data_path.join(index)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| GalenaError::parsing(format!("invalid value [{value}] for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.shard_max_size, 1024 * 1024 * 1024);
        assert_eq!(config.max_results, 10_000);
        assert_eq!(config.storage, StorageKind::Disk);
    }

    #[test]
    fn test_shard_path_is_zero_padded_hex() {
        let config = Config::default();
        let path = config.shard_path("games", 255);
        assert!(path.ends_with("games/0000ff"));
    }

    #[test]
    fn test_storage_kind_parse() {
        assert_eq!(StorageKind::parse("disk").unwrap(), StorageKind::Disk);
        assert_eq!(StorageKind::parse("S3").unwrap(), StorageKind::S3);
        assert_eq!(StorageKind::parse("").unwrap(), StorageKind::Disk);
        assert!(StorageKind::parse("nfs").is_err());
    }
}
