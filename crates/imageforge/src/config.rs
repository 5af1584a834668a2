// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the archive store and dispatch gate.

use std::path::PathBuf;
use std::time::Duration;

/// Archive store configuration.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Root directory holding one subdirectory per key.
    pub data_dir: PathBuf,
    /// Maximum number of records retained per key.
    pub max_records: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("PlayerData"),
            max_records: 10,
        }
    }
}

/// Dispatch gate configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Worker executable (e.g. `python3`).
    pub worker_program: String,
    /// Script path passed as the worker's first argument.
    pub script_path: PathBuf,
    /// Maximum number of worker processes running at once.
    pub max_concurrent_jobs: usize,
    /// Hard cap on a single worker run; the process is killed on expiry.
    pub worker_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_program: "python3".to_string(),
            script_path: PathBuf::from("ImageGen.py"),
            max_concurrent_jobs: 2,
            worker_timeout: Duration::from_secs(300),
        }
    }
}

/// Full service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Archive store settings.
    pub archive: ArchiveConfig,
    /// Dispatch gate settings.
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(
            std::env::var("IMAGEFORGE_DATA_DIR").unwrap_or_else(|_| "PlayerData".to_string()),
        );

        let max_records = parse_or_default("IMAGEFORGE_MAX_RECORDS", 10)?;

        let worker_program =
            std::env::var("IMAGEFORGE_WORKER_PROGRAM").unwrap_or_else(|_| "python3".to_string());

        let script_path = std::env::var("IMAGEFORGE_WORKER_SCRIPT")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::MissingEnvVar("IMAGEFORGE_WORKER_SCRIPT"))?;

        let max_concurrent_jobs = parse_or_default("IMAGEFORGE_MAX_CONCURRENT_JOBS", 2)?;

        let worker_timeout =
            Duration::from_secs(parse_or_default("IMAGEFORGE_WORKER_TIMEOUT_SECS", 300)?);

        Ok(Self {
            archive: ArchiveConfig {
                data_dir,
                max_records,
            },
            dispatch: DispatchConfig {
                worker_program,
                script_path,
                max_concurrent_jobs,
                worker_timeout,
            },
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable holds a value that is not a valid number.
    #[error("Invalid numeric value for environment variable: {0}")]
    InvalidNumber(&'static str),
}
