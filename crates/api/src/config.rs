use std::path::PathBuf;
use std::str::FromStr;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs before abandoning them.
    pub shutdown_timeout_secs: u64,
    /// Number of jobs that may run at once (default: `2`).
    pub worker_slots: usize,
    /// Per-job log line cap (default: `500`).
    pub job_log_capacity: usize,
    /// Finished jobs stay pollable this long (default: one hour).
    pub job_retention_secs: u64,
    /// Data-mode page size when the caller does not pass one.
    pub data_page_size: usize,
    /// Directory holding uploaded inputs and produced artifacts.
    pub artifact_root: PathBuf,
    /// Public URL prefix for files under `artifact_root`.
    pub artifact_base_url: String,
    /// Interpreter used to run worker scripts.
    pub worker_program: String,
    pub worker_scripts_dir: PathBuf,
    /// Model weights handed to the feature extractor.
    pub model_artifacts_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `0.0.0.0`                |
    /// | `PORT`                  | `3000`                   |
    /// | `CORS_ORIGINS`          | `http://localhost:4200`  |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    /// | `WORKER_SLOTS`          | `2`                      |
    /// | `JOB_LOG_CAPACITY`      | `500`                    |
    /// | `JOB_RETENTION_SECS`    | `3600`                   |
    /// | `DATA_PAGE_SIZE`        | `50`                     |
    /// | `ARTIFACT_ROOT`         | `./data/artifacts`       |
    /// | `ARTIFACT_BASE_URL`     | `/api/v1/artifacts/`     |
    /// | `WORKER_PROGRAM`        | `python3`                |
    /// | `WORKER_SCRIPTS_DIR`    | `./workers`              |
    /// | `MODEL_ARTIFACTS_DIR`   | `./artifacts`            |
    ///
    /// Panics on malformed numeric values so misconfiguration fails at
    /// startup.
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = parse_env("PORT", "3000");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:4200")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", "30"),
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", "30"),
            worker_slots: parse_env("WORKER_SLOTS", "2"),
            job_log_capacity: parse_env("JOB_LOG_CAPACITY", "500"),
            job_retention_secs: parse_env("JOB_RETENTION_SECS", "3600"),
            data_page_size: parse_env("DATA_PAGE_SIZE", "50"),
            artifact_root: env_or("ARTIFACT_ROOT", "./data/artifacts").into(),
            artifact_base_url: env_or("ARTIFACT_BASE_URL", "/api/v1/artifacts/"),
            worker_program: env_or("WORKER_PROGRAM", "python3"),
            worker_scripts_dir: env_or("WORKER_SCRIPTS_DIR", "./workers").into(),
            model_artifacts_dir: env_or("MODEL_ARTIFACTS_DIR", "./artifacts").into(),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(name: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(name, default)
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid number: {e}"))
}
