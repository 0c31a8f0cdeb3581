//! Configuration management for the fastlease CLI
//!
//! Settings are layered, later sources winning: built-in defaults, the YAML
//! file (`conf/fastlease.yml` unless `--config` says otherwise), `FASTLEASE_`
//! environment variables with `__` between key segments (for example
//! `FASTLEASE_LOCK__MAX_LOCK_TIME_MS`), then command line flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File, FileFormat, Map};
use fastlease_core::{AcquireParams, LockConfig};
use tracing::Level;

use crate::logging::{LogRotation, LoggingConfig};

pub const STORE_DIR_PROPERTY: &str = "store.dir";
pub const MAX_LOCK_TIME_PROPERTY: &str = "lock.max_lock_time_ms";
pub const REFRESH_TIME_PROPERTY: &str = "lock.refresh_time_ms";
pub const VERIFY_DELAY_PROPERTY: &str = "lock.verify_delay_ms";
pub const MAX_JITTER_PROPERTY: &str = "lock.max_jitter_ms";
pub const RETRY_DELAY_PROPERTY: &str = "lock.retry_delay_ms";
pub const LOG_LEVEL_PROPERTY: &str = "log.level";
pub const LOG_CONSOLE_PROPERTY: &str = "log.console";
pub const LOG_FILE_PROPERTY: &str = "log.file";
pub const LOG_DIR_PROPERTY: &str = "log.dir";
pub const LOG_ROTATION_PROPERTY: &str = "log.rotation";

pub const DEFAULT_CONFIG_FILE: &str = "conf/fastlease.yml";
pub const DEFAULT_STORE_DIR: &str = ".fastlease";
pub const DEFAULT_LOG_DIR: &str = "logs";
/// A disk-backed store should not be polled in a tight loop
pub const DEFAULT_CLI_RETRY_DELAY_MS: u64 = 10;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "fastlease", version, about = "Lease-backed locks over a shared directory")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", env = "FASTLEASE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,
    /// Directory holding the lock keys
    #[arg(short = 's', long = "store-dir")]
    pub store_dir: Option<PathBuf>,
    #[arg(long = "max-lock-time-ms")]
    pub max_lock_time_ms: Option<u64>,
    #[arg(long = "refresh-time-ms")]
    pub refresh_time_ms: Option<u64>,
    #[arg(long = "verify-delay-ms")]
    pub verify_delay_ms: Option<u64>,
    #[arg(long = "max-jitter-ms")]
    pub max_jitter_ms: Option<u64>,
    #[arg(long = "retry-delay-ms")]
    pub retry_delay_ms: Option<u64>,
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock and hold it for a while or until interrupted
    Hold {
        name: String,
        /// Hold duration; without it the lock is held until Ctrl-C
        #[arg(long = "hold-ms")]
        hold_ms: Option<u64>,
        /// Give up if the lock is not obtained in time
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
    /// Run a command while holding a lock and exit with its status
    Run {
        name: String,
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Show the announcement and lease of a lock
    Inspect {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Forcibly remove a lock's lease
    Break { name: String },
    /// Race in-process contenders over a store with injected latency
    Simulate {
        #[arg(long, default_value_t = 3)]
        contenders: usize,
        #[arg(long, default_value_t = 5)]
        rounds: usize,
        #[arg(long = "latency-ms", default_value_t = 20)]
        latency_ms: u64,
        #[arg(long = "hold-ms", default_value_t = 50)]
        hold_ms: u64,
    },
}

/// Application configuration loaded from defaults, file, environment and flags
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_sources(cli, None)
    }

    /// Build with an explicit environment map instead of the process environment
    pub fn from_sources(cli: &Cli, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let defaults = LockConfig::default();
        let params = AcquireParams::default();

        let mut builder = Config::builder()
            .set_default(STORE_DIR_PROPERTY, DEFAULT_STORE_DIR)?
            .set_default(MAX_LOCK_TIME_PROPERTY, params.max_lock_time_ms)?
            .set_default(REFRESH_TIME_PROPERTY, params.refresh_time_ms)?
            .set_default(VERIFY_DELAY_PROPERTY, defaults.verify_delay_ms)?
            .set_default(MAX_JITTER_PROPERTY, defaults.max_jitter_ms)?
            .set_default(RETRY_DELAY_PROPERTY, DEFAULT_CLI_RETRY_DELAY_MS)?
            .set_default(LOG_LEVEL_PROPERTY, "info")?
            .set_default(LOG_CONSOLE_PROPERTY, true)?
            .set_default(LOG_FILE_PROPERTY, false)?
            .set_default(LOG_DIR_PROPERTY, DEFAULT_LOG_DIR)?
            .set_default(LOG_ROTATION_PROPERTY, "daily")?
            .add_source(
                File::from(cli.config_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("fastlease")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            );

        if let Some(v) = &cli.store_dir {
            builder = builder.set_override(STORE_DIR_PROPERTY, v.to_string_lossy().into_owned())?;
        }
        if let Some(v) = cli.max_lock_time_ms {
            builder = builder.set_override(MAX_LOCK_TIME_PROPERTY, v)?;
        }
        if let Some(v) = cli.refresh_time_ms {
            builder = builder.set_override(REFRESH_TIME_PROPERTY, v)?;
        }
        if let Some(v) = cli.verify_delay_ms {
            builder = builder.set_override(VERIFY_DELAY_PROPERTY, v)?;
        }
        if let Some(v) = cli.max_jitter_ms {
            builder = builder.set_override(MAX_JITTER_PROPERTY, v)?;
        }
        if let Some(v) = cli.retry_delay_ms {
            builder = builder.set_override(RETRY_DELAY_PROPERTY, v)?;
        }
        if let Some(v) = &cli.log_level {
            builder = builder.set_override(LOG_LEVEL_PROPERTY, v.as_str())?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn store_dir(&self) -> PathBuf {
        self.config
            .get_string(STORE_DIR_PROPERTY)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_DIR))
    }

    // ========================================================================
    // Lock timing
    // ========================================================================

    pub fn lock_config(&self) -> LockConfig {
        let defaults = LockConfig::default();
        LockConfig {
            verify_delay_ms: self
                .config
                .get::<u64>(VERIFY_DELAY_PROPERTY)
                .unwrap_or(defaults.verify_delay_ms),
            max_jitter_ms: self
                .config
                .get::<u64>(MAX_JITTER_PROPERTY)
                .unwrap_or(defaults.max_jitter_ms),
            retry_delay_ms: self
                .config
                .get::<u64>(RETRY_DELAY_PROPERTY)
                .unwrap_or(DEFAULT_CLI_RETRY_DELAY_MS),
        }
    }

    pub fn acquire_params(&self) -> AcquireParams {
        let defaults = AcquireParams::default();
        AcquireParams::new(
            self.config
                .get::<u64>(MAX_LOCK_TIME_PROPERTY)
                .unwrap_or(defaults.max_lock_time_ms),
            self.config
                .get::<u64>(REFRESH_TIME_PROPERTY)
                .unwrap_or(defaults.refresh_time_ms),
        )
    }

    // ========================================================================
    // Logging
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        let level = self
            .config
            .get_string(LOG_LEVEL_PROPERTY)
            .ok()
            .and_then(|v| v.parse::<Level>().ok())
            .unwrap_or(Level::INFO);
        let rotation = self
            .config
            .get_string(LOG_ROTATION_PROPERTY)
            .ok()
            .and_then(|v| LogRotation::parse(&v))
            .unwrap_or(LogRotation::Daily);

        LoggingConfig {
            log_dir: self
                .config
                .get_string(LOG_DIR_PROPERTY)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR)),
            console_output: self.config.get_bool(LOG_CONSOLE_PROPERTY).unwrap_or(true),
            file_logging: self.config.get_bool(LOG_FILE_PROPERTY).unwrap_or(false),
            level,
            rotation,
        }
    }
}
