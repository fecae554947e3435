//! Harness configuration.
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **Defaults** - the values of [`Config::default`]
//! 2. **YAML config file** - `lcpstress.yaml` unless `-f` or `LCPSTRESS_CONFIG` says otherwise;
//!    a missing file is not an error
//! 3. **Environment variables** - prefixed with `LCPSTRESS_`, nested keys split on `__`
//!    (e.g. `LCPSTRESS_CREDENTIALS__USERNAME=admin`)
//! 4. **Command line flags** - only the flags actually given
//!
//! ## Example
//!
//! ```yaml
//! url: https://lcp.example.com:8989
//! tick_ms: 50
//! testtime_ms: 10000
//! dispatch_mode: concurrent
//! grace_period_ms: 2000
//! credentials:
//!   username: admin
//!   password: secret
//! ```

use clap::{Parser, ValueEnum};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Result, StressError};
use crate::scheduler::SchedulerConfig;

/// Command line arguments. Every flag is optional so that it only overrides
/// file and environment values when given.
#[derive(Parser, Debug, Default, Serialize)]
#[command(author, version, about = "Flood an LCP license server with encryption notifications", long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "LCPSTRESS_CONFIG", default_value = "lcpstress.yaml")]
    #[serde(skip)]
    pub config: PathBuf,

    /// LCP License Server URL
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Tick time in ms, 100 ms default
    #[arg(long = "tick", value_name = "MS")]
    #[serde(rename = "tick_ms", skip_serializing_if = "Option::is_none")]
    pub tick_ms: Option<u64>,

    /// Test time in ms, 4100 ms default
    #[arg(long = "testtime", value_name = "MS")]
    #[serde(rename = "testtime_ms", skip_serializing_if = "Option::is_none")]
    pub testtime_ms: Option<u64>,

    /// Client-side request timeout in ms. Unset by default: the stalled handshake is what we measure
    #[arg(long = "timeout", value_name = "MS")]
    #[serde(rename = "timeout_ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Whether ticks wait for the previous call or spawn independent calls
    #[arg(long = "mode", value_enum)]
    #[serde(rename = "dispatch_mode", skip_serializing_if = "Option::is_none")]
    pub dispatch_mode: Option<DispatchMode>,

    /// How long to wait for in-flight calls after the test time, concurrent mode only
    #[arg(long = "grace", value_name = "MS")]
    #[serde(rename = "grace_period_ms", skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,
}

/// How ticks hand work to the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each tick runs the whole exchange before the next tick is taken
    #[default]
    Serial,
    /// Each tick spawns its exchange and returns to the timer immediately
    Concurrent,
}

/// Basic auth credentials presented to the license server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "laurent".to_string(),
            password: "laurent".to_string(),
        }
    }
}

/// Placeholder values describing a typical encrypted EPUB package.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PayloadConfig {
    /// Prefix of the generated file name
    pub file_prefix: String,
    /// Base URL the file name is appended to for `protected-content-location`
    pub output_base_url: String,
    /// Reported size of the encrypted package in bytes
    pub size: i64,
    /// Reported SHA-256 of the encrypted package, hex encoded
    pub checksum: String,
    /// MIME type; omitted from the payload when empty
    pub content_type: String,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            file_prefix: "test-".to_string(),
            output_base_url: "http://edrlab.org/encrypted/".to_string(),
            size: 65_348_042,
            checksum: "3d2a8964075bd2064d4234ab03ec9da0f96006d8058142301d58c9c1350b6717".to_string(),
            content_type: "application/epub+zip".to_string(),
        }
    }
}

/// Main harness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the license server (required)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Interval between dispatch attempts
    pub tick_ms: u64,
    /// Total run duration before stopping
    pub testtime_ms: u64,
    /// Optional client-side timeout for each call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub dispatch_mode: DispatchMode,
    /// Wait for stragglers after stop, concurrent mode only
    pub grace_period_ms: u64,
    /// Content key length in bytes
    pub key_size: usize,
    pub credentials: Credentials,
    pub payload: PayloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            tick_ms: 100,
            testtime_ms: 4100,
            timeout_ms: None,
            dispatch_mode: DispatchMode::Serial,
            grace_period_ms: 0,
            key_size: 16,
            credentials: Credentials::default(),
            payload: PayloadConfig::default(),
        }
    }
}

impl Config {
    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("LCPSTRESS_").ignore(&["config"]).split("__"))
            .merge(Serialized::defaults(args))
    }

    /// Load configuration from file, environment and flags. Completeness is checked
    /// separately by [`Config::validate`] so callers can report it on the console.
    pub fn load(args: &Args) -> std::result::Result<Self, figment::Error> {
        Self::figment(args).extract()
    }

    pub fn validate(&self) -> Result<()> {
        self.server_url()?;

        if self.tick_ms == 0 {
            return Err(StressError::Configuration("tick must be greater than 0 ms".to_string()));
        }
        if self.key_size == 0 {
            return Err(StressError::Configuration("key_size must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// The server base URL, or the configuration error reported when it is missing.
    pub fn server_url(&self) -> Result<&str> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(StressError::Configuration("url param is required".to_string())),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_millis(self.tick_ms),
            test_time: Duration::from_millis(self.testtime_ms),
            mode: self.dispatch_mode,
            grace_period: Duration::from_millis(self.grace_period_ms),
        }
    }
}
