//! Load harness for LCP license servers.
//!
//! Repeatedly notifies a license server that a freshly encrypted publication is available,
//! at a fixed cadence and for a fixed duration, and counts how many notifications were
//! accepted. Several instances are meant to run side by side against the same server to
//! reproduce the TLS handshake timeouts seen when many encryption tools notify at once.
//!
//! ```text
//! Scheduler (ticker) ──tick──▶ Dispatcher ──build──▶ NotificationBuilder
//!        │                         │
//!        │                         └──PUT /contents/<id>──▶ HttpClient
//!        └──────── Tally ◀── classify (2xx / 302 = accepted)
//! ```
//!
//! # Example
//! ```ignore
//! use lcpstress::{Config, run};
//!
//! let mut config = Config::default();
//! config.url = Some("https://lcp.example.com:8989".to_string());
//!
//! let report = run(&config).await?;
//! println!("{report}");
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod notification;
pub mod report;
pub mod scheduler;
pub mod telemetry;

#[cfg(test)]
mod test;

use std::sync::Arc;

// Re-export commonly used types
pub use config::{Args, Config, Credentials, DispatchMode, PayloadConfig};
pub use dispatcher::{Accepted, Dispatch, Dispatcher};
pub use error::{Result, StressError};
pub use http::{HttpClient, HttpResponse, MockHttpClient, NotifyRequest, ReqwestHttpClient};
pub use notification::{EncryptionNotification, NotificationBuilder, Problem};
pub use report::{RunReport, Tally};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState};

/// Run one complete test against the configured server.
///
/// Fails with [`StressError::Configuration`] before any call is attempted when the
/// configuration is incomplete.
pub async fn run(config: &Config) -> Result<RunReport> {
    config.validate()?;
    let server_url = config.server_url()?;

    let http_client = ReqwestHttpClient::new(config.request_timeout())?;
    let builder = NotificationBuilder::new(config.payload.clone(), config.key_size);
    let dispatcher = Dispatcher::new(
        http_client,
        builder,
        server_url,
        config.credentials.clone(),
    );

    tracing::info!(
        url = %server_url,
        tick_ms = config.tick_ms,
        testtime_ms = config.testtime_ms,
        mode = ?config.dispatch_mode,
        "Starting notification run"
    );

    let scheduler = Scheduler::new(Arc::new(dispatcher), config.scheduler())?;
    Ok(scheduler.run().await)
}
