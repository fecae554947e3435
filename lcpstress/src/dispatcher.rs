//! One notification exchange per tick: build, PUT, classify.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Credentials;
use crate::error::{Result, StressError};
use crate::http::{HttpClient, NotifyRequest};
use crate::notification::{NotificationBuilder, Problem};
use crate::report;

/// A notification the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub content_id: Uuid,
    pub status: u16,
    /// Time spent in the HTTP exchange, handshake included
    pub latency: Duration,
}

/// Whatever the scheduler fires on each tick.
///
/// Anything other than `Ok` is a failed call: the scheduler reports it and moves on.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, fired_at: DateTime<Utc>) -> Result<Accepted>;
}

/// The server accepted the notification: 302 or any 2xx.
pub fn is_success(status: u16) -> bool {
    status == 302 || (200..300).contains(&status)
}

/// Notifies a license server of synthetic encrypted publications.
pub struct Dispatcher<H>
where
    H: HttpClient,
{
    http_client: H,
    builder: NotificationBuilder,
    server_url: String,
    credentials: Credentials,
}

impl<H> Dispatcher<H>
where
    H: HttpClient,
{
    pub fn new(
        http_client: H,
        builder: NotificationBuilder,
        server_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let server_url: String = server_url.into();
        Self {
            http_client,
            builder,
            server_url: server_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn content_url(&self, content_id: &Uuid) -> String {
        format!("{}/contents/{}", self.server_url, content_id)
    }
}

#[async_trait]
impl<H> Dispatch for Dispatcher<H>
where
    H: HttpClient,
{
    #[tracing::instrument(skip(self), fields(content_id = tracing::field::Empty))]
    async fn dispatch(&self, fired_at: DateTime<Utc>) -> Result<Accepted> {
        let content_id = Uuid::new_v4();
        tracing::Span::current().record("content_id", tracing::field::display(&content_id));

        let notification = self.builder.build(content_id, fired_at)?;
        let request = NotifyRequest {
            url: self.content_url(&content_id),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            body: notification.to_json()?,
        };

        let started = Instant::now();
        let response = self.http_client.put(&request).await?;
        let latency = started.elapsed();

        if is_success(response.status) {
            tracing::debug!(
                status = response.status,
                latency_ms = latency.as_millis() as u64,
                "Notification accepted"
            );
            return Ok(Accepted {
                content_id,
                status: response.status,
                latency,
            });
        }

        let problem = match Problem::parse(&response.body) {
            Ok(problem) => problem,
            Err(e) => {
                report::response_unparseable(&e);
                Problem::default()
            }
        };

        tracing::warn!(
            status = response.status,
            detail = problem.detail(),
            latency_ms = latency.as_millis() as u64,
            "Notification rejected"
        );

        Err(StressError::Server {
            status: response.status,
            detail: problem.detail().to_string(),
        })
    }
}
