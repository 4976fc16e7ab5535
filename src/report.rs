//! Event Reporter: one best-effort POST of a [`VisitorEvent`] per occurrence.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::config::{env_parse, env_trimmed};
use crate::types::VisitorEvent;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Relay request failed: {0}")]
    Request(String),

    #[error("Relay returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Relay request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid reporter configuration: {0}")]
    Config(String),
}

/// Destination for visitor events
#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn report(&self, event: &VisitorEvent) -> ReportResult<()>;

    /// Name used in logs
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Relay endpoint; `None` means this server's own `/api/notify`
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ReporterConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env_trimmed("NOTIFY_URL"),
            timeout: env_parse("REPORT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        }
    }
}

/// Posts events as JSON to the notification relay
pub struct HttpReporter {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpReporter {
    pub fn new(endpoint: String, timeout: Duration) -> ReportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Config(e.to_string()))?;

        Ok(Self {
            endpoint,
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventReporter for HttpReporter {
    async fn report(&self, event: &VisitorEvent) -> ReportResult<()> {
        let start = Instant::now();

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&self.endpoint).json(event).send(),
        )
        .await
        .map_err(|_| ReportError::Timeout(self.timeout))?
        .map_err(|e| {
            if e.is_timeout() {
                ReportError::Timeout(self.timeout)
            } else {
                ReportError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        // The body only matters for the log line
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ReportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            kind = ?event.kind,
            latency_ms = start.elapsed().as_millis() as u64,
            response = %body,
            "Event delivered to relay"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Single delivery attempt; a failure is logged and reported as `false`,
/// never propagated.
pub async fn report_best_effort(reporter: &dyn EventReporter, event: &VisitorEvent) -> bool {
    match reporter.report(event).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                reporter = reporter.name(),
                kind = ?event.kind,
                "Backend error: {}",
                e
            );
            false
        }
    }
}
