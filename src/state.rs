use std::net::IpAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::geo::{GeoConfig, GeoError, GeoLookup, IpInfoClient};
use crate::relay::{Relay, RelayError};
use crate::report::{EventReporter, HttpReporter, ReportError, ReporterConfig};
use crate::session::{AudioController, AudioOutput, SessionConfig, SessionController};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Shared application state: what every session is built from
pub struct AppState {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub geo: Arc<dyn GeoLookup>,
    pub reporter: Arc<dyn EventReporter>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(
        server: ServerConfig,
        session: SessionConfig,
        geo: Arc<dyn GeoLookup>,
        reporter: Arc<dyn EventReporter>,
        relay: Relay,
    ) -> Self {
        Self {
            server,
            session,
            geo,
            reporter,
            relay: Arc::new(relay),
        }
    }

    pub fn from_env() -> Result<Self, StartupError> {
        let server = ServerConfig::from_env();
        let session = SessionConfig::from_env();

        let geo = IpInfoClient::new(&GeoConfig::from_env())?;

        let reporter_config = ReporterConfig::from_env();
        let endpoint = reporter_config
            .endpoint
            .unwrap_or_else(|| server.local_notify_url());
        let reporter = HttpReporter::new(endpoint, reporter_config.timeout)?;
        tracing::info!(endpoint = %reporter.endpoint(), "Reporting visitor events");

        let relay = Relay::from_env()?;

        Ok(Self::new(
            server,
            session,
            Arc::new(geo),
            Arc::new(reporter),
            relay,
        ))
    }

    /// Fresh session context for one page load
    pub fn new_session(
        &self,
        visitor_ip: Option<IpAddr>,
        audio: Option<Arc<dyn AudioOutput>>,
    ) -> SessionController {
        SessionController::new(
            visitor_ip,
            self.geo.clone(),
            self.reporter.clone(),
            AudioController::new(audio),
            self.session.clone(),
        )
    }
}
