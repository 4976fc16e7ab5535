//! Test doubles shared by the unit tests

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::geo::{GeoError, GeoLookup, GeoResult};
use crate::report::{EventReporter, ReportError, ReportResult};
use crate::types::{EventKind, LocationRecord, VisitorEvent};

/// Keeps every event it is handed
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<VisitorEvent>>,
}

impl RecordingReporter {
    pub async fn events(&self) -> Vec<VisitorEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

#[async_trait]
impl EventReporter for RecordingReporter {
    async fn report(&self, event: &VisitorEvent) -> ReportResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn recording_reporter() -> Arc<RecordingReporter> {
    Arc::new(RecordingReporter::default())
}

struct FailingReporter;

#[async_trait]
impl EventReporter for FailingReporter {
    async fn report(&self, _event: &VisitorEvent) -> ReportResult<()> {
        Err(ReportError::Request("dns error".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub fn failing_reporter() -> Arc<dyn EventReporter> {
    Arc::new(FailingReporter)
}

pub struct FixedGeo(pub LocationRecord);

impl FixedGeo {
    pub fn tashkent() -> Self {
        Self(LocationRecord {
            ip: Some("84.54.70.1".to_string()),
            city: Some("Tashkent".to_string()),
            region: Some("Tashkent".to_string()),
            country: Some("UZ".to_string()),
            loc: Some("41.2646,69.2163".to_string()),
            org: Some("AS8193 Uzbektelekom".to_string()),
        })
    }
}

#[async_trait]
impl GeoLookup for FixedGeo {
    async fn lookup(&self, _visitor: Option<IpAddr>) -> GeoResult<LocationRecord> {
        Ok(self.0.clone())
    }
}

pub struct UnreachableGeo;

#[async_trait]
impl GeoLookup for UnreachableGeo {
    async fn lookup(&self, _visitor: Option<IpAddr>) -> GeoResult<LocationRecord> {
        Err(GeoError::Timeout(Duration::from_secs(5)))
    }
}

/// Serve `app` on a loopback port for the lifetime of the test runtime
pub async fn serve_stub(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
