use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque ID type for sessions
pub type SessionId = String;

/// Placeholder for any visitor field that could not be determined
pub const NOT_AVAILABLE: &str = "N/A";

/// Best-effort IP-derived geolocation snapshot, shaped like the ipinfo.io response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// "lat,lon"
    #[serde(default)]
    pub loc: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "💝 Страница открыта")]
    PageOpened,
    #[serde(rename = "🎁 АДРЕС ПОЛУЧЕН!")]
    AddressReceived,
    #[serde(rename = "⏭ Адрес пропущен")]
    AddressSkipped,
}

/// What a caller knows about an event before it is backfilled from the
/// session's cached location.
///
/// Only [`EventDraft::address_received`] can carry an address.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    kind: EventKind,
    address: Option<String>,
    location: LocationRecord,
    timestamp: String,
}

impl EventDraft {
    pub fn page_opened(location: LocationRecord) -> Self {
        Self {
            kind: EventKind::PageOpened,
            address: None,
            location,
            timestamp: local_timestamp(),
        }
    }

    pub fn address_received(address: String) -> Self {
        Self {
            kind: EventKind::AddressReceived,
            address: Some(address),
            location: LocationRecord::default(),
            timestamp: local_timestamp(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            kind: EventKind::AddressSkipped,
            address: None,
            location: LocationRecord::default(),
            timestamp: local_timestamp(),
        }
    }

    /// Override the capture time (mostly useful for deterministic tests)
    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Build the outbound event. Each location field comes from the draft,
    /// then from `cached`, then falls back to [`NOT_AVAILABLE`]. Empty
    /// strings count as missing.
    pub fn into_event(self, cached: Option<&LocationRecord>) -> VisitorEvent {
        let LocationRecord {
            ip,
            city,
            region,
            country,
            loc,
            org,
        } = self.location;

        VisitorEvent {
            kind: self.kind,
            address: self.address.unwrap_or_default(),
            ip: backfill(ip, cached.map(|c| &c.ip)),
            city: backfill(city, cached.map(|c| &c.city)),
            region: backfill(region, cached.map(|c| &c.region)),
            country: backfill(country, cached.map(|c| &c.country)),
            loc: backfill(loc, cached.map(|c| &c.loc)),
            org: backfill(org, cached.map(|c| &c.org)),
            timestamp: self.timestamp,
        }
    }
}

fn backfill(own: Option<String>, cached: Option<&Option<String>>) -> String {
    own.filter(|v| !v.is_empty())
        .or_else(|| cached.and_then(|c| c.clone()).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Event sent to the notification relay. Lives for one outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub address: String,
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub loc: String,
    pub org: String,
    pub timestamp: String,
}

/// Format a point in time the way `toLocaleString('ru-RU')` does
pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%d.%m.%Y, %H:%M:%S").to_string()
}

pub fn local_timestamp() -> String {
    format_timestamp(&chrono::Local::now())
}
