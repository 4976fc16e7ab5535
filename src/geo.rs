//! Visitor geolocation via an ipinfo.io-compatible HTTP service.
//!
//! Lookups are enrichment only: [`resolve_location`] never fails, it logs and
//! returns `None` so the session can continue with "N/A" fields.

use async_trait::async_trait;
use ipnet::IpNet;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::{env_parse, env_trimmed};
use crate::types::LocationRecord;

pub type GeoResult<T> = Result<T, GeoError>;

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Geolocation request failed: {0}")]
    Request(String),

    #[error("Geolocation service returned status {0}")]
    Status(u16),

    #[error("Geolocation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Geolocation response parsing failed: {0}")]
    Parse(String),

    #[error("Invalid geolocation configuration: {0}")]
    Config(String),

    #[error("Private address {0} cannot be located")]
    NonPublic(IpAddr),
}

/// Ranges that a public lookup service can't say anything useful about
const NON_PUBLIC_RANGES: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "::1/128",
    "::/128",
    "fc00::/7",
    "fe80::/10",
];

/// Whether `ip` is worth looking up by address
pub fn is_public(ip: IpAddr) -> bool {
    // Dual-stack sockets report IPv4 peers as ::ffff:a.b.c.d
    let ip = ip.to_canonical();
    !NON_PUBLIC_RANGES
        .iter()
        .filter_map(|range| range.parse::<IpNet>().ok())
        .any(|net| net.contains(&ip))
}

/// Source of location records
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Look up `visitor`, or the caller's own address when `None`
    async fn lookup(&self, visitor: Option<IpAddr>) -> GeoResult<LocationRecord>;
}

#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ipinfo.io".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl GeoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_trimmed("GEO_LOOKUP_URL").unwrap_or(defaults.base_url),
            timeout: env_parse("GEO_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// ipinfo.io client
pub struct IpInfoClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl IpInfoClient {
    pub fn new(config: &GeoConfig) -> GeoResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GeoError::Config(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client,
        })
    }

    /// Public visitors are looked up by address. Loopback visitors (and an
    /// unknown visitor) share the server's egress, so the plain endpoint that
    /// reports the requester is used. Other private addresses can't be located.
    pub fn lookup_url(&self, visitor: Option<IpAddr>) -> GeoResult<String> {
        match visitor.map(|ip| ip.to_canonical()) {
            Some(ip) if is_public(ip) => Ok(format!("{}/{}/json", self.base_url, ip)),
            Some(ip) if !ip.is_loopback() => Err(GeoError::NonPublic(ip)),
            _ => Ok(format!("{}/json", self.base_url)),
        }
    }
}

#[async_trait]
impl GeoLookup for IpInfoClient {
    async fn lookup(&self, visitor: Option<IpAddr>) -> GeoResult<LocationRecord> {
        let url = self.lookup_url(visitor)?;

        let response = tokio::time::timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| GeoError::Timeout(self.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    GeoError::Timeout(self.timeout)
                } else {
                    GeoError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        response
            .json::<LocationRecord>()
            .await
            .map_err(|e| GeoError::Parse(e.to_string()))
    }
}

/// Best-effort lookup: failures are logged and become `None`
pub async fn resolve_location(
    lookup: &dyn GeoLookup,
    visitor: Option<IpAddr>,
) -> Option<LocationRecord> {
    match lookup.lookup(visitor).await {
        Ok(record) => {
            tracing::debug!(
                ip = ?record.ip,
                city = ?record.city,
                country = ?record.country,
                "Visitor location resolved"
            );
            Some(record)
        }
        Err(e) => {
            tracing::warn!("IP detection failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_stub;
    use axum::{http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    struct Failing;

    #[async_trait]
    impl GeoLookup for Failing {
        async fn lookup(&self, _visitor: Option<IpAddr>) -> GeoResult<LocationRecord> {
            Err(GeoError::Timeout(Duration::from_secs(5)))
        }
    }

    fn client() -> IpInfoClient {
        IpInfoClient::new(&GeoConfig {
            base_url: "https://ipinfo.example/".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_public_addresses() {
        assert!(is_public("84.54.70.1".parse().unwrap()));
        assert!(is_public("2001:4860:4860::8888".parse().unwrap()));
        assert!(is_public("::ffff:84.54.70.1".parse().unwrap()));

        assert!(!is_public("127.0.0.1".parse().unwrap()));
        assert!(!is_public("10.1.2.3".parse().unwrap()));
        assert!(!is_public("172.20.0.5".parse().unwrap()));
        assert!(!is_public("192.168.1.10".parse().unwrap()));
        assert!(!is_public("::1".parse().unwrap()));
        assert!(!is_public("fd12:3456::1".parse().unwrap()));
        assert!(!is_public("fe80::1".parse().unwrap()));

        // IPv4 peers seen through a dual-stack listener
        assert!(!is_public("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_public("::ffff:192.168.1.10".parse().unwrap()));
        assert!(!is_public("::ffff:10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_lookup_url() {
        let client = client();

        assert_eq!(
            client.lookup_url(Some("84.54.70.1".parse().unwrap())).unwrap(),
            "https://ipinfo.example/84.54.70.1/json"
        );
        assert_eq!(
            client.lookup_url(Some("::ffff:84.54.70.1".parse().unwrap())).unwrap(),
            "https://ipinfo.example/84.54.70.1/json"
        );
        assert_eq!(client.lookup_url(None).unwrap(), "https://ipinfo.example/json");
        assert_eq!(
            client.lookup_url(Some("127.0.0.1".parse().unwrap())).unwrap(),
            "https://ipinfo.example/json"
        );
        assert_eq!(
            client.lookup_url(Some("::ffff:127.0.0.1".parse().unwrap())).unwrap(),
            "https://ipinfo.example/json"
        );
    }

    #[test]
    fn test_private_visitor_is_not_located() {
        let client = client();

        let result = client.lookup_url(Some("192.168.0.2".parse().unwrap()));
        assert!(matches!(result, Err(GeoError::NonPublic(ip)) if ip == "192.168.0.2".parse::<IpAddr>().unwrap()));

        let result = client.lookup_url(Some("::ffff:10.0.0.7".parse().unwrap()));
        assert!(matches!(result, Err(GeoError::NonPublic(_))));
    }

    #[tokio::test]
    async fn test_private_visitor_resolves_to_none() {
        let record = resolve_location(&client(), Some("172.18.0.4".parse().unwrap())).await;
        assert!(record.is_none());
    }

    fn stub_client(addr: SocketAddr, timeout: Duration) -> IpInfoClient {
        IpInfoClient::new(&GeoConfig {
            base_url: format!("http://{}", addr),
            timeout,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_parses_record() {
        let addr = serve_stub(Router::new().route(
            "/json",
            get(|| async { r#"{"ip":"84.54.70.1","city":"Tashkent","country":"UZ","postal":"100000"}"# }),
        ))
        .await;
        let client = stub_client(addr, Duration::from_secs(2));

        let record = client.lookup(None).await.unwrap();
        assert_eq!(record.ip.as_deref(), Some("84.54.70.1"));
        assert_eq!(record.city.as_deref(), Some("Tashkent"));
        assert!(record.loc.is_none());
    }

    #[tokio::test]
    async fn test_lookup_server_error() {
        let addr = serve_stub(Router::new().route(
            "/json",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        ))
        .await;
        let client = stub_client(addr, Duration::from_secs(2));

        assert!(matches!(client.lookup(None).await, Err(GeoError::Status(500))));
        assert!(resolve_location(&client, None).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_malformed_body() {
        let addr = serve_stub(Router::new().route("/json", get(|| async { "not json" }))).await;
        let client = stub_client(addr, Duration::from_secs(2));

        assert!(matches!(client.lookup(None).await, Err(GeoError::Parse(_))));
        assert!(resolve_location(&client, None).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_timeout() {
        let addr = serve_stub(Router::new().route(
            "/json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        ))
        .await;
        let timeout = Duration::from_millis(200);
        let client = stub_client(addr, timeout);

        assert!(matches!(
            client.lookup(None).await,
            Err(GeoError::Timeout(t)) if t == timeout
        ));
        assert!(resolve_location(&client, None).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = stub_client(SocketAddr::from(([127, 0, 0, 1], port)), Duration::from_secs(2));

        assert!(matches!(client.lookup(None).await, Err(GeoError::Request(_))));
        assert!(resolve_location(&client, None).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_location_swallows_failure() {
        let record = resolve_location(&Failing, Some("84.54.70.1".parse().unwrap())).await;
        assert!(record.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = GeoConfig::default();
        assert_eq!(config.base_url, "https://ipinfo.io");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
