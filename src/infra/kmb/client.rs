use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::NetworkError;
use crate::fetch::{HttpClient, fetch_json};
use crate::model::Direction;
use crate::services::feed_api::{FeedApi, FeedEnvelope, RawRoute, RawRouteStop, RawStop};

/// Client for the KMB/LWB open data API.
pub struct KmbClient<C> {
    client: C,
    base_url: String,
    bulk_timeout: Duration,
    route_stop_timeout: Duration,
}

impl<C: HttpClient> KmbClient<C> {
    pub fn new(client: C, config: &FeedConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bulk_timeout: config.bulk_timeout(),
            route_stop_timeout: config.route_stop_timeout(),
        }
    }

    fn route_stops_url(&self, route_id: &str, direction: Direction, service_type: i64) -> String {
        format!(
            "{}/route-stop/{}/{}/{}",
            self.base_url,
            route_id,
            direction.feed_name(),
            service_type
        )
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        url: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<Vec<T>, NetworkError> {
        let envelope: FeedEnvelope<serde_json::Value> = fetch_json(&self.client, url, timeout).await?;
        unwrap_envelope(url, expected, envelope)
    }
}

/// Checks the envelope's `type` tag and decodes its records one by one.
///
/// A record with the wrong shape is dropped on its own; the rest of the
/// batch survives.
fn unwrap_envelope<T: DeserializeOwned>(
    url: &str,
    expected: &str,
    envelope: FeedEnvelope<serde_json::Value>,
) -> Result<Vec<T>, NetworkError> {
    if envelope.kind != expected {
        return Err(NetworkError::Malformed {
            url: url.to_string(),
            reason: format!("expected {} envelope, got {}", expected, envelope.kind),
        });
    }

    let total = envelope.data.len();
    let records = envelope
        .data
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(url, error = %e, "Rejected undecodable record");
                None
            }
        })
        .collect::<Vec<_>>();

    if records.len() < total {
        warn!(url, rejected = total - records.len(), total, "Dropped undecodable records");
    }
    debug!(url, records = records.len(), "Decoded {} envelope", expected);
    Ok(records)
}

#[async_trait]
impl<C: HttpClient> FeedApi for KmbClient<C> {
    async fn fetch_routes(&self) -> Result<Vec<RawRoute>, NetworkError> {
        let url = format!("{}/route", self.base_url);
        self.fetch_list(&url, "RouteList", self.bulk_timeout).await
    }

    async fn fetch_stops(&self) -> Result<Vec<RawStop>, NetworkError> {
        let url = format!("{}/stop", self.base_url);
        self.fetch_list(&url, "StopList", self.bulk_timeout).await
    }

    async fn fetch_route_stops(
        &self,
        route_id: &str,
        direction: Direction,
        service_type: i64,
    ) -> Result<Vec<RawRouteStop>, NetworkError> {
        let url = self.route_stops_url(route_id, direction, service_type);
        self.fetch_list(&url, "RouteStopList", self.route_stop_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;

    fn client() -> KmbClient<BasicClient> {
        let config = FeedConfig {
            base_url: "https://data.etabus.gov.hk/v1/transport/kmb/".to_string(),
            ..Default::default()
        };
        KmbClient::new(BasicClient::new().unwrap(), &config)
    }

    #[test]
    fn test_route_stops_url() {
        let kmb = client();
        assert_eq!(
            kmb.route_stops_url("1A", Direction::Inbound, 2),
            "https://data.etabus.gov.hk/v1/transport/kmb/route-stop/1A/inbound/2"
        );
    }

    #[test]
    fn test_unwrap_envelope_checks_type() {
        let body = r#"{ "type": "StopList", "data": [{ "stop": "S1" }] }"#;
        let env: FeedEnvelope<serde_json::Value> = serde_json::from_str(body).unwrap();
        let err = unwrap_envelope::<RawRouteStop>("u", "RouteStopList", env).unwrap_err();
        assert!(matches!(err, NetworkError::Malformed { .. }));
    }

    #[test]
    fn test_unwrap_envelope_returns_records() {
        let body = r#"{
            "type": "RouteStopList",
            "data": [
                { "route": "1", "bound": "O", "service_type": "1", "seq": "1", "stop": "18492910339410B1" },
                { "route": "1", "bound": "O", "service_type": "1", "seq": "2", "stop": "9ED7E93749ABAE67" }
            ]
        }"#;
        let env: FeedEnvelope<serde_json::Value> = serde_json::from_str(body).unwrap();
        let records: Vec<RawRouteStop> = unwrap_envelope("u", "RouteStopList", env).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].stop.as_deref(), Some("9ED7E93749ABAE67"));
    }

    #[test]
    fn test_badly_typed_record_does_not_sink_batch() {
        let body = r#"{
            "type": "StopList",
            "data": [
                { "stop": "S1", "name_en": "FIRST", "lat": "22.3", "long": "114.1" },
                { "stop": 42, "name_en": "NUMERIC ID", "lat": "22.3", "long": "114.1" },
                { "stop": "S3", "name_en": ["NOT", "A", "STRING"] },
                { "stop": "S4", "name_en": "LAST", "lat": 22.31, "long": 114.2 }
            ]
        }"#;
        let env: FeedEnvelope<serde_json::Value> = serde_json::from_str(body).unwrap();
        let records: Vec<RawStop> = unwrap_envelope("u", "StopList", env).unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.stop.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["S1", "S4"]);
    }
}
