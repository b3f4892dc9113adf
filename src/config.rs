//! Runtime configuration.
//!
//! A single [`Config`] is built once at startup and handed to each component's
//! constructor. Every section has defaults describing the Hong Kong KMB
//! network, so a config file only needs the keys it overrides:
//! ```json
//! {
//!   "database": { "path": "data/kmb.db" },
//!   "routing": { "max_waypoints": 10, "timeout_secs": 5 },
//!   "staleness": { "max_age_hours": 12 }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{BoundingBox, RouteType};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bounds: BoundingBox,
    pub feed: FeedConfig,
    pub routing: RoutingConfig,
    pub staleness: StalenessConfig,
    pub integrity: IntegrityConfig,
    pub route_types: RouteTypeRules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/transit.db".to_string(),
        }
    }
}

/// Upstream transit feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// Timeout for the bulk route and stop lists.
    pub bulk_timeout_secs: u64,
    /// Timeout for each per-route stop list.
    pub route_stop_timeout_secs: u64,
    /// Pause between consecutive per-route requests.
    pub request_delay_ms: u64,
    pub operator: String,
}

impl FeedConfig {
    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    pub fn route_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.route_stop_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.etabus.gov.hk/v1/transport/kmb".to_string(),
            bulk_timeout_secs: 30,
            route_stop_timeout_secs: 15,
            request_delay_ms: 100,
            operator: "KMB/LWB".to_string(),
        }
    }
}

/// Routing provider and geometry resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub base_url: String,
    /// Most waypoints the provider accepts in one call.
    pub max_waypoints: usize,
    pub timeout_secs: u64,
    /// Most window calls in flight at once.
    pub max_parallel: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    /// Overall budget for one resolution. `0` disables the deadline.
    pub deadline_secs: u64,
}

impl RoutingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org/route/v1/driving".to_string(),
            max_waypoints: 25,
            timeout_secs: 10,
            max_parallel: 4,
            cache_ttl_secs: 3600,
            cache_max_entries: 512,
            deadline_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub max_age_hours: i64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self { max_age_hours: 24 }
    }
}

/// Record counts below which `validate_integrity` flags a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub min_routes: i64,
    pub min_stops: i64,
    pub min_route_stops: i64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            min_routes: 1,
            min_stops: 1,
            min_route_stops: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuffixRule {
    pub suffix: String,
    pub route_type: RouteType,
}

impl SuffixRule {
    pub fn new(suffix: &str, route_type: RouteType) -> Self {
        Self {
            suffix: suffix.to_string(),
            route_type,
        }
    }
}

/// Tables driving route classification. Suffix rules are evaluated in order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteTypeRules {
    pub circular_keywords: Vec<String>,
    pub suffixes: Vec<SuffixRule>,
}

impl Default for RouteTypeRules {
    fn default() -> Self {
        Self {
            circular_keywords: vec!["CIRCULAR".to_string()],
            suffixes: vec![
                SuffixRule::new("X", RouteType::Express),
                SuffixRule::new("N", RouteType::Night),
                SuffixRule::new("P", RouteType::Peak),
                SuffixRule::new("A", RouteType::Airport),
                SuffixRule::new("E", RouteType::Airport),
                SuffixRule::new("S", RouteType::SpecialService),
                SuffixRule::new("R", RouteType::SpecialService),
                SuffixRule::new("K", RouteType::Special),
                SuffixRule::new("M", RouteType::Special),
            ],
        }
    }
}

impl Config {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{path}: {e}")))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.bounds;
        let finite = [b.min_lat, b.max_lat, b.min_lng, b.max_lng]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::BoundingBox("bounds must be finite".into()));
        }
        if b.min_lat >= b.max_lat || b.min_lng >= b.max_lng {
            return Err(ConfigError::BoundingBox(format!(
                "min must be below max (lat {}..{}, lng {}..{})",
                b.min_lat, b.max_lat, b.min_lng, b.max_lng
            )));
        }
        if b.min_lat < -90.0 || b.max_lat > 90.0 || b.min_lng < -180.0 || b.max_lng > 180.0 {
            return Err(ConfigError::BoundingBox("bounds exceed WGS84 range".into()));
        }

        check_url("feed.base_url", &self.feed.base_url)?;
        check_url("routing.base_url", &self.routing.base_url)?;

        if self.routing.max_waypoints < 2 {
            return Err(ConfigError::Threshold {
                field: "routing.max_waypoints",
                requirement: "at least 2",
            });
        }
        if self.routing.timeout_secs == 0 {
            return Err(ConfigError::Threshold {
                field: "routing.timeout_secs",
                requirement: "positive",
            });
        }
        if self.routing.max_parallel == 0 {
            return Err(ConfigError::Threshold {
                field: "routing.max_parallel",
                requirement: "positive",
            });
        }
        if self.feed.bulk_timeout_secs == 0 || self.feed.route_stop_timeout_secs == 0 {
            return Err(ConfigError::Threshold {
                field: "feed timeouts",
                requirement: "positive",
            });
        }
        if self.staleness.max_age_hours <= 0 {
            return Err(ConfigError::Threshold {
                field: "staleness.max_age_hours",
                requirement: "positive",
            });
        }

        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::Url {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{ "routing": { "max_waypoints": 10 } }"#).unwrap();
        assert_eq!(config.routing.max_waypoints, 10);
        assert_eq!(config.routing.timeout_secs, 10);
        assert_eq!(config.bounds, BoundingBox::default());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = Config::default();
        config.bounds.min_lat = 23.0;
        assert!(matches!(config.validate(), Err(ConfigError::BoundingBox(_))));
    }

    #[test]
    fn test_bad_provider_url_rejected() {
        let mut config = Config::default();
        config.routing.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Url { field: "routing.base_url", .. })
        ));
    }

    #[test]
    fn test_single_waypoint_limit_rejected() {
        let mut config = Config::default();
        config.routing.max_waypoints = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Threshold { .. })));
    }

    #[test]
    fn test_zero_staleness_rejected() {
        let mut config = Config::default();
        config.staleness.max_age_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_route_type_rules_from_json() {
        let config = Config::from_json(
            r#"{ "route_types": {
                "circular_keywords": ["LOOP"],
                "suffixes": [{ "suffix": "S", "route_type": "Special Service" }]
            } }"#,
        )
        .unwrap();
        assert_eq!(config.route_types.circular_keywords, vec!["LOOP"]);
        assert_eq!(
            config.route_types.suffixes,
            vec![SuffixRule::new("S", RouteType::SpecialService)]
        );
    }

    #[test]
    fn test_deadline_zero_disables() {
        let mut routing = RoutingConfig::default();
        routing.deadline_secs = 0;
        assert_eq!(routing.deadline(), None);
    }
}
