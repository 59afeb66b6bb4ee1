use thiserror::Error;

use crate::domain::{NodeConfig, RoutingConfig};
use crate::ports::ConfigProvider;

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        error: String,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// The file parsed but a value is out of range or malformed.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// StaticConfigProvider - Hardcoded config for tests and embedding
// ============================================================================

/// Configuration provider holding fixed values.
///
/// For deployments, use `TomlConfigProvider`.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    node: NodeConfig,
    routing: RoutingConfig,
}

impl StaticConfigProvider {
    #[must_use]
    pub fn new(node: NodeConfig) -> Self {
        Self {
            node,
            routing: RoutingConfig::default(),
        }
    }

    #[must_use]
    pub fn with_routing_config(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    #[must_use]
    pub fn with_public_endpoints(mut self, endpoints: Vec<std::net::SocketAddr>) -> Self {
        self.node.public_endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_first_node(mut self, first_node: bool) -> Self {
        self.node.first_node = first_node;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn node_config(&self) -> NodeConfig {
        self.node.clone()
    }

    fn routing_config(&self) -> RoutingConfig {
        self.routing.clone()
    }
}

// ============================================================================
// TomlConfigProvider - File based config (requires "network" feature)
// ============================================================================

#[cfg(feature = "network")]
mod toml_config {
    use super::*;
    use crate::domain::{parse_endpoint_list, NodeId, ServiceType, ROOT_SERVICE_TYPE};
    use serde::Deserialize;
    use std::fs;
    use std::net::{IpAddr, SocketAddr};
    use std::path::Path;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct ConfigFile {
        #[serde(default)]
        node: NodeSection,
        #[serde(default)]
        routing: RoutingSection,
    }

    #[derive(Debug, Deserialize, Default)]
    struct NodeSection {
        #[serde(default)]
        first_node: bool,
        local_ip: Option<String>,
        local_port: Option<u16>,
        #[serde(default)]
        public_endpoints: String,
        node_id: Option<String>,
        zone_id: Option<u32>,
        country: Option<String>,
        #[serde(default)]
        client_mode: bool,
        service_type: Option<ServiceType>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct RoutingSection {
        k: Option<usize>,
        alpha: Option<usize>,
        alpha_random: Option<usize>,
        closest_nodes_num: Option<usize>,
        hop_to_live: Option<u32>,
        heartbeat_period_ms: Option<u64>,
        rejoin_period_ms: Option<u64>,
        find_neighbours_period_ms: Option<u64>,
        join_initial_wait_secs: Option<u64>,
        join_max_wait_secs: Option<u64>,
        join_retry_times: Option<u32>,
        detection_period_ms: Option<u64>,
        detection_times: Option<u32>,
        detected_threshold: Option<u32>,
        cone_abnormal_delay_count: Option<u32>,
        heartbeat_first_timeout_secs: Option<u64>,
        heartbeat_second_timeout_secs: Option<u64>,
        heartbeat_max_count: Option<u32>,
    }

    /// TOML-based configuration provider.
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// [node]
    /// first_node = false
    /// local_ip = "0.0.0.0"
    /// local_port = 9000
    /// public_endpoints = "10.0.0.1:9000,10.0.0.2:9000"
    /// service_type = 0
    ///
    /// [routing]
    /// k = 8
    /// heartbeat_period_ms = 1000
    /// join_max_wait_secs = 128
    /// ```
    ///
    /// Every `[routing]` key is optional and falls back to
    /// [`RoutingConfig::default`].
    #[derive(Debug, Clone)]
    pub struct TomlConfigProvider {
        node: NodeConfig,
        routing: RoutingConfig,
    }

    impl TomlConfigProvider {
        /// Load configuration from a TOML file.
        ///
        /// # Errors
        ///
        /// Returns error if file cannot be read, parsed or validated.
        pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
            let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
                path: path.as_ref().display().to_string(),
                error: e.to_string(),
            })?;

            Self::parse(&content)
        }

        /// Parse configuration from a TOML string.
        pub fn parse(content: &str) -> Result<Self, ConfigError> {
            let file: ConfigFile =
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

            let node = Self::node_config(file.node)?;
            let routing = Self::routing_config(file.routing)?;
            Ok(Self { node, routing })
        }

        fn node_config(section: NodeSection) -> Result<NodeConfig, ConfigError> {
            let ip: IpAddr = match section.local_ip.as_deref() {
                Some(ip) => ip
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("local_ip {ip:?}")))?,
                None => IpAddr::from([0, 0, 0, 0]),
            };
            let local_addr = SocketAddr::new(ip, section.local_port.unwrap_or(0));

            let node_id = section
                .node_id
                .as_deref()
                .map(|hex_id| {
                    hex::decode(hex_id)
                        .ok()
                        .and_then(|bytes| NodeId::from_slice(&bytes))
                        .ok_or_else(|| ConfigError::Invalid(format!("node_id {hex_id:?}")))
                })
                .transpose()?;

            let public_endpoints = parse_endpoint_list(&section.public_endpoints);
            if !section.first_node && public_endpoints.is_empty() {
                tracing::warn!("[kad] no public endpoints configured, join will fail");
            }

            Ok(NodeConfig {
                node_id,
                first_node: section.first_node,
                local_addr,
                public_endpoints,
                zone_id: section.zone_id,
                country: section.country,
                client_mode: section.client_mode,
                service_type: section.service_type.unwrap_or(ROOT_SERVICE_TYPE),
            })
        }

        fn routing_config(section: RoutingSection) -> Result<RoutingConfig, ConfigError> {
            let defaults = RoutingConfig::default();
            let ms = |value: Option<u64>, default: Duration| {
                value.map_or(default, Duration::from_millis)
            };
            let secs = |value: Option<u64>, default: Duration| {
                value.map_or(default, Duration::from_secs)
            };

            let config = RoutingConfig {
                k: section.k.unwrap_or(defaults.k),
                alpha: section.alpha.unwrap_or(defaults.alpha),
                alpha_random: section.alpha_random.unwrap_or(defaults.alpha_random),
                closest_nodes_num: section
                    .closest_nodes_num
                    .unwrap_or(defaults.closest_nodes_num),
                hop_to_live: section.hop_to_live.unwrap_or(defaults.hop_to_live),
                heartbeat_period: ms(section.heartbeat_period_ms, defaults.heartbeat_period),
                rejoin_period: ms(section.rejoin_period_ms, defaults.rejoin_period),
                find_neighbours_period: ms(
                    section.find_neighbours_period_ms,
                    defaults.find_neighbours_period,
                ),
                join_initial_wait: secs(section.join_initial_wait_secs, defaults.join_initial_wait),
                join_max_wait: secs(section.join_max_wait_secs, defaults.join_max_wait),
                join_retry_times: section.join_retry_times.unwrap_or(defaults.join_retry_times),
                detection_period: ms(section.detection_period_ms, defaults.detection_period),
                detection_times: section.detection_times.unwrap_or(defaults.detection_times),
                detected_threshold: section
                    .detected_threshold
                    .unwrap_or(defaults.detected_threshold),
                cone_abnormal_delay_count: section
                    .cone_abnormal_delay_count
                    .unwrap_or(defaults.cone_abnormal_delay_count),
                heartbeat_first_timeout: secs(
                    section.heartbeat_first_timeout_secs,
                    defaults.heartbeat_first_timeout,
                ),
                heartbeat_second_timeout: secs(
                    section.heartbeat_second_timeout_secs,
                    defaults.heartbeat_second_timeout,
                ),
                heartbeat_max_count: section
                    .heartbeat_max_count
                    .unwrap_or(defaults.heartbeat_max_count),
            };

            if config.k == 0 {
                return Err(ConfigError::Invalid("k must be positive".into()));
            }
            if config.heartbeat_period.is_zero() || config.detection_period.is_zero() {
                return Err(ConfigError::Invalid("timer periods must be positive".into()));
            }
            if config.join_initial_wait > config.join_max_wait {
                return Err(ConfigError::Invalid(
                    "join_initial_wait_secs exceeds join_max_wait_secs".into(),
                ));
            }
            Ok(config)
        }
    }

    impl ConfigProvider for TomlConfigProvider {
        fn node_config(&self) -> NodeConfig {
            self.node.clone()
        }

        fn routing_config(&self) -> RoutingConfig {
            self.routing.clone()
        }
    }
}

#[cfg(feature = "network")]
pub use toml_config::TomlConfigProvider;
