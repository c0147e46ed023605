/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::endpoint::PortId;

/// Configuration for a fabric instance.
///
/// Loaded from TOML files in XDG-compliant directories by [`FabricConfig::load`]. Every
/// field has a default, so a partial file only overrides what it names.
///
/// ```toml
/// [timeouts]
/// disconnect_ms = 5000
/// shutdown_ms = 30000
///
/// [wiring]
/// auto_connect = false
/// active_connections = ["rm-battery:flex-cem:devices"]
///
/// [runtime]
/// worker_threads = 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Declarative wiring applied at launch and on every registration
    pub wiring: WiringConfig,
    /// Settings for a runtime provisioned by the fabric itself
    pub runtime: RuntimeConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on each disconnect barrier run by endpoint removal, in milliseconds
    pub disconnect_ms: u64,
    /// Graceful shutdown budget before in-flight work is cancelled, in milliseconds
    pub shutdown_ms: u64,
}

/// Declarative wiring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// Connections to establish as soon as both ends exist,
    /// written `pidA:portA-pidB:portB`
    pub active_connections: Vec<String>,
    /// Connect unambiguous single-cardinality matches after every registration
    pub auto_connect: bool,
}

/// Runtime provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for an owned multi-thread runtime
    pub worker_threads: usize,
    /// Thread name prefix for an owned runtime
    pub thread_name: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            disconnect_ms: 5_000,
            shutdown_ms: 30_000,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            thread_name: "flexwire-worker".to_string(),
        }
    }
}

impl FabricConfig {
    /// Disconnect barrier bound as a `Duration`
    pub const fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.disconnect_ms)
    }

    /// Graceful shutdown budget as a `Duration`
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.shutdown_ms)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text is malformed or a field has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `flexwire/config.toml` under `$XDG_CONFIG_HOME` and then the XDG
    /// system directories. A missing file yields the defaults. A file that cannot be
    /// read or parsed is logged and also yields the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("flexwire") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => match Self::from_toml_str(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration");
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Configuration loaded once per process from XDG-compliant locations, used by every
    /// fabric launched without an explicit configuration
    pub(crate) static ref CONFIG: FabricConfig = FabricConfig::load();
}

impl WiringConfig {
    /// The configured connections as port pairs. Malformed entries are logged and skipped.
    pub fn connection_pairs(&self) -> Vec<(PortId, PortId)> {
        self.active_connections
            .iter()
            .filter_map(|entry| {
                let parsed = parse_connection(entry);
                if parsed.is_none() {
                    warn!("Ignoring malformed active connection '{}'", entry);
                }
                parsed
            })
            .collect()
    }
}

/// Parses `pidA:portA-pidB:portB`.
///
/// The first `:` ends the first pid, the following `-` ends the first port, and the
/// next `:` ends the second pid, so pids may contain `-` but port names may not.
fn parse_connection(entry: &str) -> Option<(PortId, PortId)> {
    let (pid_a, rest) = entry.trim().split_once(':')?;
    let (port_a, rest) = rest.split_once('-')?;
    let (pid_b, port_b) = rest.split_once(':')?;
    if [pid_a, port_a, pid_b, port_b].iter().any(|part| part.is_empty()) {
        return None;
    }
    Some((PortId::new(pid_a, port_a), PortId::new(pid_b, port_b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_the_remaining_defaults() {
        let config = FabricConfig::from_toml_str(
            r#"
            [timeouts]
            disconnect_ms = 250

            [wiring]
            auto_connect = true
            "#,
        )
        .unwrap();

        assert_eq!(config.timeouts.disconnect_ms, 250);
        assert_eq!(config.timeouts.shutdown_ms, 30_000);
        assert!(config.wiring.auto_connect);
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.disconnect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_files_are_rejected() {
        assert!(FabricConfig::from_toml_str("[timeouts]\ndisconnect_ms = \"soon\"").is_err());
    }

    #[test]
    fn active_connections_parse_into_port_pairs() {
        let wiring = WiringConfig {
            active_connections: vec![
                "rm-battery:flex-cem:devices".to_string(),
                "no-separator".to_string(),
                "a:b-:c".to_string(),
            ],
            auto_connect: false,
        };

        let pairs = wiring.connection_pairs();
        assert_eq!(
            pairs,
            vec![(PortId::new("rm-battery", "flex"), PortId::new("cem", "devices"))]
        );
    }
}
