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
use serde::Serialize;

use crate::common::MatchState;
use crate::endpoint::Cardinality;

/// A point-in-time view of the fabric's wiring, for diagnostics and tooling.
///
/// ```rust,ignore
/// let text = toml::to_string(&fabric.snapshot())?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WiringSnapshot {
    /// Registered endpoints, ordered by process identifier.
    pub endpoints: Vec<EndpointSnapshot>,
    /// Every known match, ordered by key.
    pub matches: Vec<MatchSnapshot>,
}

/// One registered endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSnapshot {
    /// Process identifier.
    pub pid: String,
    /// Open ports, ordered by name.
    pub ports: Vec<PortSnapshot>,
}

/// One open port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSnapshot {
    /// Port name.
    pub name: String,
    /// Declared cardinality.
    pub cardinality: Cardinality,
    /// Names of the emitted message types.
    pub sends: Vec<String>,
    /// Names of the consumed message types.
    pub accepts: Vec<String>,
    /// Number of matches currently connecting, connected, or disconnecting.
    pub active_connections: usize,
}

/// One match and its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSnapshot {
    /// Left end, written `pid:port`.
    pub left: String,
    /// Right end, written `pid:port`.
    pub right: String,
    /// Current lifecycle state.
    pub state: MatchState,
}

impl WiringSnapshot {
    /// Looks up an endpoint by exact process identifier.
    #[must_use]
    pub fn endpoint(&self, pid: &str) -> Option<&EndpointSnapshot> {
        self.endpoints.iter().find(|endpoint| endpoint.pid == pid)
    }

    /// Number of matches in `state`.
    #[must_use]
    pub fn count_in(&self, state: MatchState) -> usize {
        self.matches.iter().filter(|m| m.state == state).count()
    }
}
