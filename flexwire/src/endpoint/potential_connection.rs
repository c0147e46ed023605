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
use std::fmt;

use crate::common::{Fabric, FabricError, HandshakeOutcome, MatchKey, MatchState};
use crate::endpoint::PortId;

/// A handle on one match, usable to inspect, connect, or disconnect it.
///
/// The handle stays valid after the match is dropped (for instance because one endpoint
/// went away); [`state`](Self::state) then returns `None` and operations fail with
/// [`FabricError::NoMatch`].
#[derive(Clone)]
pub struct PotentialConnection {
    fabric: Fabric,
    key: MatchKey,
}

impl fmt::Debug for PotentialConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PotentialConnection")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

impl PotentialConnection {
    pub(crate) const fn new(fabric: Fabric, key: MatchKey) -> Self {
        Self { fabric, key }
    }

    /// The canonical key of the match.
    #[must_use]
    pub const fn key(&self) -> &MatchKey {
        &self.key
    }

    /// One of the two ends, the left one of the canonical key.
    #[must_use]
    pub const fn either_end(&self) -> &PortId {
        self.key.left()
    }

    /// The end opposite `port`.
    #[must_use]
    pub fn other_end(&self, port: &PortId) -> Option<&PortId> {
        self.key.other_end(port)
    }

    /// The current state, or `None` once the match no longer exists.
    #[must_use]
    pub fn state(&self) -> Option<MatchState> {
        self.fabric.0.registry.lock().state(&self.key)
    }

    /// Whether the match is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == Some(MatchState::Connected)
    }

    /// Whether [`connect`](Self::connect) would start a handshake right now.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.fabric.0.registry.lock().check_connectable(&self.key).is_ok()
    }

    /// Runs the connection handshake.
    ///
    /// # Errors
    ///
    /// See [`Fabric::connect`].
    pub async fn connect(&self) -> Result<HandshakeOutcome, FabricError> {
        self.fabric.connect_match(&self.key).await
    }

    /// Tears the connection down and waits until both handlers were notified.
    ///
    /// # Errors
    ///
    /// See [`Fabric::disconnect`].
    pub async fn disconnect(&self) -> Result<(), FabricError> {
        self.fabric.disconnect_match(&self.key).await
    }
}
