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
use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::common::TypeHierarchy;
use crate::endpoint::{PortDescriptor, PortId};
use crate::message::MessageType;

/// The lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    /// Compatible, never connected.
    Matched,
    /// A handshake is running.
    Connecting,
    /// Both sides accepted; messages flow.
    Connected,
    /// Teardown is waiting for both disconnect notices.
    Disconnecting,
    /// Was connected or refused; may be connected again.
    Disconnected,
}

impl MatchState {
    /// Whether the match occupies its ports for cardinality purposes.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Disconnecting)
    }

    /// Whether a handshake may start from this state.
    #[must_use]
    pub const fn allows_connect(self) -> bool {
        matches!(self, Self::Matched | Self::Disconnected)
    }
}

/// The canonical identity of a match: its two ports, lexicographically ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MatchKey {
    left: PortId,
    right: PortId,
}

impl MatchKey {
    /// Builds the key for two ports given in any order.
    #[must_use]
    pub fn new(a: PortId, b: PortId) -> Self {
        if a <= b {
            Self { left: a, right: b }
        } else {
            Self { left: b, right: a }
        }
    }

    /// The lexicographically smaller end.
    #[must_use]
    pub const fn left(&self) -> &PortId {
        &self.left
    }

    /// The lexicographically larger end.
    #[must_use]
    pub const fn right(&self) -> &PortId {
        &self.right
    }

    /// The end opposite `port`, or `None` if `port` is not part of this match.
    #[must_use]
    pub fn other_end(&self, port: &PortId) -> Option<&PortId> {
        if port == &self.left {
            Some(&self.right)
        } else if port == &self.right {
            Some(&self.left)
        } else {
            None
        }
    }

    /// Whether `port` is one of the two ends.
    #[must_use]
    pub fn involves(&self, port: &PortId) -> bool {
        self.other_end(port).is_some()
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.left, self.right)
    }
}

/// A port's types resolved against the hierarchy at registration time.
///
/// For every sent type it keeps the full set of types the payload may be delivered as,
/// so matching only needs set lookups.
#[derive(Debug, Clone, Default)]
pub(crate) struct Signature {
    deliverable_as: Vec<BTreeSet<MessageType>>,
    accepts: BTreeSet<MessageType>,
}

impl Signature {
    pub(crate) fn compute(descriptor: &PortDescriptor, hierarchy: &TypeHierarchy) -> Self {
        Self {
            deliverable_as: descriptor
                .sent_types()
                .map(|sent| hierarchy.assignable_targets(sent))
                .collect(),
            accepts: descriptor.accepted_types().collect(),
        }
    }

    /// Whether every type this port sends is accepted by `receiver`.
    fn fits_into(&self, receiver: &Self) -> bool {
        self.deliverable_as
            .iter()
            .all(|targets| !targets.is_disjoint(&receiver.accepts))
    }

    /// Two ports match when each accepts everything the other sends.
    ///
    /// A port that sends nothing fits any receiver.
    pub(crate) fn is_compatible(&self, other: &Self) -> bool {
        self.fits_into(other) && other.fits_into(self)
    }
}
