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
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::iter;

use serde::{Deserialize, Serialize};

use crate::common::FabricError;
use crate::message::MessageType;

/// How many simultaneous connections a port may take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one match of the port may be connecting, connected, or disconnecting.
    #[default]
    Single,
    /// Any number of matches of the port may be connected at once.
    Multiple,
}

/// The globally unique address of a port: its endpoint's process identifier plus the
/// port name, written `pid:port`.
///
/// Ordering is the lexicographic order of that written form, which is also the order
/// used to decide which end of a match is its left side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PortId {
    pid: String,
    port: String,
}

impl PortId {
    /// Creates a port address.
    pub fn new(pid: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            port: port.into(),
        }
    }

    /// The owning endpoint's process identifier.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// The port name, unique within its endpoint.
    #[inline]
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.pid
            .chars()
            .chain(iter::once(':'))
            .chain(self.port.chars())
    }
}

impl Ord for PortId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chars().cmp(other.chars())
    }
}

impl PartialOrd for PortId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.port)
    }
}

/// The declared signature of one port on an endpoint.
///
/// A descriptor is immutable once registered. To change a port, re-declare the
/// endpoint's port set with
/// [`Fabric::modify_endpoint`](crate::common::Fabric::modify_endpoint), which closes
/// the old port and opens a new one.
///
/// ```rust,ignore
/// let port = PortDescriptor::new("flexibility")
///     .sends::<PowerForecast>()
///     .accepts::<Allocation>()
///     .cardinality(Cardinality::Multiple);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    name: String,
    cardinality: Cardinality,
    sends: BTreeSet<MessageType>,
    accepts: BTreeSet<MessageType>,
}

impl PortDescriptor {
    /// Starts a single-cardinality port with no message types.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::Single,
            sends: BTreeSet::new(),
            accepts: BTreeSet::new(),
        }
    }

    /// Declares that the port emits messages of type `M`.
    #[must_use]
    pub fn sends<M: 'static>(self) -> Self {
        self.sending(MessageType::of::<M>())
    }

    /// Declares that the port consumes messages of type `M`.
    #[must_use]
    pub fn accepts<M: 'static>(self) -> Self {
        self.accepting(MessageType::of::<M>())
    }

    /// Declares an emitted message type by tag.
    #[must_use]
    pub fn sending(mut self, message_type: MessageType) -> Self {
        self.sends.insert(message_type);
        self
    }

    /// Declares a consumed message type by tag.
    #[must_use]
    pub fn accepting(mut self, message_type: MessageType) -> Self {
        self.accepts.insert(message_type);
        self
    }

    /// Sets the port's cardinality.
    #[must_use]
    pub const fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Shorthand for `cardinality(Cardinality::Multiple)`.
    #[must_use]
    pub const fn multiple(self) -> Self {
        self.cardinality(Cardinality::Multiple)
    }

    /// The port name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The port's declared cardinality.
    #[inline]
    #[must_use]
    pub const fn port_cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Message types the port emits.
    pub fn sent_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.sends.iter().copied()
    }

    /// Message types the port consumes.
    pub fn accepted_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.accepts.iter().copied()
    }

    pub(crate) fn validate(&self, pid: &str) -> Result<(), FabricError> {
        if self.name.is_empty() {
            return Err(FabricError::InvalidPortDeclaration {
                port: PortId::new(pid, ""),
                reason: "port name is empty",
            });
        }
        if self.sends.is_empty() && self.accepts.is_empty() {
            return Err(FabricError::InvalidPortDeclaration {
                port: PortId::new(pid, self.name.as_str()),
                reason: "port neither sends nor accepts any message type",
            });
        }
        Ok(())
    }
}
