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

use crate::endpoint::PortId;

/// Errors reported by fabric operations.
///
/// Registration problems with a single port are logged and skipped rather than
/// returned, so that the endpoint's remaining ports stay usable. They still use the
/// variants below in the log output.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    /// A port was declared without any message types, or with an empty name.
    #[error("invalid port declaration {port}: {reason}")]
    InvalidPortDeclaration {
        /// The offending port.
        port: PortId,
        /// Why the declaration was rejected.
        reason: &'static str,
    },

    /// An endpoint declared the same port name twice.
    #[error("duplicate port {0}")]
    DuplicatePort(PortId),

    /// An endpoint with this process identifier is already registered.
    #[error("endpoint {0} is already registered")]
    DuplicateEndpoint(String),

    /// No endpoint with this process identifier is registered.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),

    /// The endpoint exists but has no such port.
    #[error("unknown port {0}")]
    UnknownPort(PortId),

    /// Both ends of the requested connection belong to the same endpoint.
    #[error("endpoint {0} cannot be connected to itself")]
    SelfConnectionRejected(String),

    /// The two ports are not type-compatible in either direction.
    #[error("no match between {left} and {right}")]
    NoMatch {
        /// One end of the requested pair.
        left: PortId,
        /// The other end of the requested pair.
        right: PortId,
    },

    /// A single-cardinality port already takes part in a connection.
    #[error("port {0} is single-cardinality and already connected")]
    CardinalityViolation(PortId),

    /// The match is already connected, or a handshake or teardown is in progress.
    #[error("match {left} <-> {right} is not connectable in its current state")]
    AlreadyConnected {
        /// Left end of the match.
        left: PortId,
        /// Right end of the match.
        right: PortId,
    },

    /// The port was closed by endpoint removal or modification.
    #[error("port {0} is closed")]
    PortClosed(PortId),

    /// A connection future did not resolve in time. The future itself stays pending.
    #[error("connection {left} <-> {right} not established within {timeout:?}")]
    ConnectionTimeout {
        /// One end of the requested pair.
        left: PortId,
        /// The other end of the requested pair.
        right: PortId,
        /// How long the caller waited.
        timeout: Duration,
    },

    /// A connection future was cancelled before it resolved.
    #[error("connection request {left} <-> {right} was cancelled")]
    ConnectionCancelled {
        /// One end of the requested pair.
        left: PortId,
        /// The other end of the requested pair.
        right: PortId,
    },

    /// The fabric has been shut down.
    #[error("the fabric has been shut down")]
    FabricShutdown,

    /// A Tokio runtime could not be provisioned for the fabric.
    #[error("failed to start the fabric runtime: {0}")]
    RuntimeUnavailable(#[from] std::io::Error),
}

impl FabricError {
    /// Returns `true` for errors caused by a port or match being in the wrong state, as
    /// opposed to a request naming something that does not exist.
    #[must_use]
    pub const fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::CardinalityViolation(_) | Self::AlreadyConnected { .. } | Self::PortClosed(_)
        )
    }
}
