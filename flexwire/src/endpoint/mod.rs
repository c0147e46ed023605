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
//! Ports, connections, and the per-endpoint dispatch machinery.
//!
//! An endpoint declares [`PortDescriptor`]s when it registers. Every pair of compatible
//! ports on different endpoints becomes a match, reachable through a
//! [`PotentialConnection`]. Connecting a match hands each side a [`HalfConnection`]
//! for sending; delivery runs on the receiving endpoint's own serial dispatch context.

pub use connection_future::ConnectionFuture;
pub use half_connection::HalfConnection;
pub use port::{Cardinality, PortDescriptor, PortId};
pub use potential_connection::PotentialConnection;

pub(crate) use connection_future::ConnectionRequest;
pub(crate) use dispatch_context::DispatchContext;
pub(crate) use half_connection::{Connection, Route};

mod connection_future;
mod dispatch_context;
mod half_connection;
mod port;
mod potential_connection;
