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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Flexwire
//!
//! The wiring fabric of an energy-flexibility platform. Components (resource managers,
//! energy managers, monitors) register as endpoints that declare typed ports; the
//! fabric works out which ports may talk to each other, negotiates connections between
//! them, and delivers their messages, in order, on a serial dispatch context per
//! endpoint. Built on Tokio.
//!
//! ## Key Concepts
//!
//! - **Endpoints (`Endpoint`)**: Participants identified by a process identifier that
//!   own ports and accept or refuse connections in `on_connect`.
//! - **Ports (`PortDescriptor`)**: Named, typed declarations of what an endpoint sends
//!   and accepts, with single or multiple cardinality.
//! - **Matches (`PotentialConnection`)**: Every pair of ports on different endpoints
//!   where each accepts everything the other sends, found as endpoints register.
//! - **Connections (`HalfConnection`, `MessageHandler`)**: Established by a handshake;
//!   each side sends through its half-connection and receives through its handler.
//! - **Connection futures (`ConnectionFuture`)**: Requests to connect two ports as soon
//!   as both exist.
//! - **Traffic observers (`TrafficListener`)**: Type-filtered, asynchronous taps on all
//!   messages sent across the fabric.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flexwire::prelude::*;
//!
//! #[flex_message]
//! struct PowerForecast {
//!     watts: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fabric = FlexApp::launch_async().await;
//!     fabric
//!         .add_endpoint(
//!             "rm-battery",
//!             Arc::new(Battery::default()),
//!             vec![PortDescriptor::new("flex").sends::<PowerForecast>()],
//!         )
//!         .await?;
//!     fabric.shutdown().await
//! }
//! ```

/// The fabric runtime and shared components.
pub(crate) mod common;

/// Ports, connections, and dispatch contexts.
pub(crate) mod endpoint;

/// Message-type tags, traffic events, and dispatch commands.
pub(crate) mod message;

/// Core traits implemented by endpoints, handlers, and listeners.
pub(crate) mod traits;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros
/// *   [`flexwire_macro::flex_message`]: Attribute macro for defining message payloads.
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html): The macro for defining async functions in traits.
///
/// ## Core Types
/// *   [`crate::common::FlexApp`], [`crate::common::FabricBuilder`]: Starting a fabric.
/// *   [`crate::common::Fabric`]: The running fabric.
/// *   [`crate::common::FabricConfig`]: Configuration.
/// *   [`crate::common::FabricError`], [`crate::common::HandshakeOutcome`]: Results.
/// *   [`crate::endpoint::PortDescriptor`], [`crate::endpoint::PortId`],
///     [`crate::endpoint::Cardinality`]: Port declarations.
/// *   [`crate::endpoint::PotentialConnection`], [`crate::endpoint::HalfConnection`],
///     [`crate::endpoint::ConnectionFuture`]: Connections.
/// *   [`crate::message::MessageType`], [`crate::message::TrafficEvent`]: Messages.
///
/// ## Core Traits
/// *   [`crate::traits::Endpoint`], [`crate::traits::MessageHandler`],
///     [`crate::traits::TrafficListener`], [`crate::traits::RegistryListener`],
///     [`crate::traits::FlexMessage`].
pub mod prelude {
    pub use async_trait::async_trait;
    pub use flexwire_macro::flex_message;

    pub use crate::common::config::{RuntimeConfig, TimeoutConfig, WiringConfig};
    pub use crate::common::{
        EndpointSnapshot, Fabric, FabricBuilder, FabricConfig, FabricError, FlexApp,
        HandshakeOutcome, ListenerId, MatchKey, MatchSnapshot, MatchState, PortSnapshot,
        TypeHierarchy, WiringSnapshot,
    };
    pub use crate::endpoint::{
        Cardinality, ConnectionFuture, HalfConnection, PortDescriptor, PortId,
        PotentialConnection,
    };
    pub use crate::message::{MessageType, TrafficEvent};
    pub use crate::traits::{
        Endpoint, FlexMessage, MessageHandler, RegistryListener, TrafficListener,
    };
}
