//! Provides the fabric runtime and the components shared across the crate.
//!
//! # Key Re-exported Components:
//!
//! *   [`FlexApp`]: The entry point for starting a fabric.
//! *   [`Fabric`]: The running fabric, used to register endpoints, connect matches,
//!     request future connections, observe traffic, and shut down.
//! *   [`FabricConfig`]: Configuration loaded from XDG-compliant locations.
//! *   [`FabricError`]: Errors reported by fabric operations.
//! *   [`TypeHierarchy`]: Declared subtype relations between message types.
//!
//! Internal submodules hold the registry, the handshake protocol, and the observer bus.

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

// --- Public Re-exports ---
pub use config::FabricConfig;
pub use fabric::Fabric;
pub use fabric_error::FabricError;
pub use flex_app::{FabricBuilder, FlexApp};
pub use handshake::HandshakeOutcome;
pub use match_engine::{MatchKey, MatchState};
pub use observer_bus::ListenerId;
pub use type_hierarchy::TypeHierarchy;
pub use wiring_snapshot::{EndpointSnapshot, MatchSnapshot, PortSnapshot, WiringSnapshot};

// --- Crate-Internal Re-exports ---
pub(crate) use match_engine::Signature;
pub(crate) use observer_bus::ObserverBus;
pub(crate) use types::*;

// --- Submodules ---

/// Defines crate-internal type aliases.
mod types;

/// Defines the configuration system.
pub mod config;
/// Defines the `Fabric` handle and its operations.
mod fabric;
/// Defines `FabricError`.
mod fabric_error;
/// Defines the internal state shared by fabric handles.
mod fabric_inner;
/// Defines the `FlexApp` entry point and `FabricBuilder`.
mod flex_app;
/// Implements the connect and disconnect protocols.
mod handshake;
/// Defines match keys, match states, and port compatibility.
mod match_engine;
/// Defines the traffic observer bus.
mod observer_bus;
/// Defines the registry of endpoints, ports, and matches.
mod registry;
/// Defines `TypeHierarchy`.
mod type_hierarchy;
/// Defines the serializable wiring snapshot.
mod wiring_snapshot;
