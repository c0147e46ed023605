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
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use tracing::{info, trace, warn};

use crate::common::{
    EndpointSnapshot, FabricError, MatchKey, MatchSnapshot, MatchState, PortSnapshot, Signature,
    TypeHierarchy, WiringSnapshot,
};
use crate::endpoint::{Cardinality, Connection, DispatchContext, PortDescriptor, PortId};
use crate::message::MessageType;
use crate::traits::Endpoint;

struct PortEntry {
    id: PortId,
    descriptor: Arc<PortDescriptor>,
    signature: Signature,
}

struct EndpointEntry {
    endpoint: Arc<dyn Endpoint>,
    ports: BTreeMap<String, PortEntry>,
    dispatch: DispatchContext,
}

struct MatchEntry {
    /// Distinguishes this match from a later one between the same two ports.
    id: u64,
    state: MatchState,
    connection: Option<Connection>,
}

/// One side of a handshake, copied out so the handshake can run without the lock.
pub(crate) struct HandshakeSide {
    pub(crate) port: PortId,
    pub(crate) descriptor: Arc<PortDescriptor>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
    pub(crate) dispatch: DispatchContext,
}

pub(crate) struct Handshake {
    pub(crate) key: MatchKey,
    pub(crate) match_id: u64,
    pub(crate) left: HandshakeSide,
    pub(crate) right: HandshakeSide,
}

/// A connection cut off because one of its ports closed.
///
/// `survivor` stays counted as busy until the teardown is released, so a
/// single-cardinality survivor cannot be reconnected before it has seen `disconnected`.
pub(crate) struct Teardown {
    pub(crate) key: MatchKey,
    pub(crate) connection: Connection,
    pub(crate) survivor: PortId,
}

pub(crate) struct RemovedEndpoint {
    pub(crate) dispatch: DispatchContext,
    pub(crate) teardowns: Vec<Teardown>,
}

/// Every endpoint, port, and match known to a fabric.
///
/// The registry is plain data behind the fabric's single lock. None of its methods
/// call into endpoints or handlers, and none of them wait.
#[derive(Default)]
pub(crate) struct Registry {
    endpoints: BTreeMap<String, EndpointEntry>,
    matches: BTreeMap<MatchKey, MatchEntry>,
    by_port: HashMap<PortId, BTreeSet<MatchKey>>,
    draining: HashMap<PortId, usize>,
    /// Survivors of matches dropped mid-handshake or mid-disconnect, by match id.
    interrupted: HashMap<u64, PortId>,
    next_match_id: u64,
}

impl Registry {
    /// Registers an endpoint and detects the matches of each valid port.
    ///
    /// Invalid or duplicate ports are logged and skipped.
    pub(crate) fn insert_endpoint(
        &mut self,
        pid: &str,
        endpoint: Arc<dyn Endpoint>,
        ports: Vec<PortDescriptor>,
        dispatch: DispatchContext,
        hierarchy: &TypeHierarchy,
    ) -> Result<Vec<MatchKey>, FabricError> {
        if self.endpoints.contains_key(pid) {
            return Err(FabricError::DuplicateEndpoint(pid.to_string()));
        }
        self.endpoints.insert(
            pid.to_string(),
            EndpointEntry {
                endpoint,
                ports: BTreeMap::new(),
                dispatch,
            },
        );
        let mut found = Vec::new();
        for descriptor in ports {
            match self.open_port(pid, descriptor, hierarchy) {
                Ok(keys) => found.extend(keys),
                Err(e) => warn!("Skipping port on endpoint {}: {}", pid, e),
            }
        }
        info!("Endpoint {} registered with {} new matches", pid, found.len());
        Ok(found)
    }

    fn open_port(
        &mut self,
        pid: &str,
        descriptor: PortDescriptor,
        hierarchy: &TypeHierarchy,
    ) -> Result<Vec<MatchKey>, FabricError> {
        descriptor.validate(pid)?;
        let id = PortId::new(pid, descriptor.name());
        let owner = self
            .endpoints
            .get(pid)
            .ok_or_else(|| FabricError::UnknownEndpoint(pid.to_string()))?;
        if owner.ports.contains_key(descriptor.name()) {
            return Err(FabricError::DuplicatePort(id));
        }

        let signature = Signature::compute(&descriptor, hierarchy);
        let partners: Vec<PortId> = self
            .endpoints
            .iter()
            .filter(|(other, _)| other.as_str() != pid)
            .flat_map(|(_, entry)| entry.ports.values())
            .filter(|port| port.signature.is_compatible(&signature))
            .map(|port| port.id.clone())
            .collect();

        if let Some(owner) = self.endpoints.get_mut(pid) {
            owner.ports.insert(
                descriptor.name().to_string(),
                PortEntry {
                    id: id.clone(),
                    descriptor: Arc::new(descriptor),
                    signature,
                },
            );
        }
        trace!("Port {} opened", id);
        Ok(partners
            .into_iter()
            .map(|partner| self.create_match(id.clone(), partner))
            .collect())
    }

    fn create_match(&mut self, a: PortId, b: PortId) -> MatchKey {
        let key = MatchKey::new(a, b);
        if !self.matches.contains_key(&key) {
            self.next_match_id += 1;
            self.matches.insert(
                key.clone(),
                MatchEntry {
                    id: self.next_match_id,
                    state: MatchState::Matched,
                    connection: None,
                },
            );
            for end in [key.left(), key.right()] {
                self.by_port.entry(end.clone()).or_default().insert(key.clone());
            }
            info!("Found matching ports: {}", key);
        }
        key
    }

    /// Drops every match of `id`, handing back the live connections for teardown.
    fn close_port(&mut self, id: &PortId) -> Vec<Teardown> {
        let mut teardowns = Vec::new();
        for key in self.by_port.remove(id).unwrap_or_default() {
            let Some(entry) = self.matches.remove(&key) else {
                continue;
            };
            let Some(survivor) = key.other_end(id).cloned() else {
                continue;
            };
            if let Some(keys) = self.by_port.get_mut(&survivor) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.by_port.remove(&survivor);
                }
            }
            trace!("Match {} dropped while {:?}", key, entry.state);
            if let Some(connection) = entry.connection {
                *self.draining.entry(survivor.clone()).or_default() += 1;
                teardowns.push(Teardown {
                    key,
                    connection,
                    survivor,
                });
            } else if entry.state.is_active() {
                // The task running the handshake or disconnect releases it.
                *self.draining.entry(survivor.clone()).or_default() += 1;
                self.interrupted.insert(entry.id, survivor);
            }
        }
        self.draining.remove(id);
        self.interrupted.retain(|_, survivor| *survivor != *id);
        teardowns
    }

    /// Unregisters an endpoint, closing all of its ports.
    pub(crate) fn remove_endpoint(&mut self, pid: &str) -> Option<RemovedEndpoint> {
        let entry = self.endpoints.remove(pid)?;
        let teardowns = entry
            .ports
            .values()
            .flat_map(|port| self.close_port(&port.id))
            .collect();
        Some(RemovedEndpoint {
            dispatch: entry.dispatch,
            teardowns,
        })
    }

    /// Replaces an endpoint's port set.
    ///
    /// Ports whose descriptor is unchanged keep their matches and connections. Ports
    /// that disappeared or changed are closed; new and changed ports are opened.
    pub(crate) fn modify_endpoint(
        &mut self,
        pid: &str,
        ports: Vec<PortDescriptor>,
        hierarchy: &TypeHierarchy,
    ) -> Result<(Vec<Teardown>, Vec<MatchKey>), FabricError> {
        let entry = self
            .endpoints
            .get(pid)
            .ok_or_else(|| FabricError::UnknownEndpoint(pid.to_string()))?;

        let mut declared: BTreeMap<String, PortDescriptor> = BTreeMap::new();
        for descriptor in ports {
            if let Err(e) = descriptor.validate(pid) {
                warn!("Skipping port on endpoint {}: {}", pid, e);
            } else if declared.contains_key(descriptor.name()) {
                let duplicate = FabricError::DuplicatePort(PortId::new(pid, descriptor.name()));
                warn!("Skipping port on endpoint {}: {}", pid, duplicate);
            } else {
                declared.insert(descriptor.name().to_string(), descriptor);
            }
        }

        let stale: Vec<PortId> = entry
            .ports
            .values()
            .filter(|port| declared.get(port.descriptor.name()) != Some(port.descriptor.as_ref()))
            .map(|port| port.id.clone())
            .collect();

        let mut teardowns = Vec::new();
        for id in &stale {
            teardowns.extend(self.close_port(id));
            if let Some(owner) = self.endpoints.get_mut(pid) {
                owner.ports.remove(id.port());
            }
            info!("Port {} closed", id);
        }

        let mut found = Vec::new();
        for (name, descriptor) in declared {
            let open = self
                .endpoints
                .get(pid)
                .is_some_and(|owner| owner.ports.contains_key(&name));
            if !open {
                found.extend(self.open_port(pid, descriptor, hierarchy)?);
            }
        }
        Ok((teardowns, found))
    }

    /// Stops counting finished teardowns against their surviving ports.
    pub(crate) fn release(&mut self, survivors: &[PortId]) {
        for survivor in survivors {
            if let Some(count) = self.draining.get_mut(survivor) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.draining.remove(survivor);
                }
            }
        }
    }

    /// Releases the survivor of a match dropped while `match_id` was in flight.
    pub(crate) fn settle(&mut self, match_id: u64) {
        if let Some(survivor) = self.interrupted.remove(&match_id) {
            self.release(&[survivor]);
        }
    }

    /// Re-resolves every signature against the hierarchy and adds newly compatible pairs.
    pub(crate) fn rescan(&mut self, hierarchy: &TypeHierarchy) -> Vec<MatchKey> {
        let mut ports = Vec::new();
        for entry in self.endpoints.values_mut() {
            for port in entry.ports.values_mut() {
                port.signature = Signature::compute(&port.descriptor, hierarchy);
                ports.push((port.id.clone(), port.signature.clone()));
            }
        }
        let mut found = Vec::new();
        for (i, (a, a_signature)) in ports.iter().enumerate() {
            for (b, b_signature) in &ports[i + 1..] {
                if a.pid() == b.pid()
                    || self.matches.contains_key(&MatchKey::new(a.clone(), b.clone()))
                {
                    continue;
                }
                if a_signature.is_compatible(b_signature) {
                    found.push(self.create_match(a.clone(), b.clone()));
                }
            }
        }
        found
    }

    fn port(&self, id: &PortId) -> Result<&PortEntry, FabricError> {
        self.endpoints
            .get(id.pid())
            .ok_or_else(|| FabricError::UnknownEndpoint(id.pid().to_string()))?
            .ports
            .get(id.port())
            .ok_or_else(|| FabricError::UnknownPort(id.clone()))
    }

    /// Matches in flight on `id`, plus teardowns it is still waiting on.
    fn active_count(&self, id: &PortId) -> usize {
        let in_flight = self.by_port.get(id).map_or(0, |keys| {
            keys.iter()
                .filter(|key| self.matches.get(*key).is_some_and(|m| m.state.is_active()))
                .count()
        });
        in_flight + self.draining.get(id).copied().unwrap_or(0)
    }

    fn no_match(key: &MatchKey) -> FabricError {
        FabricError::NoMatch {
            left: key.left().clone(),
            right: key.right().clone(),
        }
    }

    pub(crate) fn check_connectable(&self, key: &MatchKey) -> Result<(), FabricError> {
        let entry = self.matches.get(key).ok_or_else(|| Self::no_match(key))?;
        if !entry.state.allows_connect() {
            return Err(FabricError::AlreadyConnected {
                left: key.left().clone(),
                right: key.right().clone(),
            });
        }
        for end in [key.left(), key.right()] {
            let port = self
                .port(end)
                .map_err(|_| FabricError::PortClosed(end.clone()))?;
            if port.descriptor.port_cardinality() == Cardinality::Single
                && self.active_count(end) > 0
            {
                return Err(FabricError::CardinalityViolation(end.clone()));
            }
        }
        Ok(())
    }

    fn handshake_side(&self, id: &PortId) -> Result<HandshakeSide, FabricError> {
        let owner = self
            .endpoints
            .get(id.pid())
            .ok_or_else(|| FabricError::PortClosed(id.clone()))?;
        let port = owner
            .ports
            .get(id.port())
            .ok_or_else(|| FabricError::PortClosed(id.clone()))?;
        Ok(HandshakeSide {
            port: id.clone(),
            descriptor: port.descriptor.clone(),
            endpoint: owner.endpoint.clone(),
            dispatch: owner.dispatch.clone(),
        })
    }

    /// Moves a connectable match to `Connecting` and copies out both sides.
    pub(crate) fn begin_connect(&mut self, key: &MatchKey) -> Result<Handshake, FabricError> {
        self.check_connectable(key)?;
        let left = self.handshake_side(key.left())?;
        let right = self.handshake_side(key.right())?;
        let entry = self
            .matches
            .get_mut(key)
            .ok_or_else(|| Self::no_match(key))?;
        entry.state = MatchState::Connecting;
        Ok(Handshake {
            key: key.clone(),
            match_id: entry.id,
            left,
            right,
        })
    }

    /// Records an accepted handshake. Hands the connection back if the match was
    /// dropped while the handshake ran.
    pub(crate) fn finish_connect(
        &mut self,
        key: &MatchKey,
        match_id: u64,
        connection: Connection,
    ) -> Result<(), Connection> {
        match self.matches.get_mut(key) {
            Some(entry) if entry.id == match_id && entry.state == MatchState::Connecting => {
                entry.state = MatchState::Connected;
                entry.connection = Some(connection);
                Ok(())
            }
            _ => Err(connection),
        }
    }

    /// Records a refused handshake.
    pub(crate) fn abort_connect(&mut self, key: &MatchKey, match_id: u64) {
        if let Some(entry) = self.matches.get_mut(key) {
            if entry.id == match_id && entry.state == MatchState::Connecting {
                entry.state = MatchState::Disconnected;
            }
        }
        self.settle(match_id);
    }

    /// Moves a connected match to `Disconnecting` and takes its connection.
    ///
    /// Returns `None` when the match is not connected.
    pub(crate) fn begin_disconnect(
        &mut self,
        key: &MatchKey,
    ) -> Result<Option<(u64, Connection)>, FabricError> {
        let entry = self
            .matches
            .get_mut(key)
            .ok_or_else(|| Self::no_match(key))?;
        if entry.state != MatchState::Connected {
            return Ok(None);
        }
        let Some(connection) = entry.connection.take() else {
            return Ok(None);
        };
        entry.state = MatchState::Disconnecting;
        Ok(Some((entry.id, connection)))
    }

    pub(crate) fn finish_disconnect(&mut self, key: &MatchKey, match_id: u64) {
        if let Some(entry) = self.matches.get_mut(key) {
            if entry.id == match_id && entry.state == MatchState::Disconnecting {
                entry.state = MatchState::Disconnected;
            }
        }
        self.settle(match_id);
    }

    /// Resolves the match between two ports, validating both.
    pub(crate) fn resolve_match(&self, a: &PortId, b: &PortId) -> Result<MatchKey, FabricError> {
        if a.pid() == b.pid() {
            return Err(FabricError::SelfConnectionRejected(a.pid().to_string()));
        }
        self.port(a)?;
        self.port(b)?;
        let key = MatchKey::new(a.clone(), b.clone());
        if self.matches.contains_key(&key) {
            Ok(key)
        } else {
            Err(Self::no_match(&key))
        }
    }

    /// All matches of an open port, ordered by key.
    pub(crate) fn matches_of(&self, id: &PortId) -> Result<Vec<MatchKey>, FabricError> {
        self.port(id)?;
        Ok(self
            .by_port
            .get(id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub(crate) fn state(&self, key: &MatchKey) -> Option<MatchState> {
        self.matches.get(key).map(|entry| entry.state)
    }

    pub(crate) fn contains_endpoint(&self, pid: &str) -> bool {
        self.endpoints.contains_key(pid)
    }

    pub(crate) fn pids(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    /// The exact pid if registered, otherwise the first pid starting with `prefix`.
    pub(crate) fn resolve_pid(&self, prefix: &str) -> Option<&str> {
        self.endpoints
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .next()
            .map(|(pid, _)| pid.as_str())
            .filter(|pid| pid.starts_with(prefix))
    }

    /// Unconnected matches that are the only possible connection for a
    /// single-cardinality port, and whose other end is not ambiguous either.
    pub(crate) fn auto_connect_candidates(&self) -> Vec<MatchKey> {
        let sole_match = |id: &PortId| {
            self.by_port
                .get(id)
                .filter(|keys| keys.len() == 1)
                .and_then(|keys| keys.iter().next())
        };
        let mut candidates = BTreeSet::new();
        for port in self.endpoints.values().flat_map(|entry| entry.ports.values()) {
            if port.descriptor.port_cardinality() != Cardinality::Single {
                continue;
            }
            let Some(key) = sole_match(&port.id) else {
                continue;
            };
            let Some(other) = key.other_end(&port.id) else {
                continue;
            };
            let other_unambiguous = self.port(other).is_ok_and(|other_port| {
                other_port.descriptor.port_cardinality() == Cardinality::Multiple
                    || sole_match(other).is_some()
            });
            if other_unambiguous && self.state(key).is_some_and(MatchState::allows_connect) {
                candidates.insert(key.clone());
            }
        }
        candidates.into_iter().collect()
    }

    fn endpoint_snapshot(&self, pid: &str, entry: &EndpointEntry) -> EndpointSnapshot {
        EndpointSnapshot {
            pid: pid.to_string(),
            ports: entry
                .ports
                .values()
                .map(|port| PortSnapshot {
                    name: port.descriptor.name().to_string(),
                    cardinality: port.descriptor.port_cardinality(),
                    sends: type_names(port.descriptor.sent_types()),
                    accepts: type_names(port.descriptor.accepted_types()),
                    active_connections: self.active_count(&port.id),
                })
                .collect(),
        }
    }

    pub(crate) fn describe_endpoint(&self, pid: &str) -> Option<EndpointSnapshot> {
        self.endpoints
            .get(pid)
            .map(|entry| self.endpoint_snapshot(pid, entry))
    }

    pub(crate) fn snapshot(&self) -> WiringSnapshot {
        WiringSnapshot {
            endpoints: self
                .endpoints
                .iter()
                .map(|(pid, entry)| self.endpoint_snapshot(pid, entry))
                .collect(),
            matches: self
                .matches
                .iter()
                .map(|(key, entry)| MatchSnapshot {
                    left: key.left().to_string(),
                    right: key.right().to_string(),
                    state: entry.state,
                })
                .collect(),
        }
    }
}

fn type_names(types: impl Iterator<Item = MessageType>) -> Vec<String> {
    types.map(|t| t.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{HalfConnection, Route};
    use crate::traits::MessageHandler;
    use tokio::runtime::Handle;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    struct Forecast;
    struct Allocation;

    struct Silent;

    impl Endpoint for Silent {
        fn on_connect(&self, _connection: HalfConnection) -> Option<Box<dyn MessageHandler>> {
            None
        }
    }

    struct Harness {
        registry: Registry,
        hierarchy: TypeHierarchy,
        tracker: TaskTracker,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: Registry::default(),
                hierarchy: TypeHierarchy::new(),
                tracker: TaskTracker::new(),
            }
        }

        fn dispatch(&self, pid: &str) -> DispatchContext {
            DispatchContext::spawn(pid, &Handle::current(), &self.tracker, CancellationToken::new())
        }

        fn register(&mut self, pid: &str, ports: Vec<PortDescriptor>) -> Vec<MatchKey> {
            let dispatch = self.dispatch(pid);
            self.registry
                .insert_endpoint(pid, Arc::new(Silent), ports, dispatch, &self.hierarchy)
                .unwrap()
        }

        fn connection(&self, key: &MatchKey) -> Connection {
            let outbound = Route::new(key.left().clone(), key.right().clone(), self.dispatch("r"));
            let inbound = Route::new(key.right().clone(), key.left().clone(), self.dispatch("l"));
            Connection::new(outbound, inbound)
        }

        fn connect(&mut self, key: &MatchKey) {
            let handshake = self.registry.begin_connect(key).unwrap();
            let connection = self.connection(key);
            assert!(self
                .registry
                .finish_connect(key, handshake.match_id, connection)
                .is_ok());
        }
    }

    fn resource(name: &str) -> PortDescriptor {
        PortDescriptor::new(name).sends::<Forecast>().accepts::<Allocation>()
    }

    fn manager(name: &str) -> PortDescriptor {
        PortDescriptor::new(name).sends::<Allocation>().accepts::<Forecast>()
    }

    #[tokio::test]
    async fn matches_are_found_once_from_either_side() {
        let mut h = Harness::new();
        assert!(h.register("cem", vec![manager("devices")]).is_empty());
        let found = h.register("battery", vec![resource("flex")]);
        assert_eq!(found.len(), 1);

        let a = PortId::new("cem", "devices");
        let b = PortId::new("battery", "flex");
        assert_eq!(h.registry.resolve_match(&a, &b).unwrap(), found[0]);
        assert_eq!(h.registry.resolve_match(&b, &a).unwrap(), found[0]);
        assert_eq!(h.registry.state(&found[0]), Some(MatchState::Matched));
    }

    #[tokio::test]
    async fn invalid_ports_are_skipped_and_the_rest_registered() {
        let mut h = Harness::new();
        h.register(
            "battery",
            vec![PortDescriptor::new("empty"), resource("flex"), resource("flex")],
        );
        let snapshot = h.registry.snapshot();
        let battery = snapshot.endpoint("battery").unwrap();
        assert_eq!(battery.ports.len(), 1);
        assert_eq!(battery.ports[0].name, "flex");
    }

    #[tokio::test]
    async fn duplicates_self_connections_and_unknown_ports_are_rejected() {
        let mut h = Harness::new();
        h.register("battery", vec![resource("flex"), manager("control")]);
        let dispatch = h.dispatch("battery");
        let err = h
            .registry
            .insert_endpoint("battery", Arc::new(Silent), vec![], dispatch, &h.hierarchy)
            .unwrap_err();
        assert!(matches!(err, FabricError::DuplicateEndpoint(_)));

        let err = h
            .registry
            .resolve_match(&PortId::new("battery", "flex"), &PortId::new("battery", "control"))
            .unwrap_err();
        assert!(matches!(err, FabricError::SelfConnectionRejected(_)));

        let err = h
            .registry
            .resolve_match(&PortId::new("battery", "flex"), &PortId::new("cem", "devices"))
            .unwrap_err();
        assert!(matches!(err, FabricError::UnknownEndpoint(_)));
    }

    #[tokio::test]
    async fn single_ports_allow_one_active_match() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        let first = h.register("battery", vec![resource("flex")]).remove(0);
        let second = h.register("boiler", vec![resource("flex")]).remove(0);

        h.connect(&first);
        let err = h.registry.check_connectable(&second).unwrap_err();
        assert!(matches!(err, FabricError::CardinalityViolation(ref port) if port == &PortId::new("cem", "devices")));

        let err = h.registry.begin_connect(&first).err().unwrap();
        assert!(matches!(err, FabricError::AlreadyConnected { .. }));
    }

    #[tokio::test]
    async fn multiple_ports_allow_many_active_matches() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices").multiple()]);
        let first = h.register("battery", vec![resource("flex")]).remove(0);
        let second = h.register("boiler", vec![resource("flex")]).remove(0);

        h.connect(&first);
        assert!(h.registry.check_connectable(&second).is_ok());
        h.connect(&second);
        assert_eq!(h.registry.snapshot().count_in(MatchState::Connected), 2);
    }

    #[tokio::test]
    async fn removal_hands_back_connections_and_holds_the_survivor() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        let first = h.register("battery", vec![resource("flex")]).remove(0);
        let second = h.register("boiler", vec![resource("flex")]).remove(0);
        h.connect(&first);

        let removed = h.registry.remove_endpoint("battery").unwrap();
        assert_eq!(removed.teardowns.len(), 1);
        assert_eq!(removed.teardowns[0].survivor, PortId::new("cem", "devices"));
        assert_eq!(h.registry.state(&first), None);
        assert!(h.registry.check_connectable(&second).is_err());

        h.registry.release(&[PortId::new("cem", "devices")]);
        assert!(h.registry.check_connectable(&second).is_ok());
    }

    #[tokio::test]
    async fn a_handshake_cannot_finish_on_a_dropped_match() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        let key = h.register("battery", vec![resource("flex")]).remove(0);

        let handshake = h.registry.begin_connect(&key).unwrap();
        let removed = h.registry.remove_endpoint("battery").unwrap();
        assert!(removed.teardowns.is_empty());

        h.register("battery", vec![resource("flex")]);
        let connection = h.connection(&key);
        assert!(h
            .registry
            .finish_connect(&key, handshake.match_id, connection)
            .is_err());
        assert_eq!(h.registry.state(&key), Some(MatchState::Matched));
    }

    #[tokio::test]
    async fn survivors_of_interrupted_handshakes_stay_busy_until_settled() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        let key = h.register("battery", vec![resource("flex")]).remove(0);
        let handshake = h.registry.begin_connect(&key).unwrap();

        h.registry.remove_endpoint("battery").unwrap();
        let replacement = h.register("boiler", vec![resource("flex")]).remove(0);
        let err = h.registry.check_connectable(&replacement).unwrap_err();
        assert!(matches!(err, FabricError::CardinalityViolation(ref port) if port == &PortId::new("cem", "devices")));

        h.registry.abort_connect(&key, handshake.match_id);
        assert!(h.registry.check_connectable(&replacement).is_ok());
    }

    #[tokio::test]
    async fn survivors_of_interrupted_disconnects_stay_busy_until_settled() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        let key = h.register("battery", vec![resource("flex")]).remove(0);
        h.connect(&key);
        let (match_id, _connection) = h.registry.begin_disconnect(&key).unwrap().unwrap();

        let removed = h.registry.remove_endpoint("battery").unwrap();
        assert!(removed.teardowns.is_empty());
        let replacement = h.register("boiler", vec![resource("flex")]).remove(0);
        assert!(h.registry.check_connectable(&replacement).is_err());

        h.registry.finish_disconnect(&key, match_id);
        assert!(h.registry.check_connectable(&replacement).is_ok());
    }

    #[tokio::test]
    async fn modification_keeps_unchanged_ports_connected() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices").multiple()]);
        let key = h.register("battery", vec![resource("flex")]).remove(0);
        h.connect(&key);

        let (teardowns, found) = h
            .registry
            .modify_endpoint("battery", vec![resource("flex"), resource("spare")], &h.hierarchy)
            .unwrap();
        assert!(teardowns.is_empty());
        assert_eq!(found.len(), 1);
        assert_eq!(h.registry.state(&key), Some(MatchState::Connected));

        let (teardowns, _) = h
            .registry
            .modify_endpoint("battery", vec![resource("spare")], &h.hierarchy)
            .unwrap();
        assert_eq!(teardowns.len(), 1);
        assert_eq!(h.registry.state(&key), None);
    }

    #[tokio::test]
    async fn prefix_lookup_prefers_exact_pids() {
        let mut h = Harness::new();
        h.register("rm-battery", vec![resource("flex")]);
        h.register("rm", vec![resource("flex")]);
        assert_eq!(h.registry.resolve_pid("rm"), Some("rm"));
        assert_eq!(h.registry.resolve_pid("rm-b"), Some("rm-battery"));
        assert_eq!(h.registry.resolve_pid("cem"), None);
    }

    #[tokio::test]
    async fn auto_connect_only_picks_unambiguous_matches() {
        let mut h = Harness::new();
        h.register("cem", vec![manager("devices").multiple()]);
        h.register("battery", vec![resource("flex")]);
        h.register("boiler", vec![resource("flex")]);
        assert_eq!(h.registry.auto_connect_candidates().len(), 2);

        let mut h = Harness::new();
        h.register("cem", vec![manager("devices")]);
        h.register("battery", vec![resource("flex")]);
        h.register("boiler", vec![resource("flex")]);
        assert!(h.registry.auto_connect_candidates().is_empty());
    }

    #[tokio::test]
    async fn rescan_picks_up_new_subtype_relations() {
        struct Curtailment;
        let mut h = Harness::new();
        h.register("cem", vec![PortDescriptor::new("out").sends::<Curtailment>()]);
        h.register("battery", vec![PortDescriptor::new("in").accepts::<Allocation>()]);
        assert!(h.registry.snapshot().matches.is_empty());

        h.hierarchy.declare_subtype::<Curtailment, Allocation>();
        assert_eq!(h.registry.rescan(&h.hierarchy).len(), 1);
        assert!(h.registry.rescan(&h.hierarchy).is_empty());
    }
}
