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
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{error, info, trace, warn};

use crate::common::fabric_inner::FabricInner;
use crate::common::registry::Teardown;
use crate::common::{
    EndpointSnapshot, FabricConfig, FabricError, HandshakeOutcome, ListenerId, MatchState,
    PortSnapshot, TypeHierarchy, WiringSnapshot,
};
use crate::endpoint::{ConnectionFuture, ConnectionRequest, PortDescriptor, PortId, PotentialConnection};
use crate::message::MessageType;
use crate::traits::{Endpoint, RegistryListener, TrafficListener};

/// A running wiring fabric.
///
/// Obtained from [`FlexApp::launch_async`](crate::common::FlexApp::launch_async),
/// [`FlexApp::launch`](crate::common::FlexApp::launch), or a
/// [`FabricBuilder`](crate::common::FabricBuilder). The handle is cheap to clone; all
/// clones share one registry.
///
/// `Fabric` provides the operations on the fabric as a whole: registering and removing
/// endpoints, looking up and connecting matches, requesting future connections,
/// registering traffic listeners, and shutting down.
#[derive(Clone)]
pub struct Fabric(pub(crate) Arc<FabricInner>);

impl fmt::Debug for Fabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fabric")
            .field("endpoints", &self.0.registry.lock().pids())
            .field("observers", &self.0.observers)
            .field("owns_runtime", &self.0.runtime.is_owned())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Fabric {
    /// The configuration the fabric was launched with.
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.0.config
    }

    /// The subtype relations used for matching and listener filters.
    #[must_use]
    pub fn type_hierarchy(&self) -> &TypeHierarchy {
        &self.0.hierarchy
    }

    /// Handle to the runtime the fabric's tasks run on.
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        self.0.runtime.handle()
    }

    /// Runs a future to completion on the fabric's runtime from synchronous code.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context, like [`Handle::block_on`].
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime().block_on(future)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.0.shut_down.load(Ordering::Acquire)
    }

    /// Declares that `Sub` may be delivered wherever `Super` is accepted, and adds the
    /// matches this makes possible between already registered ports.
    ///
    /// Returns the number of new matches.
    pub async fn declare_subtype<Sub: 'static, Super: 'static>(&self) -> usize {
        if !self.0.hierarchy.declare(MessageType::of::<Sub>(), MessageType::of::<Super>()) {
            return 0;
        }
        let found = self.0.registry.lock().rescan(&self.0.hierarchy);
        trace!("Subtype declaration produced {} new matches", found.len());
        if !found.is_empty() {
            self.after_wiring_change().await;
        }
        found.len()
    }

    /// Registers an endpoint and its ports.
    ///
    /// Every valid port is matched against the ports of all other endpoints. A port that
    /// declares no message types, or repeats a name, is logged and skipped while the
    /// remaining ports are registered. Afterwards, outstanding connection requests are
    /// retried and, if configured, unambiguous matches are auto-connected.
    ///
    /// # Errors
    ///
    /// [`FabricError::DuplicateEndpoint`] if `pid` is taken and
    /// [`FabricError::FabricShutdown`] after shutdown.
    pub async fn add_endpoint(
        &self,
        pid: &str,
        endpoint: Arc<dyn Endpoint>,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError> {
        let dispatch = crate::endpoint::DispatchContext::spawn(
            pid,
            self.runtime(),
            &self.0.tracker,
            self.0.cancellation_token.clone(),
        );
        let inserted = {
            let mut registry = self.0.registry.lock();
            if self.is_shut_down() {
                Err(FabricError::FabricShutdown)
            } else {
                registry.insert_endpoint(pid, endpoint, ports, dispatch.clone(), &self.0.hierarchy)
            }
        };
        if let Err(e) = inserted {
            dispatch.close();
            return Err(e);
        }
        self.after_wiring_change().await;
        Ok(())
    }

    /// Replaces an endpoint's port set.
    ///
    /// Unchanged ports keep their connections. Removed or changed ports are closed, which
    /// disconnects their connections first; new or changed ports are matched as on
    /// registration.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnknownEndpoint`] if `pid` is not registered.
    pub async fn modify_endpoint(
        &self,
        pid: &str,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError> {
        let modified = self
            .0
            .registry
            .lock()
            .modify_endpoint(pid, ports, &self.0.hierarchy);
        let (teardowns, found) = modified?;
        info!(
            "Endpoint {} modified: {} connections closed, {} new matches",
            pid,
            teardowns.len(),
            found.len()
        );
        self.run_teardowns(teardowns).await;
        self.after_wiring_change().await;
        Ok(())
    }

    /// Unregisters an endpoint.
    ///
    /// All of its connections are disconnected, each side seeing `disconnected`, before
    /// its dispatch context stops accepting work. Messages already queued for it are
    /// still delivered.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnknownEndpoint`] if `pid` is not registered.
    pub async fn remove_endpoint(&self, pid: &str) -> Result<(), FabricError> {
        let removed = self.0.registry.lock().remove_endpoint(pid);
        let removed = removed.ok_or_else(|| FabricError::UnknownEndpoint(pid.to_string()))?;
        trace!(
            "Endpoint {} removed, tearing down {} connections",
            pid,
            removed.teardowns.len()
        );
        self.run_teardowns(removed.teardowns).await;
        removed.dispatch.close();
        info!("Endpoint {} unregistered", pid);
        Ok(())
    }

    async fn run_teardowns(&self, teardowns: Vec<Teardown>) {
        if teardowns.is_empty() {
            return;
        }
        let timeout = self.0.config.disconnect_timeout();
        let survivors: Vec<PortId> = teardowns.iter().map(|t| t.survivor.clone()).collect();
        join_all(teardowns.into_iter().map(|teardown| async move {
            let key = teardown.key;
            if tokio::time::timeout(timeout, teardown.connection.teardown())
                .await
                .is_err()
            {
                warn!("Disconnect of {} did not complete within {:?}", key, timeout);
            }
        }))
        .await;
        self.0.registry.lock().release(&survivors);
    }

    async fn after_wiring_change(&self) {
        if self.0.config.wiring.auto_connect {
            self.auto_connect().await;
        }
        self.retry_requests().await;
    }

    /// Process identifiers of all registered endpoints, in order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.0.registry.lock().pids()
    }

    /// Looks up an endpoint by process identifier, falling back to the first endpoint
    /// whose identifier starts with `pid`.
    #[must_use]
    pub fn endpoint(&self, pid: &str) -> Option<EndpointSnapshot> {
        let registry = self.0.registry.lock();
        let resolved = registry.resolve_pid(pid)?;
        registry.describe_endpoint(resolved)
    }

    /// The open ports of the endpoint registered exactly as `pid`.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnknownEndpoint`] if `pid` is not registered.
    pub fn ports(&self, pid: &str) -> Result<Vec<PortSnapshot>, FabricError> {
        self.0
            .registry
            .lock()
            .describe_endpoint(pid)
            .map(|endpoint| endpoint.ports)
            .ok_or_else(|| FabricError::UnknownEndpoint(pid.to_string()))
    }

    /// A point-in-time view of all endpoints, ports, and matches.
    #[must_use]
    pub fn snapshot(&self) -> WiringSnapshot {
        self.0.registry.lock().snapshot()
    }

    /// Every match of the given port.
    ///
    /// # Errors
    ///
    /// [`FabricError::UnknownEndpoint`] or [`FabricError::UnknownPort`].
    pub fn potential_connections(
        &self,
        port: &PortId,
    ) -> Result<Vec<PotentialConnection>, FabricError> {
        let keys = self.0.registry.lock().matches_of(port)?;
        Ok(keys
            .into_iter()
            .map(|key| PotentialConnection::new(self.clone(), key))
            .collect())
    }

    /// The match between two ports.
    ///
    /// # Errors
    ///
    /// [`FabricError::SelfConnectionRejected`] for two ports of one endpoint,
    /// [`FabricError::UnknownEndpoint`] or [`FabricError::UnknownPort`] for unregistered
    /// ports, and [`FabricError::NoMatch`] for incompatible ones.
    pub fn potential_connection(
        &self,
        a: &PortId,
        b: &PortId,
    ) -> Result<PotentialConnection, FabricError> {
        let key = self.0.registry.lock().resolve_match(a, b)?;
        Ok(PotentialConnection::new(self.clone(), key))
    }

    /// Whether the two ports are currently connected.
    ///
    /// # Errors
    ///
    /// As [`potential_connection`](Self::potential_connection).
    pub fn is_connected(&self, a: &PortId, b: &PortId) -> Result<bool, FabricError> {
        Ok(self.potential_connection(a, b)?.is_connected())
    }

    /// Whether a handshake between the two ports could start right now.
    ///
    /// # Errors
    ///
    /// As [`potential_connection`](Self::potential_connection).
    pub fn is_connectable(&self, a: &PortId, b: &PortId) -> Result<bool, FabricError> {
        Ok(self.potential_connection(a, b)?.is_connectable())
    }

    /// Connects two ports.
    ///
    /// Both endpoints' `on_connect` run on the calling task. If either refuses, the
    /// match becomes `Disconnected` and [`HandshakeOutcome::Refused`] is returned.
    ///
    /// # Errors
    ///
    /// As [`potential_connection`](Self::potential_connection), plus
    /// [`FabricError::AlreadyConnected`] and [`FabricError::CardinalityViolation`] when
    /// the match is not connectable, and [`FabricError::PortClosed`] when an endpoint is
    /// removed while the handshake runs.
    pub async fn connect(&self, a: &PortId, b: &PortId) -> Result<HandshakeOutcome, FabricError> {
        let key = self.0.registry.lock().resolve_match(a, b)?;
        self.connect_match(&key).await
    }

    /// Disconnects two ports and waits until both handlers have run `disconnected`.
    ///
    /// Disconnecting a match that is not connected does nothing.
    ///
    /// # Errors
    ///
    /// As [`potential_connection`](Self::potential_connection).
    pub async fn disconnect(&self, a: &PortId, b: &PortId) -> Result<(), FabricError> {
        let key = self.0.registry.lock().resolve_match(a, b)?;
        self.disconnect_match(&key).await
    }

    /// Connects every untouched match that is the only option for a single-cardinality
    /// port and whose other end is a multiple-cardinality port or likewise has no
    /// alternative. Returns the number of connections made.
    pub async fn auto_connect(&self) -> usize {
        let candidates = self.0.registry.lock().auto_connect_candidates();
        let mut connected = 0;
        for key in candidates {
            match self.connect_match(&key).await {
                Ok(HandshakeOutcome::Connected) => connected += 1,
                Ok(HandshakeOutcome::Refused) => trace!("Auto-connect of {} refused", key),
                Err(e) if e.is_state_conflict() => trace!("Auto-connect of {} skipped: {}", key, e),
                Err(e) => warn!("Auto-connect of {} failed: {}", key, e),
            }
        }
        if connected > 0 {
            info!("Auto-connected {} matches", connected);
        }
        connected
    }

    /// Requests that two ports be connected once both exist.
    ///
    /// The request is tried immediately and then after every endpoint registration or
    /// modification until it resolves or is cancelled.
    ///
    /// # Errors
    ///
    /// [`FabricError::SelfConnectionRejected`] for two ports of one endpoint and
    /// [`FabricError::FabricShutdown`] after shutdown.
    pub async fn request_connection(
        &self,
        a: PortId,
        b: PortId,
    ) -> Result<ConnectionFuture, FabricError> {
        let request = self.register_request(a, b)?;
        if self.try_resolve(&request).await {
            self.forget_request(&request);
        }
        Ok(ConnectionFuture::new(request, self.clone()))
    }

    pub(crate) fn register_request(
        &self,
        a: PortId,
        b: PortId,
    ) -> Result<Arc<ConnectionRequest>, FabricError> {
        if self.is_shut_down() {
            return Err(FabricError::FabricShutdown);
        }
        if a.pid() == b.pid() {
            return Err(FabricError::SelfConnectionRejected(a.pid().to_string()));
        }
        trace!("Connection requested: {} <-> {}", a, b);
        let request = ConnectionRequest::new(a, b);
        self.0.requests.lock().push(request.clone());
        Ok(request)
    }

    pub(crate) fn forget_request(&self, request: &Arc<ConnectionRequest>) {
        self.0
            .requests
            .lock()
            .retain(|pending| !Arc::ptr_eq(pending, request));
    }

    /// Number of connection requests still waiting to resolve.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.0.requests.lock().len()
    }

    async fn retry_requests(&self) {
        let pending: Vec<Arc<ConnectionRequest>> = self.0.requests.lock().clone();
        for request in pending {
            if self.try_resolve(&request).await {
                self.forget_request(&request);
            }
        }
    }

    /// Tries to connect a request's match. Returns `true` once the request is settled.
    async fn try_resolve(&self, request: &ConnectionRequest) -> bool {
        if !request.is_pending() {
            return true;
        }
        let resolved = self.0.registry.lock().resolve_match(&request.a, &request.b);
        let key = match resolved {
            Ok(key) => key,
            Err(e) => {
                trace!("Connection request {} <-> {} waiting: {}", request.a, request.b, e);
                return false;
            }
        };
        let state = self.0.registry.lock().state(&key);
        if state != Some(MatchState::Connected) {
            match self.connect_match(&key).await {
                Ok(HandshakeOutcome::Connected) => {}
                Ok(HandshakeOutcome::Refused) => return false,
                Err(e) => {
                    trace!("Connection request for {} not connected yet: {}", key, e);
                    let state = self.0.registry.lock().state(&key);
                    if state != Some(MatchState::Connected) {
                        return false;
                    }
                }
            }
        }
        request.resolve(key.clone());
        info!("Connection request resolved: {}", key);
        true
    }

    /// Registers a traffic listener.
    ///
    /// An empty `filter` receives every message; otherwise the listener receives messages
    /// whose type is, or is a declared subtype of, a filter entry.
    pub fn add_listener(
        &self,
        listener: Arc<dyn TrafficListener>,
        filter: Vec<MessageType>,
    ) -> ListenerId {
        self.0.observers.add_listener(listener, filter)
    }

    /// Unregisters a traffic listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.0.observers.remove_listener(id)
    }

    /// Shuts the fabric down.
    ///
    /// Cancels outstanding connection requests, then removes every endpoint, which
    /// disconnects all connections. If that does not finish within the configured
    /// shutdown budget, all fabric tasks are cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the fabric's tasks do not stop within the budget even after
    /// cancellation.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        use tokio::time::timeout as tokio_timeout;

        let pids = {
            let registry = self.0.registry.lock();
            if self.0.shut_down.swap(true, Ordering::AcqRel) {
                trace!("Fabric already shut down");
                return Ok(());
            }
            registry.pids()
        };

        let requests: Vec<Arc<ConnectionRequest>> = self.0.requests.lock().drain(..).collect();
        for request in requests {
            request.cancel();
        }

        let budget = self.0.config.shutdown_timeout();
        trace!("Removing {} endpoints", pids.len());
        let removals = pids.iter().map(|pid| async move {
            if let Err(e) = self.remove_endpoint(pid).await {
                error!("Error removing endpoint {}: {}", pid, e);
            }
        });
        if tokio_timeout(budget, join_all(removals)).await.is_err() {
            error!(
                "Fabric shutdown timeout expired after {:?}. Forcefully cancelling remaining tasks.",
                budget
            );
            self.0.cancellation_token.cancel();
        }

        self.0.observers.close();
        self.0.tracker.close();
        if tokio_timeout(budget, self.0.tracker.wait()).await.is_err() {
            self.0.cancellation_token.cancel();
            error!("Fabric tasks still running after {:?}", budget);
            return Err(anyhow::anyhow!(
                "Timeout while waiting for fabric tasks to stop after {budget:?}"
            ));
        }
        info!("Fabric shut down");
        Ok(())
    }
}

#[async_trait]
impl RegistryListener for Fabric {
    async fn endpoint_added(
        &self,
        pid: &str,
        endpoint: Arc<dyn Endpoint>,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError> {
        self.add_endpoint(pid, endpoint, ports).await
    }

    async fn endpoint_modified(
        &self,
        pid: &str,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError> {
        self.modify_endpoint(pid, ports).await
    }

    async fn endpoint_removed(&self, pid: &str) -> Result<(), FabricError> {
        self.remove_endpoint(pid).await
    }
}
