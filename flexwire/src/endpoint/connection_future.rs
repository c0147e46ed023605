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
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use crate::common::{Fabric, FabricError, MatchKey};
use crate::endpoint::{PortId, PotentialConnection};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Pending,
    Connected(MatchKey),
    Cancelled,
}

/// The shared state behind a [`ConnectionFuture`], also held by the fabric while the
/// request is outstanding.
pub(crate) struct ConnectionRequest {
    pub(crate) a: PortId,
    pub(crate) b: PortId,
    resolution: watch::Sender<Resolution>,
}

impl ConnectionRequest {
    pub(crate) fn new(a: PortId, b: PortId) -> Arc<Self> {
        let (resolution, _) = watch::channel(Resolution::Pending);
        Arc::new(Self { a, b, resolution })
    }

    pub(crate) fn is_pending(&self) -> bool {
        *self.resolution.borrow() == Resolution::Pending
    }

    /// Completes the request. Returns `false` if it was already settled.
    pub(crate) fn resolve(&self, key: MatchKey) -> bool {
        self.settle(Resolution::Connected(key))
    }

    pub(crate) fn cancel(&self) -> bool {
        self.settle(Resolution::Cancelled)
    }

    fn settle(&self, outcome: Resolution) -> bool {
        self.resolution.send_if_modified(|current| {
            if *current == Resolution::Pending {
                *current = outcome;
                true
            } else {
                false
            }
        })
    }
}

/// A request to connect two ports that may not exist yet.
///
/// The fabric retries the request every time an endpoint is added or modified and
/// resolves it as soon as the match between the two ports is connected, whoever
/// connected it. Cancelling stops the retries and fails current and future waits.
#[derive(Clone)]
pub struct ConnectionFuture {
    request: Arc<ConnectionRequest>,
    fabric: Fabric,
}

impl fmt::Debug for ConnectionFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFuture")
            .field("a", &self.request.a)
            .field("b", &self.request.b)
            .field("resolution", &*self.request.resolution.borrow())
            .finish()
    }
}

impl ConnectionFuture {
    pub(crate) const fn new(request: Arc<ConnectionRequest>, fabric: Fabric) -> Self {
        Self { request, fabric }
    }

    /// The two requested ports, in the order they were given.
    #[must_use]
    pub fn ports(&self) -> (&PortId, &PortId) {
        (&self.request.a, &self.request.b)
    }

    /// Whether the request resolved to a connected match.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.request.resolution.borrow(), Resolution::Connected(_))
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.request.resolution.borrow() == Resolution::Cancelled
    }

    /// The connected match, once resolved.
    #[must_use]
    pub fn potential_connection(&self) -> Option<PotentialConnection> {
        match &*self.request.resolution.borrow() {
            Resolution::Connected(key) => {
                Some(PotentialConnection::new(self.fabric.clone(), key.clone()))
            }
            Resolution::Pending | Resolution::Cancelled => None,
        }
    }

    /// Stops retrying. Returns `false` if the request had already resolved or been
    /// cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self.request.cancel();
        if cancelled {
            trace!("Connection request {} <-> {} cancelled", self.request.a, self.request.b);
            self.fabric.forget_request(&self.request);
        }
        cancelled
    }

    /// Waits until the request resolves.
    ///
    /// # Errors
    ///
    /// [`FabricError::ConnectionCancelled`] if the request is or gets cancelled.
    pub async fn await_connection(&self) -> Result<PotentialConnection, FabricError> {
        let mut resolution = self.request.resolution.subscribe();
        let outcome = resolution
            .wait_for(|current| *current != Resolution::Pending)
            .await
            .map(|settled| settled.clone())
            .map_err(|_| FabricError::FabricShutdown)?;
        match outcome {
            Resolution::Connected(key) => Ok(PotentialConnection::new(self.fabric.clone(), key)),
            Resolution::Cancelled => Err(FabricError::ConnectionCancelled {
                left: self.request.a.clone(),
                right: self.request.b.clone(),
            }),
            Resolution::Pending => Err(FabricError::FabricShutdown),
        }
    }

    /// Like [`await_connection`](Self::await_connection), but gives up after `timeout`.
    ///
    /// Timing out does not cancel the request; a later wait may still succeed.
    ///
    /// # Errors
    ///
    /// [`FabricError::ConnectionTimeout`] when the wait expires, otherwise as
    /// [`await_connection`](Self::await_connection).
    pub async fn await_connection_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PotentialConnection, FabricError> {
        tokio::time::timeout(timeout, self.await_connection())
            .await
            .map_err(|_| FabricError::ConnectionTimeout {
                left: self.request.a.clone(),
                right: self.request.b.clone(),
                timeout,
            })?
    }
}
