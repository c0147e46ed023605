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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, instrument, trace, warn};

use crate::common::registry::{Handshake, HandshakeSide};
use crate::common::{Fabric, FabricError, MatchKey, ObserverBus, SharedHandler};
use crate::endpoint::{Connection, HalfConnection, Route};
use crate::traits::MessageHandler;

/// How a handshake ended when neither side went away during it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeOutcome {
    /// Both endpoints supplied a handler; the match is now connected.
    Connected,
    /// At least one endpoint refused; the match is now disconnected and may be retried.
    Refused,
}

impl Fabric {
    /// Runs the handshake for a match.
    ///
    /// Both `on_connect` callbacks run on the calling task without the registry lock.
    /// Anything either side sends before the handshake settles is held on its route and
    /// delivered, in order, only if both sides accept.
    #[instrument(skip_all, fields(key = %key))]
    pub(crate) async fn connect_match(
        &self,
        key: &MatchKey,
    ) -> Result<HandshakeOutcome, FabricError> {
        let Handshake {
            key,
            match_id,
            left,
            right,
        } = self.0.registry.lock().begin_connect(key)?;
        trace!("Handshake started for {}", key);

        let outbound = Route::new(left.port.clone(), right.port.clone(), right.dispatch.clone());
        let inbound = Route::new(right.port.clone(), left.port.clone(), left.dispatch.clone());
        let left_handler = offer(&left, outbound.clone(), &self.0.observers);
        let right_handler = offer(&right, inbound.clone(), &self.0.observers);

        let (left_handler, right_handler) = match (left_handler, right_handler) {
            (Some(left_handler), Some(right_handler)) => (left_handler, right_handler),
            (left_handler, right_handler) => {
                let refused_by = if left_handler.is_none() {
                    &left.port
                } else {
                    &right.port
                };
                warn!("Handshake for {} refused by {}", key, refused_by);
                outbound.discard();
                inbound.discard();
                // The side that accepted still gets its disconnect notice.
                if let Some(handler) = left_handler {
                    let _ = inbound.dismiss(handler).await;
                }
                if let Some(handler) = right_handler {
                    let _ = outbound.dismiss(handler).await;
                }
                self.0.registry.lock().abort_connect(&key, match_id);
                return Ok(HandshakeOutcome::Refused);
            }
        };

        let left_handler: SharedHandler = Arc::new(Mutex::new(left_handler));
        let right_handler: SharedHandler = Arc::new(Mutex::new(right_handler));
        inbound.activate(left_handler);
        outbound.activate(right_handler);

        let connection = Connection::new(outbound, inbound);
        let finished = self.0.registry.lock().finish_connect(&key, match_id, connection);
        match finished {
            Ok(()) => {
                info!("Connected {}", key);
                Ok(HandshakeOutcome::Connected)
            }
            Err(connection) => {
                warn!("Match {} was dropped during its handshake", key);
                connection.teardown().await;
                let left_gone = {
                    let mut registry = self.0.registry.lock();
                    registry.settle(match_id);
                    !registry.contains_endpoint(left.port.pid())
                };
                let closed = if left_gone { left.port } else { right.port };
                Err(FabricError::PortClosed(closed))
            }
        }
    }

    /// Tears down a connected match and waits until both handlers have been notified.
    ///
    /// Does nothing for a match that is not connected.
    #[instrument(skip_all, fields(key = %key))]
    pub(crate) async fn disconnect_match(&self, key: &MatchKey) -> Result<(), FabricError> {
        let begun = self.0.registry.lock().begin_disconnect(key)?;
        let Some((match_id, connection)) = begun else {
            trace!("{} is not connected, nothing to disconnect", key);
            return Ok(());
        };
        connection.teardown().await;
        self.0.registry.lock().finish_disconnect(key, match_id);
        info!("Disconnected {}", key);
        Ok(())
    }
}

/// Offers one side its half-connection. A panicking `on_connect` counts as a refusal.
fn offer(
    side: &HandshakeSide,
    route: Arc<Route>,
    observers: &ObserverBus,
) -> Option<Box<dyn MessageHandler>> {
    let half = HalfConnection::new(route, side.descriptor.clone(), observers.clone());
    match catch_unwind(AssertUnwindSafe(|| side.endpoint.on_connect(half))) {
        Ok(handler) => handler,
        Err(_) => {
            error!("on_connect panicked for {}", side.port);
            None
        }
    }
}
