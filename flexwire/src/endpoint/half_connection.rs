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
use std::mem;
use std::sync::Arc;

use futures::future::join;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::common::{ObserverBus, SharedHandler};
use crate::endpoint::{DispatchContext, PortDescriptor, PortId};
use crate::message::Command;
use crate::traits::{FlexMessage, MessageHandler};

/// Where a route currently sends its payloads.
enum RouteState {
    /// The handshake is still running; payloads wait here in send order.
    Pending(Vec<Arc<dyn FlexMessage>>),
    /// Payloads go to the receiving endpoint's dispatch context.
    Active(SharedHandler),
    /// Payloads are dropped.
    Discard,
}

/// One direction of a connection: from a sending port to the handler of the receiving
/// port, executed on the receiver's dispatch context.
pub(crate) struct Route {
    from: PortId,
    to: PortId,
    target: DispatchContext,
    state: Mutex<RouteState>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            RouteState::Pending(buffer) => format!("Pending({})", buffer.len()),
            RouteState::Active(_) => "Active".to_string(),
            RouteState::Discard => "Discard".to_string(),
        };
        f.debug_struct("Route")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("state", &state)
            .finish()
    }
}

impl Route {
    pub(crate) fn new(from: PortId, to: PortId, target: DispatchContext) -> Arc<Self> {
        Arc::new(Self {
            from,
            to,
            target,
            state: Mutex::new(RouteState::Pending(Vec::new())),
        })
    }

    fn deliver(&self, payload: Arc<dyn FlexMessage>) {
        let mut state = self.state.lock();
        match &mut *state {
            RouteState::Pending(buffer) => buffer.push(payload),
            RouteState::Active(handler) => self.submit(handler.clone(), payload),
            RouteState::Discard => trace!("Discarding {:?} sent on {}", payload, self.from),
        }
    }

    fn submit(&self, handler: SharedHandler, payload: Arc<dyn FlexMessage>) {
        let command = Command::Deliver {
            handler,
            from: self.from.clone(),
            payload,
        };
        if let Err(rejected) = self.target.submit(command) {
            trace!("Dispatch context of {} is closed, dropping {:?}", self.to, rejected);
        }
    }

    /// Installs the receiving handler and flushes everything sent during the handshake.
    ///
    /// The flush happens under the route lock, so no later send can overtake it.
    pub(crate) fn activate(&self, handler: SharedHandler) {
        let mut state = self.state.lock();
        if let RouteState::Pending(buffer) = &mut *state {
            let buffered = mem::take(buffer);
            if !buffered.is_empty() {
                trace!("Flushing {} buffered messages {} -> {}", buffered.len(), self.from, self.to);
            }
            for payload in buffered {
                self.submit(handler.clone(), payload);
            }
            *state = RouteState::Active(handler);
        }
    }

    /// Switches the route to discarding and returns the handler it was using, if any.
    pub(crate) fn discard(&self) -> Option<SharedHandler> {
        match mem::replace(&mut *self.state.lock(), RouteState::Discard) {
            RouteState::Active(handler) => Some(handler),
            RouteState::Pending(_) | RouteState::Discard => None,
        }
    }

    /// Notifies a handler that was accepted but never installed because the other side
    /// refused.
    pub(crate) fn dismiss(&self, handler: Box<dyn MessageHandler>) -> oneshot::Receiver<()> {
        self.notify_disconnect(Some(Arc::new(Mutex::new(handler))))
    }

    fn is_discarding(&self) -> bool {
        matches!(*self.state.lock(), RouteState::Discard)
    }

    /// Queues the disconnect notice for the receiving handler.
    ///
    /// The returned receiver completes once the notice has run, or immediately if there
    /// is no handler or the receiving context is already closed.
    fn notify_disconnect(&self, handler: Option<SharedHandler>) -> oneshot::Receiver<()> {
        let (ack, done) = oneshot::channel();
        if let Some(handler) = handler {
            let command = Command::Disconnect {
                handler,
                peer: self.from.clone(),
                ack,
            };
            // A rejected command drops its ack, which completes `done`.
            if self.target.submit(command).is_err() {
                trace!("Dispatch context of {} already closed", self.to);
            }
        }
        done
    }
}

/// One endpoint's view of a connection.
///
/// Handed to [`Endpoint::on_connect`](crate::traits::Endpoint::on_connect). Keep it to
/// send messages to the peer. Sending never blocks the caller: messages sent before the
/// handshake completes are held and delivered in order once it does, and messages sent
/// after the connection is torn down or refused are dropped.
#[derive(Clone)]
pub struct HalfConnection {
    route: Arc<Route>,
    port: Arc<PortDescriptor>,
    observers: ObserverBus,
}

impl fmt::Debug for HalfConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HalfConnection")
            .field("local", &self.route.from)
            .field("remote", &self.route.to)
            .finish_non_exhaustive()
    }
}

impl HalfConnection {
    pub(crate) fn new(route: Arc<Route>, port: Arc<PortDescriptor>, observers: ObserverBus) -> Self {
        Self {
            route,
            port,
            observers,
        }
    }

    /// Sends a message to the peer.
    pub fn send<M: FlexMessage>(&self, message: M) {
        self.send_arc(Arc::new(message));
    }

    /// Sends an already shared payload to the peer without re-wrapping it.
    pub fn send_arc(&self, message: Arc<dyn FlexMessage>) {
        self.observers
            .publish(self.route.from.clone(), self.route.to.clone(), message.clone());
        self.route.deliver(message);
    }

    /// Sends `message` if there is one.
    ///
    /// Returns `false` without sending anything for `None`.
    pub fn send_optional<M: FlexMessage>(&self, message: Option<M>) -> bool {
        match message {
            Some(message) => {
                self.send(message);
                true
            }
            None => {
                debug!("Dropping empty message on {}", self.route.from);
                false
            }
        }
    }

    /// The local port's descriptor.
    #[must_use]
    pub fn port(&self) -> &PortDescriptor {
        &self.port
    }

    /// The local port's address.
    #[must_use]
    pub fn local(&self) -> &PortId {
        &self.route.from
    }

    /// The peer port's address.
    #[must_use]
    pub fn remote(&self) -> &PortId {
        &self.route.to
    }

    /// Returns `false` once the connection has been refused or torn down.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.route.is_discarding()
    }
}

/// Both routes of an established connection.
///
/// `outbound` carries messages from the match's left port to its right port, `inbound`
/// the reverse.
#[derive(Debug)]
pub(crate) struct Connection {
    outbound: Arc<Route>,
    inbound: Arc<Route>,
}

impl Connection {
    pub(crate) fn new(outbound: Arc<Route>, inbound: Arc<Route>) -> Self {
        Self { outbound, inbound }
    }

    /// Stops both directions, then waits until both handlers have run `disconnected`.
    ///
    /// The two notices run on their own endpoints' dispatch contexts, after every
    /// message that was already queued for them.
    pub(crate) async fn teardown(self) {
        let right_handler = self.outbound.discard();
        let left_handler = self.inbound.discard();
        let right_done = self.outbound.notify_disconnect(right_handler);
        let left_done = self.inbound.notify_disconnect(left_handler);
        // An error only means the notice was dropped unexecuted, which still counts.
        let _ = join(left_done, right_done).await;
        trace!("Connection {} <-> {} torn down", self.outbound.from, self.outbound.to);
    }
}
