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
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, instrument, trace, warn};

use crate::common::{ListenerEntry, TypeHierarchy};
use crate::endpoint::PortId;
use crate::message::{MessageType, TrafficEvent};
use crate::traits::{FlexMessage, TrafficListener};

/// Identifies a registered traffic listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

/// Fans sent messages out to traffic listeners.
///
/// Publishing only enqueues the event; a single worker task delivers events to the
/// listeners whose filter matches, in publication order. A listener with an empty
/// filter sees everything. A filter entry matches a payload whose type is the entry or
/// a declared subtype of it.
#[derive(Clone)]
pub(crate) struct ObserverBus {
    listeners: Listeners,
    sender: Arc<Mutex<Option<UnboundedSender<TrafficEvent>>>>,
    next_id: Arc<AtomicU64>,
}

type Listeners = Arc<DashMap<ListenerId, ListenerEntry>>;

impl std::fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverBus")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ObserverBus {
    pub(crate) fn spawn(
        runtime: &Handle,
        tracker: &TaskTracker,
        cancellation_token: CancellationToken,
        hierarchy: Arc<TypeHierarchy>,
    ) -> Self {
        let (sender, queue) = mpsc::unbounded_channel();
        let listeners: Listeners = Arc::new(DashMap::new());
        tracker.spawn_on(
            broadcast_loop(queue, listeners.clone(), hierarchy, cancellation_token),
            runtime,
        );
        trace!("Observer bus started");
        Self {
            listeners,
            sender: Arc::new(Mutex::new(Some(sender))),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn publish(&self, from: PortId, to: PortId, message: Arc<dyn FlexMessage>) {
        if self.listeners.is_empty() {
            return;
        }
        let guard = self.sender.lock();
        if let Some(sender) = guard.as_ref() {
            if sender.send(TrafficEvent::new(from, to, message)).is_err() {
                trace!("Observer bus has stopped, event dropped");
            }
        }
    }

    pub(crate) fn add_listener(
        &self,
        listener: Arc<dyn TrafficListener>,
        filter: Vec<MessageType>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        trace!(listener = ?id, filter = ?filter, "Traffic listener added");
        self.listeners.insert(id, (listener, filter));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Stops accepting events. Events already queued are still delivered.
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }
}

#[instrument(skip_all)]
async fn broadcast_loop(
    mut queue: UnboundedReceiver<TrafficEvent>,
    listeners: Listeners,
    hierarchy: Arc<TypeHierarchy>,
    cancellation_token: CancellationToken,
) {
    let mut cancel = pin!(cancellation_token.cancelled());
    loop {
        tokio::select! {
            () = &mut cancel => {
                trace!("Forceful cancellation triggered for observer bus");
                break;
            }
            incoming = queue.recv() => {
                let Some(event) = incoming else { break; };
                broadcast(&listeners, &hierarchy, &event);
            }
        }
    }
    trace!("Observer bus stopped.");
}

fn broadcast(listeners: &Listeners, hierarchy: &TypeHierarchy, event: &TrafficEvent) {
    let message_type = event.message_type();
    // Snapshot so that a listener may add or remove listeners while being notified.
    let interested: Vec<(ListenerId, Arc<dyn TrafficListener>)> = listeners
        .iter()
        .filter(|entry| {
            let filter = &entry.value().1;
            filter.is_empty()
                || filter
                    .iter()
                    .any(|accepted| hierarchy.is_assignable(message_type, *accepted))
        })
        .map(|entry| (*entry.key(), entry.value().0.clone()))
        .collect();

    trace!(count = interested.len(), message_type = %message_type, "Broadcasting traffic event");
    for (id, listener) in interested {
        match catch_unwind(AssertUnwindSafe(|| listener.on_traffic(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(listener = ?id, "Traffic listener failed: {:?}", e),
            Err(_) => error!(listener = ?id, "Traffic listener panicked"),
        }
    }
}
