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
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use flexwire::prelude::*;

/// What a handler saw, in the order its dispatch context ran it.
#[derive(Debug, Clone)]
pub enum Entry {
    Received {
        local: PortId,
        message: Arc<dyn FlexMessage>,
    },
    Disconnected {
        local: PortId,
        remote: PortId,
    },
}

/// Shared log of everything the handlers of one endpoint observed.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<Entry>>>);

impl Journal {
    pub fn entries(&self) -> Vec<Entry> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Every received payload of type `M`, in delivery order.
    pub fn received<M: Clone + 'static>(&self) -> Vec<M> {
        self.0
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Received { message, .. } => message.downcast_ref::<M>().cloned(),
                Entry::Disconnected { .. } => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> Vec<PortId> {
        self.0
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Disconnected { remote, .. } => Some(remote.clone()),
                Entry::Received { .. } => None,
            })
            .collect()
    }

    fn push(&self, entry: Entry) {
        self.0.lock().push(entry);
    }
}

/// Handler installed by [`Wired`] for each accepted connection.
pub struct JournalHandler {
    local: PortId,
    remote: PortId,
    journal: Journal,
}

impl MessageHandler for JournalHandler {
    fn handle_message(&mut self, message: Arc<dyn FlexMessage>) -> anyhow::Result<()> {
        self.journal.push(Entry::Received {
            local: self.local.clone(),
            message,
        });
        Ok(())
    }

    fn disconnected(&mut self) -> anyhow::Result<()> {
        info!("{} lost {}", self.local, self.remote);
        self.journal.push(Entry::Disconnected {
            local: self.local.clone(),
            remote: self.remote.clone(),
        });
        Ok(())
    }
}

type ConnectHook = Box<dyn Fn(&HalfConnection) + Send + Sync>;

/// A configurable endpoint that journals its traffic and keeps its half-connections.
#[derive(Default)]
pub struct Wired {
    journal: Journal,
    connections: Mutex<Vec<HalfConnection>>,
    refuse: AtomicBool,
    offers: AtomicUsize,
    on_connect: Option<ConnectHook>,
}

impl Wired {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An endpoint that refuses every connection.
    pub fn refusing() -> Arc<Self> {
        let wired = Self::default();
        wired.refuse.store(true, Ordering::SeqCst);
        Arc::new(wired)
    }

    /// An endpoint that runs `hook` on every accepted half-connection before returning
    /// its handler.
    pub fn with_hook(hook: impl Fn(&HalfConnection) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            on_connect: Some(Box::new(hook)),
            ..Self::default()
        })
    }

    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Number of times `on_connect` was called.
    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    /// The most recent accepted half-connection to `remote`.
    pub fn connection_to(&self, remote: &PortId) -> Option<HalfConnection> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|half| half.remote() == remote)
            .cloned()
    }

    pub fn connections(&self) -> Vec<HalfConnection> {
        self.connections.lock().clone()
    }
}

impl Endpoint for Wired {
    fn on_connect(&self, connection: HalfConnection) -> Option<Box<dyn MessageHandler>> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            info!("{} refusing {}", connection.local(), connection.remote());
            return None;
        }
        if let Some(hook) = &self.on_connect {
            hook(&connection);
        }
        let handler = JournalHandler {
            local: connection.local().clone(),
            remote: connection.remote().clone(),
            journal: self.journal.clone(),
        };
        self.connections.lock().push(connection);
        Some(Box::new(handler))
    }
}

/// Journals only how many traffic events it saw and of which types.
#[derive(Debug, Default)]
pub struct TrafficTap {
    seen: Mutex<Vec<(PortId, PortId, MessageType)>>,
}

impl TrafficTap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<(PortId, PortId, MessageType)> {
        self.seen.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl TrafficListener for TrafficTap {
    fn on_traffic(&self, event: &TrafficEvent) -> anyhow::Result<()> {
        self.seen
            .lock()
            .push((event.from().clone(), event.to().clone(), event.message_type()));
        Ok(())
    }
}
