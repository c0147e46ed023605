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
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::common::config::RuntimeConfig;
use crate::common::registry::Registry;
use crate::common::{FabricConfig, FabricError, ObserverBus, TypeHierarchy};
use crate::endpoint::ConnectionRequest;

/// Internal state shared by every clone of a [`Fabric`](crate::common::Fabric).
pub(crate) struct FabricInner {
    /// Endpoints, ports, and matches. Never held across an await.
    pub(crate) registry: Mutex<Registry>,

    /// Declared subtype relations used for matching and listener filters.
    pub(crate) hierarchy: Arc<TypeHierarchy>,

    /// Fan-out of sent messages to traffic listeners.
    pub(crate) observers: ObserverBus,

    /// Connection futures that have not resolved yet.
    pub(crate) requests: Mutex<Vec<Arc<ConnectionRequest>>>,

    /// Configuration the fabric was launched with.
    pub(crate) config: FabricConfig,

    /// Where dispatch contexts and the observer bus run.
    pub(crate) runtime: FabricRuntime,

    /// Tracks every task the fabric spawned, for shutdown.
    pub(crate) tracker: TaskTracker,

    /// Forceful cancellation of all fabric tasks.
    pub(crate) cancellation_token: CancellationToken,

    /// Set once shutdown has begun; checked under the registry lock.
    pub(crate) shut_down: AtomicBool,
}

/// The Tokio runtime a fabric runs on: either one supplied by the application or one
/// the fabric provisioned and owns.
pub(crate) struct FabricRuntime {
    handle: Handle,
    owned: Option<OwnedRuntime>,
}

impl FabricRuntime {
    pub(crate) fn borrowed(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    pub(crate) fn provision(config: &RuntimeConfig) -> Result<Self, FabricError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(OwnedRuntime(Some(runtime))),
        })
    }

    pub(crate) const fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) const fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}

/// Shuts an owned runtime down without blocking, so the last fabric handle may be
/// dropped from inside async code.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}
