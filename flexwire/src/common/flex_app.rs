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
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{trace, warn};

use crate::common::config::CONFIG;
use crate::common::fabric_inner::{FabricInner, FabricRuntime};
use crate::common::registry::Registry;
use crate::common::{Fabric, FabricConfig, FabricError, ObserverBus, TypeHierarchy};

/// Represents the entry point for starting a wiring fabric.
///
/// The primary ways to use it are via:
/// - [`FlexApp::launch_async()`] - Preferred when in an async context
/// - [`FlexApp::launch()`] - For synchronous contexts; provisions a runtime if needed
/// - [`FlexApp::builder()`] - To supply configuration, a runtime, or subtype relations
#[derive(Default, Debug, Clone)]
pub struct FlexApp;

impl FlexApp {
    /// Starts a fabric on the current Tokio runtime.
    ///
    /// Configuration is read with [`FabricConfig::load`] the first time any fabric in
    /// the process is launched without one, and reused afterwards.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use flexwire::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let fabric = FlexApp::launch_async().await;
    ///     // Register endpoints...
    ///     fabric.shutdown().await
    /// }
    /// ```
    pub async fn launch_async() -> Fabric {
        trace!("Starting fabric (async)");
        Self::builder().assemble(FabricRuntime::borrowed(Handle::current()))
    }

    /// Starts a fabric from synchronous code.
    ///
    /// Uses the current Tokio runtime if there is one; otherwise provisions a
    /// multi-thread runtime owned by the fabric, sized by `[runtime]` in the
    /// configuration. Use [`Fabric::block_on`] to drive async operations from
    /// synchronous code.
    ///
    /// # Errors
    ///
    /// [`FabricError::RuntimeUnavailable`] if a runtime had to be provisioned and could
    /// not be.
    pub fn launch() -> Result<Fabric, FabricError> {
        trace!("Starting fabric (sync)");
        Self::builder().build()
    }

    /// Starts configuring a fabric.
    #[must_use]
    pub fn builder() -> FabricBuilder {
        FabricBuilder::default()
    }
}

/// Configures and starts a [`Fabric`].
///
/// ```rust,ignore
/// let fabric = FlexApp::builder()
///     .config(FabricConfig::default())
///     .subtype::<CurtailmentAllocation, Allocation>()
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct FabricBuilder {
    config: Option<FabricConfig>,
    runtime: Option<Handle>,
    hierarchy: TypeHierarchy,
}

impl FabricBuilder {
    /// Uses `config` instead of the process-wide configuration.
    #[must_use]
    pub fn config(mut self, config: FabricConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Runs the fabric's tasks on `handle`.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Declares that `Sub` may be delivered wherever `Super` is accepted.
    #[must_use]
    pub fn subtype<Sub: 'static, Super: 'static>(self) -> Self {
        self.hierarchy.declare_subtype::<Sub, Super>();
        self
    }

    /// Starts the fabric.
    ///
    /// The runtime is, in order of preference, the one given to
    /// [`runtime`](Self::runtime), the current one, or a newly provisioned one.
    ///
    /// # Errors
    ///
    /// [`FabricError::RuntimeUnavailable`] if a runtime could not be provisioned.
    pub fn build(mut self) -> Result<Fabric, FabricError> {
        let runtime = match self.runtime.take().or_else(|| Handle::try_current().ok()) {
            Some(handle) => FabricRuntime::borrowed(handle),
            None => {
                let config = self.config.get_or_insert_with(|| CONFIG.clone());
                FabricRuntime::provision(&config.runtime)?
            }
        };
        Ok(self.assemble(runtime))
    }

    fn assemble(self, runtime: FabricRuntime) -> Fabric {
        let config = self.config.unwrap_or_else(|| CONFIG.clone());
        trace!("Configuration loaded: {:?}", config);

        let tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let hierarchy = Arc::new(self.hierarchy);
        let observers = ObserverBus::spawn(
            runtime.handle(),
            &tracker,
            cancellation_token.clone(),
            hierarchy.clone(),
        );

        let fabric = Fabric(Arc::new(FabricInner {
            registry: Mutex::new(Registry::default()),
            hierarchy,
            observers,
            requests: Mutex::new(Vec::new()),
            config,
            runtime,
            tracker,
            cancellation_token,
            shut_down: AtomicBool::new(false),
        }));

        for (a, b) in fabric.0.config.wiring.connection_pairs() {
            if let Err(e) = fabric.register_request(a, b) {
                warn!("Ignoring configured connection: {}", e);
            }
        }
        trace!(
            "Fabric started with {} configured connection requests",
            fabric.pending_requests()
        );
        fabric
    }
}
