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
use std::sync::Arc;

use async_trait::async_trait;

use crate::common::FabricError;
use crate::endpoint::PortDescriptor;
use crate::traits::Endpoint;

/// The contract through which endpoint lifecycle changes reach the fabric.
///
/// A directory or discovery layer sitting in front of the fabric reports endpoints
/// appearing, changing their port set, and going away. [`Fabric`](crate::common::Fabric)
/// implements this trait, so such a layer can hold it as `Arc<dyn RegistryListener>`.
#[async_trait]
pub trait RegistryListener: Send + Sync {
    /// A new endpoint appeared with the given ports.
    async fn endpoint_added(
        &self,
        pid: &str,
        endpoint: Arc<dyn Endpoint>,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError>;

    /// An existing endpoint now exposes a different set of ports.
    async fn endpoint_modified(
        &self,
        pid: &str,
        ports: Vec<PortDescriptor>,
    ) -> Result<(), FabricError>;

    /// An endpoint went away.
    async fn endpoint_removed(&self, pid: &str) -> Result<(), FabricError>;
}
