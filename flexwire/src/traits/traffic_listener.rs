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
use crate::message::TrafficEvent;

/// An observer of messages sent across the fabric.
///
/// Listeners are registered with
/// [`Fabric::add_listener`](crate::common::Fabric::add_listener) together with a type
/// filter. Notifications are delivered asynchronously on the observer bus, never on the
/// sender's task, and a failing listener does not affect senders or other listeners.
pub trait TrafficListener: Send + Sync + 'static {
    /// Observes one sent message.
    ///
    /// # Errors
    ///
    /// Errors are logged by the observer bus.
    fn on_traffic(&self, event: &TrafficEvent) -> anyhow::Result<()>;
}
