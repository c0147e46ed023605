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
use crate::endpoint::HalfConnection;
use crate::traits::MessageHandler;

/// A participant in the fabric that owns ports and takes part in handshakes.
///
/// The fabric calls [`on_connect`](Endpoint::on_connect) once for each side of a
/// connection being established. The endpoint receives its [`HalfConnection`], which it
/// keeps to send messages to the peer, and answers with the handler that should receive
/// the peer's messages. Returning `None` refuses the connection.
///
/// `on_connect` runs on the task that requested the connection, not on the endpoint's
/// dispatch context, so it may run concurrently with the endpoint's handlers.
pub trait Endpoint: Send + Sync + 'static {
    /// Accepts or refuses a connection on one of this endpoint's ports.
    fn on_connect(&self, connection: HalfConnection) -> Option<Box<dyn MessageHandler>>;
}
