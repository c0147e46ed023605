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

use crate::traits::FlexMessage;

/// Receives the messages and the disconnect notice of one half-connection.
///
/// All calls for a handler are made sequentially on the owning endpoint's dispatch
/// context, in the order the messages were sent. Returning an error (or panicking) is
/// logged as a delivery fault and does not stop the dispatch context.
pub trait MessageHandler: Send + 'static {
    /// Handles one message from the peer.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatch context and otherwise ignored.
    fn handle_message(&mut self, message: Arc<dyn FlexMessage>) -> anyhow::Result<()>;

    /// Called exactly once after the connection has been torn down.
    ///
    /// No further messages are delivered to this handler afterwards.
    ///
    /// # Errors
    ///
    /// Any error is logged by the dispatch context and otherwise ignored.
    fn disconnected(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
