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
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::common::SharedHandler;
use crate::endpoint::PortId;
use crate::traits::FlexMessage;

/// Work submitted to an endpoint's dispatch context.
///
/// Commands are executed one at a time, in submission order.
pub(crate) enum Command {
    /// Hand a payload to the handler of one half-connection.
    Deliver {
        handler: SharedHandler,
        from: PortId,
        payload: Arc<dyn FlexMessage>,
    },
    /// Notify a handler that its connection is gone, then acknowledge.
    ///
    /// The acknowledgement is sent even when the handler fails; dropping `ack` counts as
    /// an acknowledgement too.
    Disconnect {
        handler: SharedHandler,
        peer: PortId,
        ack: oneshot::Sender<()>,
    },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deliver { from, payload, .. } => f
                .debug_struct("Deliver")
                .field("from", from)
                .field("payload", payload)
                .finish_non_exhaustive(),
            Self::Disconnect { peer, .. } => f
                .debug_struct("Disconnect")
                .field("peer", peer)
                .finish_non_exhaustive(),
        }
    }
}
