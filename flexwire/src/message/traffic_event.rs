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

use derive_new::new;

use crate::endpoint::PortId;
use crate::message::MessageType;
use crate::traits::FlexMessage;

/// One message observed on the fabric, as handed to traffic listeners.
///
/// Events are published for every send, whatever the state of the connection, so a
/// listener may see messages that were subsequently discarded.
#[derive(new, Debug, Clone)]
pub struct TrafficEvent {
    from: PortId,
    to: PortId,
    message: Arc<dyn FlexMessage>,
}

impl TrafficEvent {
    /// The sending port.
    #[inline]
    #[must_use]
    pub const fn from(&self) -> &PortId {
        &self.from
    }

    /// The port the message was addressed to.
    #[inline]
    #[must_use]
    pub const fn to(&self) -> &PortId {
        &self.to
    }

    /// The payload, shared with the receiving handler.
    #[inline]
    #[must_use]
    pub const fn message(&self) -> &Arc<dyn FlexMessage> {
        &self.message
    }

    /// The tag of the payload's concrete type.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message.as_ref().message_type()
    }
}
