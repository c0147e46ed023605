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
use std::any::Any;
use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::message::MessageType;

/// A marker trait for payloads that travel across fabric connections.
///
/// This trait combines `Any`, `Send`, `Sync` and `Debug` with [`DynClone`] so that a
/// payload can cross dispatch contexts, be shared with traffic listeners, be cloned as
/// a trait object, and be downcast back to its concrete type by the receiving handler.
///
/// A blanket implementation is provided. Any type that is `Clone + Debug + Send + Sync +
/// 'static` is a `FlexMessage`; the [`flex_message`](crate::prelude::flex_message)
/// attribute derives the missing pieces for you.
pub trait FlexMessage: DynClone + Any + Send + Sync + Debug {
    /// Returns the payload as a dynamic [`Any`] trait object.
    fn as_any(&self) -> &dyn Any;

    /// The tag of the payload's concrete type.
    ///
    /// This is the tag compared against a port's `accepts` set and against traffic
    /// listener filters.
    ///
    /// `Arc<dyn FlexMessage>` itself satisfies the blanket implementation, so call this
    /// through `message.as_ref()` when holding a shared payload.
    fn message_type(&self) -> MessageType;
}

dyn_clone::clone_trait_object!(FlexMessage);

impl<T> FlexMessage for T
where
    T: Any + Send + Sync + Debug + DynClone + 'static,
{
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn message_type(&self) -> MessageType {
        MessageType::of::<T>()
    }
}

impl dyn FlexMessage {
    /// Attempts to view the payload as a `T`.
    ///
    /// ```rust,ignore
    /// if let Some(allocation) = message.downcast_ref::<Allocation>() {
    ///     apply(allocation);
    /// }
    /// ```
    #[inline]
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the payload's concrete type is `T`.
    #[inline]
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }
}
