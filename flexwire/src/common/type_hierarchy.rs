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
use std::collections::{BTreeSet, HashSet, VecDeque};

use dashmap::DashMap;

use crate::message::MessageType;

/// Declared subtype relations between message types.
///
/// Rust types have no inheritance, so a port that accepts a general message type only
/// matches senders of more specific types once the relation is declared here. The
/// relation is transitive and every type is assignable to itself.
///
/// # Thread Safety
///
/// The hierarchy uses [`DashMap`] internally and may be read and extended concurrently.
///
/// # Example
///
/// ```rust,ignore
/// let hierarchy = TypeHierarchy::new();
/// hierarchy.declare_subtype::<CurtailmentAllocation, Allocation>();
/// assert!(hierarchy.is_assignable(
///     MessageType::of::<CurtailmentAllocation>(),
///     MessageType::of::<Allocation>(),
/// ));
/// ```
#[derive(Default)]
pub struct TypeHierarchy {
    /// Direct supertypes declared for each type.
    supertypes: DashMap<MessageType, HashSet<MessageType>>,
}

impl std::fmt::Debug for TypeHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHierarchy")
            .field("declared_types", &self.supertypes.len())
            .finish()
    }
}

impl TypeHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `Sub` may be delivered wherever `Super` is accepted.
    pub fn declare_subtype<Sub: 'static, Super: 'static>(&self) {
        self.declare(MessageType::of::<Sub>(), MessageType::of::<Super>());
    }

    /// Declares a subtype relation by tag. Returns `false` if it was already declared.
    pub fn declare(&self, sub: MessageType, sup: MessageType) -> bool {
        if sub == sup {
            return false;
        }
        self.supertypes.entry(sub).or_default().insert(sup)
    }

    /// Returns `true` if a value of type `from` may be used where `to` is expected.
    #[must_use]
    pub fn is_assignable(&self, from: MessageType, to: MessageType) -> bool {
        from == to || self.supertypes_of(from).contains(&to)
    }

    /// `message_type` together with all of its transitive supertypes.
    #[must_use]
    pub fn assignable_targets(&self, message_type: MessageType) -> BTreeSet<MessageType> {
        let mut targets = self.supertypes_of(message_type);
        targets.insert(message_type);
        targets.into_iter().collect()
    }

    fn supertypes_of(&self, message_type: MessageType) -> HashSet<MessageType> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([message_type]);
        while let Some(current) = queue.pop_front() {
            // Clone the direct set so no shard lock is held while we keep walking.
            let direct = self
                .supertypes
                .get(&current)
                .map(|entry| entry.value().clone());
            for sup in direct.into_iter().flatten() {
                if sup != message_type && seen.insert(sup) {
                    queue.push_back(sup);
                }
            }
        }
        seen
    }
}
