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
//! Crate-internal type aliases shared by the dispatch and connection machinery.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::{MessageHandler, TrafficListener};

/// A handler installed on a route.
///
/// The route and the dispatch context both hold it; only the dispatch context's worker
/// ever locks it, so the lock is uncontended in practice.
pub(crate) type SharedHandler = Arc<Mutex<Box<dyn MessageHandler>>>;

/// A registered traffic listener together with its type filter.
pub(crate) type ListenerEntry = (Arc<dyn TrafficListener>, Vec<crate::message::MessageType>);
