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
use flexwire::prelude::*;

#[flex_message]
#[derive(PartialEq, Eq)]
pub struct PowerForecast {
    pub kw: i64,
}

#[flex_message]
#[derive(PartialEq, Eq)]
pub struct Allocation {
    pub id: u32,
}

/// Declared a subtype of [`Allocation`] in tests that need one.
#[flex_message]
#[derive(PartialEq, Eq)]
pub struct CurtailmentAllocation {
    pub id: u32,
}

#[flex_message]
pub struct Heartbeat;

#[flex_message]
pub struct InstructionStatus {
    pub id: u32,
    pub accepted: bool,
}
