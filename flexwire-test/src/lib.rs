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

//! Test harness for flexwire endpoints.
//!
//! ```rust,ignore
//! use flexwire_test::prelude::*;
//!
//! #[flexwire_test]
//! async fn wires_two_endpoints() -> anyhow::Result<()> {
//!     let fabric = FlexApp::launch_async().await;
//!     // ...
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::time::Duration;

/// Re-exports used by the code `#[flexwire_test]` expands to.
#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}

/// Commonly used test items.
pub mod prelude {
    pub use flexwire_test_macro::flexwire_test;

    pub use crate::eventually;
}

/// Polls `condition` every few milliseconds until it holds or `timeout` elapses.
///
/// Delivery on a dispatch context is asynchronous, so assertions about what a handler
/// observed have to wait for the worker to catch up. Returns whether the condition
/// held before the deadline.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::debug!(?timeout, "condition did not hold before the deadline");
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
