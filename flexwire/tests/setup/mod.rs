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
#![allow(dead_code)]

use std::future;
use std::sync::Once;
use std::time::Duration;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use flexwire::prelude::*;
use flexwire_test::prelude::*;

// Re-export endpoints and messages for easy access within tests.
pub use endpoints::*;
pub use messages::*;

pub mod endpoints;
pub mod messages;

/// How long a test waits for dispatch contexts to catch up.
pub const SETTLE: Duration = Duration::from_secs(5);

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/fabric_tests.txt`. Uses `std::sync::Once` so repeated calls
/// from different tests are harmless.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "fabric_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("flexwire::common=trace".parse().unwrap())
            .add_directive("flexwire::endpoint::dispatch_context=trace".parse().unwrap())
            .add_directive("flexwire::endpoint::half_connection=debug".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Starts a fabric on the test's runtime without reading any user configuration.
pub fn launch() -> anyhow::Result<Fabric> {
    launch_with(FabricConfig::default())
}

/// Starts a fabric on the test's runtime with `config`.
pub fn launch_with(config: FabricConfig) -> anyhow::Result<Fabric> {
    Ok(FlexApp::builder().config(config).build()?)
}

/// Waits until `condition` holds, giving up after [`SETTLE`].
pub async fn settles(condition: impl Fn() -> bool) -> bool {
    eventually(SETTLE, || future::ready(condition())).await
}

pub fn port(pid: &str, name: &str) -> PortId {
    PortId::new(pid, name)
}

/// The flexibility port of a resource manager: offers forecasts, takes allocations.
pub fn rm_port() -> PortDescriptor {
    PortDescriptor::new("flex")
        .sends::<PowerForecast>()
        .accepts::<Allocation>()
}

/// The device-facing port of an energy manager, shared by many resource managers.
pub fn cem_port() -> PortDescriptor {
    PortDescriptor::new("devices")
        .sends::<Allocation>()
        .accepts::<PowerForecast>()
        .multiple()
}
