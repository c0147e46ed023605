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
//! Handlers and listeners that fail. These run on plain Tokio tests because the
//! `flexwire_test` harness treats any panic in the process as a test failure.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use flexwire::prelude::*;

use crate::setup::*;

mod setup;

/// Records forecasts with a positive value, errors on zero, and panics on negatives.
struct Fragile {
    seen: Arc<Mutex<Vec<i64>>>,
    panic_on_disconnect: bool,
}

impl MessageHandler for Fragile {
    fn handle_message(&mut self, message: Arc<dyn FlexMessage>) -> anyhow::Result<()> {
        let forecast = message
            .downcast_ref::<PowerForecast>()
            .ok_or_else(|| anyhow::anyhow!("unexpected payload {:?}", message))?;
        match forecast.kw {
            kw if kw < 0 => panic!("negative forecast {kw}"),
            0 => anyhow::bail!("empty forecast"),
            kw => self.seen.lock().push(kw),
        }
        Ok(())
    }

    fn disconnected(&mut self) -> anyhow::Result<()> {
        if self.panic_on_disconnect {
            panic!("cannot let go");
        }
        Ok(())
    }
}

struct FragileEndpoint {
    seen: Arc<Mutex<Vec<i64>>>,
    panic_on_disconnect: bool,
}

impl Endpoint for FragileEndpoint {
    fn on_connect(&self, _connection: HalfConnection) -> Option<Box<dyn MessageHandler>> {
        Some(Box::new(Fragile {
            seen: self.seen.clone(),
            panic_on_disconnect: self.panic_on_disconnect,
        }))
    }
}

struct Explosive;

impl Endpoint for Explosive {
    fn on_connect(&self, connection: HalfConnection) -> Option<Box<dyn MessageHandler>> {
        panic!("no wiring to {}", connection.remote());
    }
}

struct PanickingListener;

impl TrafficListener for PanickingListener {
    fn on_traffic(&self, _event: &TrafficEvent) -> anyhow::Result<()> {
        panic!("listener blew up");
    }
}

async fn fragile_pair(
    fabric: &Fabric,
    panic_on_disconnect: bool,
) -> anyhow::Result<(Arc<Wired>, Arc<Mutex<Vec<i64>>>)> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let rm = Wired::new();
    fabric.add_endpoint("rm-battery", rm.clone(), vec![rm_port()]).await?;
    fabric
        .add_endpoint(
            "cem",
            Arc::new(FragileEndpoint {
                seen: seen.clone(),
                panic_on_disconnect,
            }),
            vec![cem_port()],
        )
        .await?;
    fabric
        .connect(&port("rm-battery", "flex"), &port("cem", "devices"))
        .await?;
    Ok((rm, seen))
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_handler_does_not_stop_its_dispatch_context() -> anyhow::Result<()> {
    initialize_tracing();
    let fabric = launch()?;
    let (rm, seen) = fragile_pair(&fabric, false).await?;

    let half = rm
        .connection_to(&port("cem", "devices"))
        .expect("rm accepted");
    for kw in [1, -1, 2, 0, 3] {
        half.send(PowerForecast { kw });
    }

    assert!(settles(|| seen.lock().len() == 3).await);
    assert_eq!(*seen.lock(), vec![1, 2, 3]);

    fabric.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_panicking_disconnect_still_completes_the_teardown() -> anyhow::Result<()> {
    initialize_tracing();
    let fabric = launch()?;
    let (rm, _) = fragile_pair(&fabric, true).await?;

    let flex = port("rm-battery", "flex");
    let devices = port("cem", "devices");
    tokio::time::timeout(Duration::from_secs(5), fabric.disconnect(&flex, &devices)).await??;
    assert_eq!(rm.journal().disconnects(), vec![devices.clone()]);
    assert!(fabric.is_connectable(&flex, &devices)?);

    fabric.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_panicking_on_connect_counts_as_a_refusal() -> anyhow::Result<()> {
    initialize_tracing();
    let fabric = launch()?;
    let rm = Wired::new();
    fabric.add_endpoint("rm-battery", rm.clone(), vec![rm_port()]).await?;
    fabric
        .add_endpoint("cem", Arc::new(Explosive), vec![cem_port()])
        .await?;

    let flex = port("rm-battery", "flex");
    let devices = port("cem", "devices");
    assert_eq!(fabric.connect(&flex, &devices).await?, HandshakeOutcome::Refused);
    assert!(!fabric.is_connected(&flex, &devices)?);
    assert_eq!(rm.journal().disconnects(), vec![devices.clone()]);

    fabric.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn a_panicking_listener_does_not_stop_the_bus() -> anyhow::Result<()> {
    initialize_tracing();
    let fabric = launch()?;
    let tap = TrafficTap::new();
    fabric.add_listener(Arc::new(PanickingListener), Vec::new());
    fabric.add_listener(tap.clone(), Vec::new());

    let rm = Wired::new();
    let cem = Wired::new();
    fabric.add_endpoint("rm-battery", rm.clone(), vec![rm_port()]).await?;
    fabric.add_endpoint("cem", cem.clone(), vec![cem_port()]).await?;
    let devices = port("cem", "devices");
    fabric.connect(&port("rm-battery", "flex"), &devices).await?;

    let half = rm.connection_to(&devices).expect("rm accepted");
    half.send(PowerForecast { kw: 1 });
    half.send(PowerForecast { kw: 2 });

    assert!(settles(|| tap.count() == 2).await);
    assert!(settles(|| cem.journal().len() == 2).await);

    fabric.shutdown().await?;
    Ok(())
}
