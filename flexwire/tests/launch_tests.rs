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

use crate::setup::*;

mod setup;

#[test]
fn a_fabric_launched_outside_a_runtime_owns_one() -> anyhow::Result<()> {
    initialize_tracing();
    let mut config = FabricConfig::default();
    config.runtime.worker_threads = 2;
    let fabric = FlexApp::builder().config(config).build()?;

    let rm = Wired::new();
    let cem = Wired::new();
    let devices = port("cem", "devices");
    fabric.block_on(async {
        fabric.add_endpoint("rm-battery", rm.clone(), vec![rm_port()]).await?;
        fabric.add_endpoint("cem", cem.clone(), vec![cem_port()]).await?;
        fabric.connect(&port("rm-battery", "flex"), &devices).await?;
        anyhow::Ok(())
    })?;

    rm.connection_to(&devices)
        .expect("rm accepted")
        .send(PowerForecast { kw: 8 });
    let delivered = fabric.block_on(settles(|| cem.journal().len() == 1));
    assert!(delivered);

    fabric.block_on(fabric.shutdown())?;
    assert_eq!(rm.journal().disconnects().len(), 1);
    Ok(())
}

#[test]
fn launch_provisions_a_runtime_when_none_is_running() -> anyhow::Result<()> {
    initialize_tracing();
    let fabric = FlexApp::launch()?;
    assert!(fabric.endpoints().is_empty());
    let spawned = fabric.runtime().spawn(async { 21 * 2 });
    assert_eq!(fabric.block_on(spawned)?, 42);
    fabric.block_on(fabric.shutdown())?;
    Ok(())
}

#[tokio::test]
async fn the_builder_reuses_the_surrounding_runtime() -> anyhow::Result<()> {
    initialize_tracing();
    let handle = tokio::runtime::Handle::current();
    let fabric = FlexApp::builder()
        .config(FabricConfig::default())
        .runtime(handle)
        .build()?;
    fabric
        .add_endpoint("rm-battery", Wired::new(), vec![rm_port()])
        .await?;
    assert_eq!(fabric.endpoints(), vec!["rm-battery".to_string()]);
    fabric.shutdown().await?;
    Ok(())
}
