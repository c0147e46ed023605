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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, instrument, trace};

use crate::endpoint::PortId;
use crate::message::Command;

/// The serial executor owned by one endpoint.
///
/// Every message and disconnect notice bound for any of the endpoint's handlers runs
/// here, one at a time, in submission order. Submitting never blocks. Clones share the
/// same queue, so closing one closes them all.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pid: Arc<str>,
    sender: Arc<Mutex<Option<UnboundedSender<Command>>>>,
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DispatchContext {
    /// Starts the worker task for `pid` on `runtime`.
    pub(crate) fn spawn(
        pid: &str,
        runtime: &Handle,
        tracker: &TaskTracker,
        cancellation_token: CancellationToken,
    ) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let pid: Arc<str> = Arc::from(pid);
        tracker.spawn_on(wake(pid.clone(), inbox, cancellation_token), runtime);
        trace!("Dispatch context started for endpoint {}", pid);
        Self {
            pid,
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Queues a command. Hands it back if the context is closed.
    pub(crate) fn submit(&self, command: Command) -> Result<(), Command> {
        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(sender) => sender.send(command).map_err(|rejected| rejected.0),
            None => Err(command),
        }
    }

    /// Stops accepting work. Commands already queued still run.
    pub(crate) fn close(&self) {
        if self.sender.lock().take().is_some() {
            trace!("Dispatch context closed for endpoint {}", self.pid);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

#[instrument(skip(inbox, cancellation_token))]
async fn wake(
    pid: Arc<str>,
    mut inbox: UnboundedReceiver<Command>,
    cancellation_token: CancellationToken,
) {
    let mut cancel = pin!(cancellation_token.cancelled());
    loop {
        tokio::select! {
            () = &mut cancel => {
                trace!("Forceful cancellation triggered for dispatch context: {}", pid);
                break;
            }
            incoming = inbox.recv() => {
                let Some(command) = incoming else { break; };
                execute(&pid, command);
            }
        }
    }
    trace!("Dispatch context for endpoint {} stopped.", pid);
}

fn execute(pid: &str, command: Command) {
    match command {
        Command::Deliver {
            handler,
            from,
            payload,
        } => {
            trace!("Delivering {:?} from {} to endpoint {}", payload, from, pid);
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.lock().handle_message(payload)));
            report(pid, &from, "handle_message", outcome);
        }
        Command::Disconnect { handler, peer, ack } => {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.lock().disconnected()));
            report(pid, &peer, "disconnected", outcome);
            // The requester may have stopped waiting.
            let _ = ack.send(());
        }
    }
}

fn report(
    pid: &str,
    peer: &PortId,
    callback: &'static str,
    outcome: std::thread::Result<anyhow::Result<()>>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(endpoint = pid, peer = %peer, "Delivery fault in {}: {:?}", callback, e);
        }
        Err(panic) => {
            error!(
                endpoint = pid,
                peer = %peer,
                "Delivery fault in {}: handler panicked: {}",
                callback,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
