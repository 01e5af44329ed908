//! The hub task: one loop that owns the [`Hub`] and its clock.
//!
//! Connection handlers talk to the hub through a [`HubHandle`]. Commands and
//! clock ticks are applied one at a time, in arrival order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::SimulationClock;
use crate::error::{Error, Result};
use crate::hub::{Hub, HubConfig, HubStatus};
use crate::session::{CapacityExceeded, Outbox, SessionId};

/// Input to the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<std::result::Result<SessionId, CapacityExceeded>>,
    },
    Inbound {
        id: SessionId,
        text: String,
    },
    Disconnect {
        id: SessionId,
    },
    Status {
        reply: oneshot::Sender<HubStatus>,
    },
}

/// Cloneable handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl HubHandle {
    /// Register a connection whose messages will be delivered to `outbox`.
    pub async fn connect(&self, outbox: Outbox) -> Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Connect { outbox, reply })?;
        Ok(rx.await.map_err(|_| Error::HubClosed)??)
    }

    /// Forward a raw text frame from a connection.
    pub fn inbound(&self, id: SessionId, text: String) -> Result<()> {
        self.submit(HubCommand::Inbound { id, text })
    }

    pub fn disconnect(&self, id: SessionId) -> Result<()> {
        self.submit(HubCommand::Disconnect { id })
    }

    pub async fn status(&self) -> Result<HubStatus> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Status { reply })?;
        rx.await.map_err(|_| Error::HubClosed)
    }

    /// Stop the clock and close every session. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn submit(&self, command: HubCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::HubClosed)
    }
}

/// Spawn the hub task on the current runtime and start its clock.
pub fn spawn_hub(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::unbounded_channel();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run(Hub::new(config), rx, shutdown_rx));
    let handle = HubHandle {
        commands,
        shutdown: Arc::new(shutdown),
    };
    (handle, task)
}

/// What the hub task handles next.
enum Event {
    Shutdown,
    Step,
    Command(HubCommand),
}

/// Wait for the next event. Shutdown wins over a due step, and a due step
/// wins over queued commands, so a command burst cannot hold the clock back.
async fn next_event(
    shutdown: &mut watch::Receiver<bool>,
    commands: &mut mpsc::UnboundedReceiver<HubCommand>,
    clock: &mut SimulationClock,
) -> Event {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Event::Shutdown;
                }
            }
            _ = clock.tick() => return Event::Step,
            command = commands.recv() => {
                return match command {
                    Some(command) => Event::Command(command),
                    None => Event::Shutdown,
                };
            }
        }
    }
}

async fn run(
    mut hub: Hub,
    mut commands: mpsc::UnboundedReceiver<HubCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut clock = SimulationClock::start(hub.config().tick_interval);
    info!(
        "Hub running: {} max users, step every {:?}",
        hub.config().max_users,
        clock.period()
    );

    loop {
        match next_event(&mut shutdown, &mut commands, &mut clock).await {
            Event::Shutdown => break,
            Event::Step => hub.step(),
            Event::Command(command) => apply(&mut hub, command),
        }
    }

    let closed = hub.close_all();
    info!("Hub stopped at tick {}, closed {} sessions", hub.world().tick, closed);
}

fn apply(hub: &mut Hub, command: HubCommand) {
    match command {
        HubCommand::Connect { outbox, reply } => {
            let result = hub.connect(outbox);
            // The connection may have gone away while waiting; undo the join.
            if let Err(Ok(id)) = reply.send(result) {
                hub.disconnect(id);
            }
        }
        HubCommand::Inbound { id, text } => hub.handle_text(id, &text),
        HubCommand::Disconnect { id } => {
            hub.disconnect(id);
        }
        HubCommand::Status { reply } => {
            let _ = reply.send(hub.status());
        }
    }
}
