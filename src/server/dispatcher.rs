//! Broadcast dispatcher.
//!
//! Every inbound event for every connection funnels through one mailbox and is
//! applied by a single task that owns the [`SessionRegistry`] and the
//! connection table. A register/unregister together with its broadcasts is
//! therefore atomic, and all recipients see broadcasts in the same order.
//!
//! Per connection the lifecycle is `Unjoined -> Joined -> Closed`. A closed
//! connection is simply absent from the table; ids are never reused, so any
//! later event naming it is ignored.
//!
//! Sends never block. Each connection has a bounded outbox fed with
//! `try_send`; a full or closed outbox gets the connection evicted, which is
//! handled exactly like a disconnect once the current fan-out is finished.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::protocol::{ChatMessage, ConnectionId, ServerPacket};
use crate::registry::SessionRegistry;

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::Sender<Arc<ServerPacket>>;

/// Who receives broadcast packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Audience {
    /// Only connections that have joined with a display name.
    #[default]
    Joined,
    /// Every open connection, joined or not.
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unjoined,
    Joined,
    Closed,
}

#[derive(Debug)]
pub enum DispatchCommand {
    Connect { id: ConnectionId, outbox: Outbox },
    Join { id: ConnectionId, username: String },
    SendMessage { id: ConnectionId, text: String },
    Disconnect { id: ConnectionId },
}

struct Connection {
    phase: Phase,
    outbox: Outbox,
}

pub struct Dispatcher {
    registry: SessionRegistry,
    // Open connections in connect order.
    connections: IndexMap<ConnectionId, Connection>,
    audience: Audience,
    evictions: VecDeque<ConnectionId>,
}

impl Dispatcher {
    pub fn new(audience: Audience) -> Self {
        Self {
            registry: SessionRegistry::new(),
            connections: IndexMap::new(),
            audience,
            evictions: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Lifecycle phase of `id`. Ids not currently open report `Closed`.
    pub fn phase(&self, id: ConnectionId) -> Phase {
        self.connections
            .get(&id)
            .map_or(Phase::Closed, |conn| conn.phase)
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn handle(&mut self, cmd: DispatchCommand) {
        match cmd {
            DispatchCommand::Connect { id, outbox } => self.connect(id, outbox),
            DispatchCommand::Join { id, username } => self.join(id, &username),
            DispatchCommand::SendMessage { id, text } => self.send_message(id, text),
            DispatchCommand::Disconnect { id } => self.disconnect(id),
        }

        while let Some(id) = self.evictions.pop_front() {
            self.disconnect(id);
        }
    }

    fn connect(&mut self, id: ConnectionId, outbox: Outbox) {
        if self.connections.contains_key(&id) {
            warn!(conn = %id, "duplicate connect ignored");
            return;
        }
        self.connections.insert(
            id,
            Connection {
                phase: Phase::Unjoined,
                outbox,
            },
        );
        debug!(conn = %id, open = self.connections.len(), "connected");
    }

    fn join(&mut self, id: ConnectionId, requested_name: &str) {
        let Some(conn) = self.connections.get_mut(&id) else {
            debug!(conn = %id, "join for closed connection ignored");
            return;
        };
        if conn.phase != Phase::Unjoined {
            debug!(conn = %id, "already joined; join ignored");
            return;
        }
        if let Err(err) = self.registry.register(id, requested_name) {
            debug!(conn = %id, %err, "join rejected");
            return;
        }
        conn.phase = Phase::Joined;

        let Some(name) = self.registry.name_for(id) else {
            return;
        };
        info!(conn = %id, %name, total = self.registry.len(), "joined");

        self.broadcast(ServerPacket::joined(&name));
        let names = self.registry.list_names();
        self.send_to(id, ServerPacket::ActiveUsers(names.clone()));
        self.broadcast(ServerPacket::UpdateUserList(names));
    }

    fn send_message(&mut self, id: ConnectionId, text: String) {
        if self.phase(id) != Phase::Joined {
            debug!(conn = %id, "message from unjoined connection dropped");
            return;
        }
        if text.trim().is_empty() {
            debug!(conn = %id, "blank message dropped");
            return;
        }
        let Some(sender_name) = self.registry.name_for(id) else {
            return;
        };
        self.broadcast(ServerPacket::ReceiveMessage(ChatMessage { sender_name, text }));
    }

    fn disconnect(&mut self, id: ConnectionId) {
        // Dropping the entry drops our outbox sender, which ends the write pump.
        let Some(conn) = self.connections.shift_remove(&id) else {
            debug!(conn = %id, "disconnect for closed connection ignored");
            return;
        };

        match conn.phase {
            Phase::Joined => {
                let name = self.registry.name_for(id);
                self.registry.unregister(id);
                let Some(name) = name else {
                    return;
                };
                info!(conn = %id, %name, total = self.registry.len(), "left");

                self.broadcast(ServerPacket::left(&name));
                self.broadcast(ServerPacket::UpdateUserList(self.registry.list_names()));
            }
            Phase::Unjoined | Phase::Closed => {
                if let Err(err) = self.registry.try_unregister(id) {
                    debug!(conn = %id, %err, "closed before joining");
                }
            }
        }
    }

    fn broadcast(&mut self, packet: ServerPacket) {
        let packet = Arc::new(packet);
        let recipients = match self.audience {
            Audience::Joined => self.registry.connections(),
            Audience::Connected => self.connections.keys().copied().collect(),
        };
        for id in recipients {
            self.deliver(id, &packet);
        }
    }

    fn send_to(&mut self, id: ConnectionId, packet: ServerPacket) {
        self.deliver(id, &Arc::new(packet));
    }

    fn deliver(&mut self, id: ConnectionId, packet: &Arc<ServerPacket>) {
        if self.evictions.contains(&id) {
            return;
        }
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        match conn.outbox.try_send(Arc::clone(packet)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn = %id, "outbox full; dropping slow connection");
                self.evictions.push_back(id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %id, "outbox closed; dropping connection");
                self.evictions.push_back(id);
            }
        }
    }
}

/// Drains the mailbox, applying every command in arrival order.
/// It must be spawned as a tokio task.
pub async fn run_dispatcher(mut rx: mpsc::Receiver<DispatchCommand>, mut dispatcher: Dispatcher) {
    while let Some(cmd) = rx.recv().await {
        dispatcher.handle(cmd);
    }
    debug!(
        open = dispatcher.open_connections(),
        "dispatcher mailbox closed"
    );
}

/// Spawns the dispatcher task and returns its mailbox.
pub fn spawn(audience: Audience, mailbox_capacity: usize) -> mpsc::Sender<DispatchCommand> {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    tokio::spawn(run_dispatcher(rx, Dispatcher::new(audience)));
    tx
}
