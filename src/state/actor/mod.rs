//! Actor Model for Queue State Management.
//!
//! This module implements the `QueueActor`, which serializes every mutation of
//! a single queue in its own Tokio task.
//!
//! # Architecture
//!
//! - **Store Ownership**: The membership store is the single source of truth.
//!   The actor keeps only the queue's settings in memory and reads entries
//!   fresh for every operation, so a failed write never leaves drift behind.
//! - **Message Passing**: All interactions happen via `QueueEvent` messages sent
//!   to the actor; replies travel back on oneshot channels.
//! - **Concurrency**: One in-flight operation per queue. Different queues run on
//!   different tasks and proceed in parallel.

use crate::db::{Database, QueueRecord};
use crate::display::DisplayScheduler;
use crate::grace::GraceTimers;
use crate::platform::{ChannelId, ChannelPlatform, MemberId};
use crate::state::Notice;
use crate::telemetry::{OperationTimer, spans};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug};

mod handlers;
mod helpers;
mod types;

pub use types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    Active,
    Draining,
}

/// Collaborators shared by every queue actor.
#[derive(Clone)]
pub struct ActorContext {
    pub db: Database,
    pub platform: Arc<dyn ChannelPlatform>,
    pub display: DisplayScheduler,
    pub grace: GraceTimers,
    pub notices: mpsc::Sender<Notice>,
    /// The bot's own member id; never queued.
    pub controller_id: MemberId,
}

/// The Queue Actor.
///
/// Owns the serialization point of a single queue and processes events
/// sequentially.
pub struct QueueActor {
    pub channel_id: ChannelId,
    record: QueueRecord,
    ctx: ActorContext,
    state: ActorState,
}

impl QueueActor {
    /// Create a Queue Actor for an existing queue and spawn it.
    pub fn spawn(
        record: QueueRecord,
        ctx: ActorContext,
        capacity: usize,
    ) -> mpsc::Sender<QueueEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let actor = Self {
            channel_id: record.channel_id,
            record,
            ctx,
            state: ActorState::Active,
        };

        tokio::spawn(async move {
            actor.run(rx).await;
        });

        tx
    }

    /// The main actor loop.
    pub async fn run(mut self, mut rx: mpsc::Receiver<QueueEvent>) {
        while let Some(event) = rx.recv().await {
            let span = spans::queue(self.channel_id, event.name());
            let _timer = OperationTimer::new(event.name());
            self.handle_event(event).instrument(span).await;

            if self.state == ActorState::Draining {
                break;
            }
        }
        debug!(queue = self.channel_id, "Queue actor stopped");
    }

    async fn handle_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::Join {
                member,
                priority,
                reply_tx,
            } => {
                let result = self.handle_join(member, priority).await;
                if result.is_ok() {
                    self.handle_auto_fill().await;
                }
                let _ = reply_tx.send(result);
            }
            QueueEvent::Leave { member, reply_tx } => {
                let _ = reply_tx.send(self.handle_leave(member).await);
            }
            QueueEvent::Pull { request, reply_tx } => {
                let _ = reply_tx.send(self.handle_pull(request).await);
            }
            QueueEvent::Kick { members, reply_tx } => {
                let _ = reply_tx.send(self.handle_kick(members).await);
            }
            QueueEvent::Clear { reply_tx } => {
                let _ = reply_tx.send(self.handle_clear().await);
            }
            QueueEvent::Shuffle { reply_tx } => {
                let _ = reply_tx.send(self.handle_shuffle().await);
            }
            QueueEvent::Configure { setting, reply_tx } => {
                let _ = reply_tx.send(self.handle_configure(setting).await);
            }
            QueueEvent::Presence { member, present } => {
                self.handle_presence(member, present).await;
            }
            QueueEvent::GraceExpired { member, generation } => {
                self.handle_grace_expired(member, generation).await;
            }
            QueueEvent::AutoFill => {
                self.handle_auto_fill().await;
            }
            QueueEvent::Reconcile {
                occupants,
                reply_tx,
            } => {
                let _ = reply_tx.send(self.handle_reconcile(occupants).await);
            }
            QueueEvent::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.snapshot().await);
            }
            QueueEvent::Destroy { reply_tx } => {
                let _ = reply_tx.send(self.handle_destroy().await);
            }
        }
    }
}
