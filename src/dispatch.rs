//! Inbound dispatch.
//!
//! Everything the engine reacts to arrives on one stream: intents that the
//! host has already parsed and authorized, and platform events. A single
//! dispatcher loop takes them off in arrival order and puts them into the
//! owning queue's mailbox before looking at the next one, so per-queue order
//! is preserved while replies are awaited on separate tasks.

use crate::config::QueueDefaults;
use crate::db::{MemberEntry, QueueKind, QueueRecord};
use crate::display::DisplayMode;
use crate::error::{QueueError, QueueResult};
use crate::platform::{ChannelId, MemberId, TargetId};
use crate::state::Engine;
use crate::state::actor::{PullCount, PullRequest, QueueEvent, QueueSetting};
use crate::state::managers::queue::await_reply;
use crate::telemetry::spans;
use crate::transfer::TransferState;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, warn};

/// Overrides for a new queue's settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    pub header: Option<String>,
    pub color: Option<u32>,
    pub size_limit: Option<usize>,
    pub pull_count: Option<u32>,
    pub partial_pull: Option<bool>,
    pub grace_period: Option<u64>,
    pub display_mode: Option<DisplayMode>,
}

impl QueueOptions {
    fn into_record(self, channel: ChannelId, kind: QueueKind, defaults: &QueueDefaults) -> QueueRecord {
        let mut record = QueueRecord::new(channel, kind, defaults);
        if self.header.is_some() {
            record.header = self.header;
        }
        if let Some(color) = self.color {
            record.color = color & 0x00FF_FFFF;
        }
        record.size_limit = self.size_limit;
        if let Some(count) = self.pull_count {
            record.pull_count = count.max(1);
        }
        if let Some(partial) = self.partial_pull {
            record.partial_pull = partial;
        }
        if let Some(grace) = self.grace_period {
            record.grace_period = grace;
        }
        if let Some(mode) = self.display_mode {
            record.display_mode = mode;
        }
        record
    }
}

/// An already-authorized request from the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    CreateQueue {
        queue: ChannelId,
        kind: QueueKind,
        #[serde(default)]
        options: QueueOptions,
    },
    DeleteQueue {
        queue: ChannelId,
    },
    Join {
        queue: ChannelId,
        member: MemberId,
        #[serde(default)]
        priority: bool,
    },
    Leave {
        queue: ChannelId,
        member: MemberId,
    },
    Pull {
        queue: ChannelId,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        destination: Option<ChannelId>,
    },
    Shuffle {
        queue: ChannelId,
    },
    Clear {
        queue: ChannelId,
    },
    Kick {
        queue: ChannelId,
        members: Vec<MemberId>,
    },
    SetLimit {
        queue: ChannelId,
        limit: Option<usize>,
    },
    Configure {
        queue: ChannelId,
        setting: QueueSetting,
    },
    /// Render the queue on a surface.
    Display {
        queue: ChannelId,
        surface: ChannelId,
    },
    ArmVoiceTransfer {
        queue: ChannelId,
    },
    DisarmVoiceTransfer {
        queue: ChannelId,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateQueue { .. } => "create_queue",
            Self::DeleteQueue { .. } => "delete_queue",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Pull { .. } => "pull",
            Self::Shuffle { .. } => "shuffle",
            Self::Clear { .. } => "clear",
            Self::Kick { .. } => "kick",
            Self::SetLimit { .. } => "set_limit",
            Self::Configure { .. } => "configure",
            Self::Display { .. } => "display",
            Self::ArmVoiceTransfer { .. } => "arm_voice_transfer",
            Self::DisarmVoiceTransfer { .. } => "disarm_voice_transfer",
        }
    }

    pub fn queue(&self) -> ChannelId {
        match self {
            Self::CreateQueue { queue, .. }
            | Self::DeleteQueue { queue }
            | Self::Join { queue, .. }
            | Self::Leave { queue, .. }
            | Self::Pull { queue, .. }
            | Self::Shuffle { queue }
            | Self::Clear { queue }
            | Self::Kick { queue, .. }
            | Self::SetLimit { queue, .. }
            | Self::Configure { queue, .. }
            | Self::Display { queue, .. }
            | Self::ArmVoiceTransfer { queue }
            | Self::DisarmVoiceTransfer { queue } => *queue,
        }
    }
}

/// Something the platform reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// A member moved between voice channels. `None` means not connected.
    VoiceState {
        member: MemberId,
        #[serde(default)]
        from: Option<ChannelId>,
        #[serde(default)]
        to: Option<ChannelId>,
    },
    /// A channel was deleted on the platform.
    ChannelDeleted { channel: ChannelId },
}

/// Successful result of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(QueueRecord),
    Deleted,
    Joined(MemberEntry),
    Left(MemberEntry),
    /// Pulled members in line order.
    Pulled(Vec<MemberId>),
    Shuffled,
    Cleared(Vec<MemberId>),
    Kicked(Vec<MemberId>),
    Configured(QueueRecord),
    Displayed(TargetId),
    Armed(TransferState),
    Disarmed,
}

pub type Reply = oneshot::Sender<QueueResult<Outcome>>;

/// One item of the inbound stream.
#[derive(Debug)]
pub enum Inbound {
    Intent { intent: Intent, reply: Option<Reply> },
    Event(PlatformEvent),
}

impl Inbound {
    /// An intent whose outcome is only logged.
    pub fn intent(intent: Intent) -> Self {
        Self::Intent {
            intent,
            reply: None,
        }
    }
}

/// The single consumer of the inbound stream.
pub struct Dispatcher {
    engine: Arc<Engine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Handle inbound items until the stream closes.
    pub async fn run(self, mut rx: mpsc::Receiver<Inbound>) {
        while let Some(inbound) = rx.recv().await {
            self.dispatch(inbound).await;
        }
        info!("Inbound stream closed, dispatcher stopping");
    }

    pub async fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Intent { intent, reply } => {
                let span = spans::intent(intent.name(), intent.queue());
                self.handle_intent(intent, reply).instrument(span).await;
            }
            Inbound::Event(PlatformEvent::VoiceState { member, from, to }) => {
                let span = spans::voice_state(member);
                self.handle_voice_state(member, from, to)
                    .instrument(span)
                    .await;
            }
            Inbound::Event(PlatformEvent::ChannelDeleted { channel }) => {
                self.handle_channel_deleted(channel).await;
            }
        }
    }

    async fn handle_intent(&self, intent: Intent, reply: Option<Reply>) {
        let queues = &self.engine.queues;
        let name = intent.name();

        match intent {
            // Creation finishes before the next item so that intents right
            // behind it find the queue.
            Intent::CreateQueue {
                queue,
                kind,
                options,
            } => {
                let record = options.into_record(queue, kind, &self.engine.config.queue_defaults);
                let result = queues.create(record).await.map(Outcome::Created);
                respond(name, reply, result);
            }
            Intent::DeleteQueue { queue } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Destroy { reply_tx })
                    .await;
                if rx.is_ok() {
                    queues.unregister(queue);
                    self.engine.transfer.queue_destroyed(queue);
                }
                self.finish_reply(name, reply, rx, |_| Outcome::Deleted);
            }
            Intent::Join {
                queue,
                member,
                priority,
            } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Join {
                        member,
                        priority,
                        reply_tx,
                    })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Joined);
            }
            Intent::Leave { queue, member } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Leave { member, reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Left);
            }
            Intent::Pull {
                queue,
                count,
                destination,
            } => {
                let request = PullRequest {
                    count: count.map(PullCount::Exact).unwrap_or_default(),
                    destination,
                };
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Pull { request, reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, |admission| {
                    Outcome::Pulled(admission.members)
                });
            }
            Intent::Shuffle { queue } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Shuffle { reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, |_| Outcome::Shuffled);
            }
            Intent::Clear { queue } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Clear { reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Cleared);
            }
            Intent::Kick { queue, members } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Kick { members, reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Kicked);
            }
            Intent::SetLimit { queue, limit } => {
                let setting = QueueSetting::Limit(limit);
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Configure { setting, reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Configured);
            }
            Intent::Configure { queue, setting } => {
                let rx = queues
                    .enqueue(queue, |reply_tx| QueueEvent::Configure { setting, reply_tx })
                    .await;
                self.finish_reply(name, reply, rx, Outcome::Configured);
            }
            Intent::Display { queue, surface } => {
                let engine = self.engine.clone();
                self.finish(name, reply, async move {
                    if !engine.queues.contains(queue) {
                        return Err(QueueError::NoSuchQueue(queue));
                    }
                    engine.display.show(queue, surface).await.map(Outcome::Displayed)
                });
            }
            Intent::ArmVoiceTransfer { queue } => {
                let engine = self.engine.clone();
                self.finish(name, reply, async move {
                    engine.transfer.arm(queue).await.map(Outcome::Armed)
                });
            }
            Intent::DisarmVoiceTransfer { queue } => {
                self.engine.transfer.disarm(queue);
                respond(name, reply, Ok(Outcome::Disarmed));
            }
        }
    }

    /// Route a voice-state change.
    ///
    /// The controller's moves belong to the transfer coordinator. Anyone else
    /// leaving a channel departs its queue (and frees a slot for queues that
    /// auto-fill into it); entering a channel joins its queue.
    async fn handle_voice_state(
        &self,
        member: MemberId,
        from: Option<ChannelId>,
        to: Option<ChannelId>,
    ) {
        if member == self.engine.transfer.controller() {
            self.engine.transfer.controller_moved(from, to).await;
            return;
        }
        if from == to {
            return;
        }

        let queues = &self.engine.queues;
        if let Some(from) = from {
            queues
                .notify(
                    from,
                    QueueEvent::Presence {
                        member,
                        present: false,
                    },
                )
                .await;

            match self.engine.db.queues().find_by_target(from).await {
                Ok(fillers) => {
                    for record in fillers {
                        queues.notify(record.channel_id, QueueEvent::AutoFill).await;
                    }
                }
                Err(e) => warn!(channel = from, error = %e, "Failed to look up auto-fill queues"),
            }
        }
        if let Some(to) = to {
            queues
                .notify(
                    to,
                    QueueEvent::Presence {
                        member,
                        present: true,
                    },
                )
                .await;
        }
    }

    /// A deleted channel takes its queue and any displays rendered in it along.
    async fn handle_channel_deleted(&self, channel: ChannelId) {
        self.engine.display.drop_surface(channel).await;
        if self.engine.queues.contains(channel) {
            self.handle_intent(Intent::DeleteQueue { queue: channel }, None)
                .await;
        }
    }

    /// Await an actor reply on its own task and answer the intent.
    fn finish_reply<T: Send + 'static>(
        &self,
        name: &'static str,
        reply: Option<Reply>,
        rx: QueueResult<oneshot::Receiver<QueueResult<T>>>,
        map: impl FnOnce(T) -> Outcome + Send + 'static,
    ) {
        self.finish(name, reply, async move { await_reply(rx?).await.map(map) });
    }

    fn finish(
        &self,
        name: &'static str,
        reply: Option<Reply>,
        work: impl Future<Output = QueueResult<Outcome>> + Send + 'static,
    ) {
        tokio::spawn(
            async move {
                let result = work.await;
                respond(name, reply, result);
            }
            .in_current_span(),
        );
    }
}

fn respond(name: &'static str, reply: Option<Reply>, result: QueueResult<Outcome>) {
    match &result {
        Ok(outcome) => debug!(intent = name, outcome = ?outcome, "Intent done"),
        Err(e) if e.is_user_error() => {
            debug!(intent = name, error = %e, code = e.error_code(), "Intent refused")
        }
        Err(e) => warn!(intent = name, error = %e, code = e.error_code(), "Intent failed"),
    }
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}
