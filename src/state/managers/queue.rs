//! Queue management state.
//!
//! This module contains the `QueueManager`, the registry of running queue
//! actors keyed by bound channel.

use crate::db::{DbError, MemberEntry, QueueRecord};
use crate::display::QueueSnapshot;
use crate::error::{QueueError, QueueResult};
use crate::platform::{ChannelId, MemberId};
use crate::state::actor::{
    ActorContext, Admission, PullRequest, QueueActor, QueueEvent, QueueSetting, ReconcileReport,
};
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Queue actors and the context they are spawned with.
pub struct QueueManager {
    /// Running actors, indexed by bound channel.
    actors: DashMap<ChannelId, mpsc::Sender<QueueEvent>>,
    ctx: ActorContext,
    mailbox_capacity: usize,
}

impl QueueManager {
    pub fn new(ctx: ActorContext, mailbox_capacity: usize) -> Self {
        Self {
            actors: DashMap::new(),
            ctx,
            mailbox_capacity,
        }
    }

    /// Spawn actors for every stored queue. Returns how many were started.
    pub async fn load_all(&self) -> Result<usize, DbError> {
        let records = self.ctx.db.queues().load_all().await?;
        let count = records.len();
        for record in records {
            self.spawn(record);
        }
        info!(count, "Queue actors started");
        Ok(count)
    }

    /// Persist a new queue and start its actor.
    pub async fn create(&self, record: QueueRecord) -> QueueResult<QueueRecord> {
        let channel_id = record.channel_id;
        if self.actors.contains_key(&channel_id) {
            return Err(QueueError::QueueExists(channel_id));
        }
        self.ctx.db.queues().insert(&record).await.map_err(|e| match e {
            DbError::QueueExists(id) => QueueError::QueueExists(id),
            other => other.into(),
        })?;
        self.spawn(record.clone());
        info!(queue = channel_id, kind = record.kind.as_str(), "Queue created");
        Ok(record)
    }

    /// Delete a queue. The actor is unregistered right away, so later events
    /// for the channel report `NoSuchQueue`.
    pub async fn destroy(&self, channel_id: ChannelId) -> QueueResult<()> {
        let rx = self
            .enqueue(channel_id, |reply_tx| QueueEvent::Destroy { reply_tx })
            .await?;
        self.unregister(channel_id);
        await_reply(rx).await
    }

    /// Forget a queue's actor. Events already in its mailbox are still handled.
    pub fn unregister(&self, channel_id: ChannelId) {
        self.actors.remove(&channel_id);
    }

    fn spawn(&self, record: QueueRecord) {
        let channel_id = record.channel_id;
        let tx = QueueActor::spawn(record, self.ctx.clone(), self.mailbox_capacity);
        self.actors.insert(channel_id, tx);
    }

    pub fn contains(&self, channel_id: ChannelId) -> bool {
        self.actors.contains_key(&channel_id)
    }

    /// Channels with a running queue actor.
    pub fn channels(&self) -> Vec<ChannelId> {
        self.actors.iter().map(|e| *e.key()).collect()
    }

    /// Put a request into a queue's mailbox without waiting for the reply.
    ///
    /// Events are handled in mailbox order, so callers that must keep arrival
    /// order enqueue first and await the returned receiver later.
    pub async fn enqueue<T>(
        &self,
        channel_id: ChannelId,
        make: impl FnOnce(oneshot::Sender<QueueResult<T>>) -> QueueEvent,
    ) -> QueueResult<oneshot::Receiver<QueueResult<T>>> {
        let tx = self
            .actors
            .get(&channel_id)
            .map(|s| s.value().clone())
            .ok_or(QueueError::NoSuchQueue(channel_id))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(make(reply_tx))
            .await
            .map_err(|_| QueueError::NoSuchQueue(channel_id))?;
        Ok(reply_rx)
    }

    /// Send a request and wait for its reply.
    pub async fn request<T>(
        &self,
        channel_id: ChannelId,
        make: impl FnOnce(oneshot::Sender<QueueResult<T>>) -> QueueEvent,
    ) -> QueueResult<T> {
        let rx = self.enqueue(channel_id, make).await?;
        await_reply(rx).await
    }

    /// Send an event that has no reply. Returns whether a queue took it.
    pub async fn notify(&self, channel_id: ChannelId, event: QueueEvent) -> bool {
        let Some(tx) = self.actors.get(&channel_id).map(|s| s.value().clone()) else {
            return false;
        };
        if tx.send(event).await.is_err() {
            debug!(queue = channel_id, "Queue actor gone, event dropped");
            return false;
        }
        true
    }

    pub async fn join(
        &self,
        channel_id: ChannelId,
        member: MemberId,
        priority: bool,
    ) -> QueueResult<MemberEntry> {
        self.request(channel_id, |reply_tx| QueueEvent::Join {
            member,
            priority,
            reply_tx,
        })
        .await
    }

    pub async fn leave(&self, channel_id: ChannelId, member: MemberId) -> QueueResult<MemberEntry> {
        self.request(channel_id, |reply_tx| QueueEvent::Leave { member, reply_tx })
            .await
    }

    pub async fn pull(&self, channel_id: ChannelId, request: PullRequest) -> QueueResult<Admission> {
        self.request(channel_id, |reply_tx| QueueEvent::Pull { request, reply_tx })
            .await
    }

    pub async fn kick(
        &self,
        channel_id: ChannelId,
        members: Vec<MemberId>,
    ) -> QueueResult<Vec<MemberId>> {
        self.request(channel_id, |reply_tx| QueueEvent::Kick { members, reply_tx })
            .await
    }

    pub async fn clear(&self, channel_id: ChannelId) -> QueueResult<Vec<MemberId>> {
        self.request(channel_id, |reply_tx| QueueEvent::Clear { reply_tx })
            .await
    }

    pub async fn shuffle(&self, channel_id: ChannelId) -> QueueResult<()> {
        self.request(channel_id, |reply_tx| QueueEvent::Shuffle { reply_tx })
            .await
    }

    pub async fn configure(
        &self,
        channel_id: ChannelId,
        setting: QueueSetting,
    ) -> QueueResult<QueueRecord> {
        self.request(channel_id, |reply_tx| QueueEvent::Configure { setting, reply_tx })
            .await
    }

    pub async fn reconcile(
        &self,
        channel_id: ChannelId,
        occupants: Option<HashSet<MemberId>>,
    ) -> QueueResult<ReconcileReport> {
        self.request(channel_id, |reply_tx| QueueEvent::Reconcile {
            occupants,
            reply_tx,
        })
        .await
    }

    pub async fn snapshot(&self, channel_id: ChannelId) -> QueueResult<QueueSnapshot> {
        self.request(channel_id, |reply_tx| QueueEvent::Snapshot { reply_tx })
            .await
    }
}

/// Wait for an actor's reply.
pub async fn await_reply<T>(rx: oneshot::Receiver<QueueResult<T>>) -> QueueResult<T> {
    rx.await
        .map_err(|_| QueueError::Internal("queue actor dropped the request".into()))?
}
