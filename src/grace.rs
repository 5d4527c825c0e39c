//! Grace timers.
//!
//! A member who drops out of a voice queue's channel keeps their place for the
//! queue's grace period. Each pending expiry is a sleeping task keyed by
//! (queue, member) and stamped with a generation number. Re-arming or
//! cancelling bumps the entry, and the owning actor only honours an expiry
//! whose generation is still current, so a timer that fired while being
//! cancelled is ignored.

use crate::db::{MemberEntry, MemberState};
use crate::platform::{ChannelId, MemberId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Capacity of the expiry channel.
const EXPIRY_CHANNEL_SIZE: usize = 1024;

/// A grace timer that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceExpiry {
    pub queue: ChannelId,
    pub member: MemberId,
    pub generation: u64,
}

struct Inner {
    next_generation: AtomicU64,
    timers: DashMap<(ChannelId, MemberId), (u64, AbortHandle)>,
    expiry_tx: mpsc::Sender<GraceExpiry>,
}

/// Pending grace expiries for every queue.
#[derive(Clone)]
pub struct GraceTimers {
    inner: Arc<Inner>,
}

impl GraceTimers {
    /// Create the timer set and the receiver its expiries arrive on.
    pub fn new() -> (Self, mpsc::Receiver<GraceExpiry>) {
        let (expiry_tx, expiry_rx) = mpsc::channel(EXPIRY_CHANNEL_SIZE);
        let timers = Self {
            inner: Arc::new(Inner {
                next_generation: AtomicU64::new(1),
                timers: DashMap::new(),
                expiry_tx,
            }),
        };
        (timers, expiry_rx)
    }

    /// Start (or restart) the timer for a member. Returns its generation.
    pub fn arm(&self, queue: ChannelId, member: MemberId, delay: Duration) -> u64 {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let tx = self.inner.expiry_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(GraceExpiry {
                    queue,
                    member,
                    generation,
                })
                .await;
        });

        if let Some((old, handle)) = self
            .inner
            .timers
            .insert((queue, member), (generation, task.abort_handle()))
        {
            handle.abort();
            debug!(queue, member, old, generation, "Grace timer re-armed");
        } else {
            debug!(queue, member, generation, delay_ms = delay.as_millis() as u64, "Grace timer armed");
        }
        generation
    }

    /// Cancel a member's timer. Returns whether one was pending.
    pub fn cancel(&self, queue: ChannelId, member: MemberId) -> bool {
        match self.inner.timers.remove(&(queue, member)) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer of a queue.
    pub fn cancel_queue(&self, queue: ChannelId) {
        self.inner.timers.retain(|(q, _), (_, handle)| {
            if *q == queue {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Consume an expiry if it is still the member's current timer.
    pub fn take_if_current(&self, queue: ChannelId, member: MemberId, generation: u64) -> bool {
        self.inner
            .timers
            .remove_if(&(queue, member), |_, (current, _)| *current == generation)
            .is_some()
    }

    pub fn is_armed(&self, queue: ChannelId, member: MemberId) -> bool {
        self.inner.timers.contains_key(&(queue, member))
    }

    pub fn armed_count(&self) -> usize {
        self.inner.timers.len()
    }
}

/// What startup reconciliation should do with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Grace ran out while we were down.
    Expire(MemberId),
    /// Still within grace; wait out the remainder.
    Rearm(MemberId, Duration),
    /// Disconnected entry whose member is back in the channel.
    Return(MemberId),
    /// Active entry whose member is no longer in the channel.
    Depart(MemberId),
}

/// Decide how to bring stored entries in line with the clock and, for voice
/// queues, with who is actually in the channel.
///
/// `occupants` is `None` when presence is unknown (text queues, or the platform
/// could not be asked); then only the clock is consulted.
pub fn reconcile(
    entries: &[MemberEntry],
    now: i64,
    grace: Duration,
    occupants: Option<&HashSet<MemberId>>,
) -> Vec<Reconcile> {
    let grace_ms = grace.as_millis() as i64;
    let mut actions = Vec::new();

    for entry in entries {
        let present = occupants.map(|o| o.contains(&entry.member_id));
        match (entry.state(), present) {
            (MemberState::Grace, Some(true)) => actions.push(Reconcile::Return(entry.member_id)),
            (MemberState::Grace, _) => {
                let since = entry.disconnected_at.unwrap_or(now);
                let remaining = grace_ms - (now - since);
                if remaining <= 0 {
                    actions.push(Reconcile::Expire(entry.member_id));
                } else {
                    actions.push(Reconcile::Rearm(
                        entry.member_id,
                        Duration::from_millis(remaining as u64),
                    ));
                }
            }
            (MemberState::Active, Some(false)) => actions.push(Reconcile::Depart(entry.member_id)),
            (MemberState::Active, _) => {}
        }
    }

    actions
}
