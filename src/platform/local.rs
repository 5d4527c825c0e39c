//! In-process platform and surface implementations.
//!
//! `lineupd` uses these when it runs standalone on a JSON-lines feed: channel
//! occupancy is tracked from the voice-state events it replays, moves are
//! applied locally (and echoed back as voice-state events when a feedback
//! channel is attached), and renders are kept in memory and logged.

use super::{ChannelId, ChannelPlatform, MemberId, PlatformError, RenderSurface, RoleId, TargetId};
use crate::dispatch::{Inbound, PlatformEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Channel platform backed by an in-memory occupancy table.
pub struct LocalPlatform {
    controller: MemberId,
    occupants: DashMap<ChannelId, HashSet<MemberId>>,
    capacities: DashMap<ChannelId, usize>,
    muted: DashMap<MemberId, bool>,
    roles: DashMap<MemberId, HashSet<RoleId>>,
    moves: Mutex<Vec<(MemberId, ChannelId, ChannelId)>>,
    feedback: Option<mpsc::Sender<Inbound>>,
}

impl LocalPlatform {
    pub fn new(controller: MemberId) -> Self {
        Self {
            controller,
            occupants: DashMap::new(),
            capacities: DashMap::new(),
            muted: DashMap::new(),
            roles: DashMap::new(),
            moves: Mutex::new(Vec::new()),
            feedback: None,
        }
    }

    /// Echo every applied move back to the dispatcher as a voice-state event.
    pub fn with_feedback(mut self, tx: mpsc::Sender<Inbound>) -> Self {
        self.feedback = Some(tx);
        self
    }

    pub fn set_capacity(&self, channel: ChannelId, capacity: usize) {
        self.capacities.insert(channel, capacity);
    }

    /// Apply an observed voice-state change to the occupancy table.
    pub fn record_voice_state(
        &self,
        member: MemberId,
        from: Option<ChannelId>,
        to: Option<ChannelId>,
    ) {
        if let Some(from) = from
            && let Some(mut set) = self.occupants.get_mut(&from)
        {
            set.remove(&member);
        }
        if let Some(to) = to {
            self.occupants.entry(to).or_default().insert(member);
        }
    }

    pub fn occupants_of(&self, channel: ChannelId) -> HashSet<MemberId> {
        self.occupants
            .get(&channel)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Moves applied so far, in order.
    pub fn moves(&self) -> Vec<(MemberId, ChannelId, ChannelId)> {
        self.moves.lock().clone()
    }

    pub fn is_muted(&self, member: MemberId) -> bool {
        self.muted.get(&member).map(|m| *m).unwrap_or(false)
    }

    pub fn has_role(&self, member: MemberId, role: RoleId) -> bool {
        self.roles
            .get(&member)
            .map(|r| r.contains(&role))
            .unwrap_or(false)
    }

    /// Queue a voice-state event for a move. Never waits on the dispatcher,
    /// which may itself be waiting on the queue actor making this move.
    fn echo(&self, member: MemberId, from: Option<ChannelId>, to: ChannelId) {
        let Some(tx) = &self.feedback else {
            return;
        };
        let event = Inbound::Event(PlatformEvent::VoiceState {
            member,
            from,
            to: Some(to),
        });
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(member, to, "Feedback channel full, deferring move event");
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(member, "Feedback channel closed, move event dropped");
            }
        }
    }
}

#[async_trait]
impl ChannelPlatform for LocalPlatform {
    async fn list_occupants(&self, channel: ChannelId) -> Result<HashSet<MemberId>, PlatformError> {
        Ok(self.occupants_of(channel))
    }

    async fn move_member(
        &self,
        member: MemberId,
        from: ChannelId,
        to: ChannelId,
    ) -> Result<(), PlatformError> {
        let present = self
            .occupants
            .get(&from)
            .map(|s| s.contains(&member))
            .unwrap_or(false);
        if !present {
            return Err(PlatformError::Gone);
        }
        self.record_voice_state(member, Some(from), Some(to));
        self.moves.lock().push((member, from, to));
        info!(member, from, to, "Moved member");
        self.echo(member, Some(from), to);
        Ok(())
    }

    async fn connect_controller(&self, channel: ChannelId) -> Result<(), PlatformError> {
        let current = self
            .occupants
            .iter()
            .find(|e| e.value().contains(&self.controller))
            .map(|e| *e.key());
        if current == Some(channel) {
            return Ok(());
        }
        self.record_voice_state(self.controller, current, Some(channel));
        debug!(channel, "Controller connected");
        self.echo(self.controller, current, channel);
        Ok(())
    }

    async fn channel_capacity(&self, channel: ChannelId) -> Result<Option<usize>, PlatformError> {
        Ok(self.capacities.get(&channel).map(|c| *c))
    }

    async fn set_muted(&self, member: MemberId, muted: bool) -> Result<(), PlatformError> {
        self.muted.insert(member, muted);
        Ok(())
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        self.roles.entry(member).or_default().insert(role);
        Ok(())
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        if let Some(mut roles) = self.roles.get_mut(&member) {
            roles.remove(&role);
        }
        Ok(())
    }
}

/// Render surface that keeps targets in memory and logs every render.
#[derive(Default)]
pub struct LocalSurface {
    next_id: AtomicI64,
    targets: DashMap<TargetId, (ChannelId, String)>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl LocalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, target: TargetId) -> Option<String> {
        self.targets.get(&target).map(|t| t.1.clone())
    }

    /// Targets currently alive on a surface.
    pub fn targets_on(&self, surface: ChannelId) -> Vec<TargetId> {
        let mut ids: Vec<TargetId> = self
            .targets
            .iter()
            .filter(|t| t.value().0 == surface)
            .map(|t| *t.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop a target as if someone deleted it out from under us.
    pub fn remove_externally(&self, target: TargetId) {
        self.targets.remove(&target);
    }

    /// Number of (create, update, delete) calls served.
    pub fn call_counts(&self) -> (usize, usize, usize) {
        (
            self.creates.load(Ordering::Relaxed),
            self.updates.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl RenderSurface for LocalSurface {
    async fn create_target(
        &self,
        surface: ChannelId,
        content: &str,
    ) -> Result<TargetId, PlatformError> {
        self.creates.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.targets.insert(id, (surface, content.to_string()));
        info!(surface, target = id, "Rendered new display\n{content}");
        Ok(id)
    }

    async fn update_target(&self, target: TargetId, content: &str) -> Result<(), PlatformError> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        match self.targets.get_mut(&target) {
            Some(mut entry) => {
                entry.1 = content.to_string();
                info!(target, "Updated display\n{content}");
                Ok(())
            }
            None => Err(PlatformError::Gone),
        }
    }

    async fn delete_target(&self, target: TargetId) -> Result<(), PlatformError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        match self.targets.remove(&target) {
            Some(_) => Ok(()),
            None => Err(PlatformError::Gone),
        }
    }
}
