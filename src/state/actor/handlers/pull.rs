//! Pull handling.
//!
//! Admits members from the head of the line, optionally moving them into a
//! destination voice channel. A pull either removes and relocates all of its
//! members or none of them: a failed move sends the already-moved members
//! back, and a failed store write undoes every move.

use super::super::{Admission, PullCount, PullRequest, QueueActor};
use crate::admission::{self, AdmissionRequest};
use crate::db::{MemberState, QueueKind};
use crate::error::{QueueError, QueueResult};
use crate::platform::{ChannelId, MemberId};
use crate::state::notice::{Notice, emit};
use tracing::{debug, error, info, warn};

impl QueueActor {
    pub(crate) async fn handle_pull(&mut self, request: PullRequest) -> QueueResult<Admission> {
        let destination = match request.destination {
            Some(channel) if self.record.kind != QueueKind::Voice => {
                debug!(queue = self.channel_id, channel, "Ignoring destination for text queue");
                None
            }
            other => other,
        };

        let entries = self.ctx.db.members().list_ordered(self.channel_id).await?;
        // Members in grace are not in the channel, so they cannot be moved.
        let eligible: Vec<MemberId> = entries
            .iter()
            .filter(|e| destination.is_none() || e.state() == MemberState::Active)
            .map(|e| e.member_id)
            .collect();

        let headroom = match destination {
            Some(channel) => {
                admission::destination_headroom(
                    self.ctx.platform.as_ref(),
                    &self.ctx.db,
                    channel,
                    self.ctx.controller_id,
                )
                .await?
            }
            None => None,
        };
        let requested = match request.count {
            PullCount::Configured => self.record.pull_count as usize,
            PullCount::Exact(n) => n,
            PullCount::FillDestination { unlimited } => headroom.unwrap_or(unlimited),
        };

        let count = admission::plan(AdmissionRequest {
            requested,
            available: eligible.len(),
            partial_pull: self.record.partial_pull,
            destination_headroom: headroom,
        })?;
        let pulled = eligible[..count].to_vec();

        if let Some(destination) = destination {
            self.relocate(&pulled, destination).await?;
        }

        if let Err(e) = self
            .ctx
            .db
            .members()
            .delete_exact(self.channel_id, &pulled)
            .await
        {
            error!(queue = self.channel_id, error = %e, "Failed to remove pulled members");
            if let Some(destination) = destination {
                self.move_back(&pulled, destination).await;
            }
            return Err(e.into());
        }

        for &member in &pulled {
            self.release_effects(member).await;
        }
        self.touch();
        info!(
            queue = self.channel_id,
            pulled = ?pulled,
            destination = ?destination,
            "Members pulled"
        );
        Ok(Admission {
            members: pulled,
            destination,
        })
    }

    /// Top up the auto-fill target, if this queue has one.
    pub(crate) async fn handle_auto_fill(&mut self) {
        if !self.record.auto_fill || self.record.kind != QueueKind::Voice {
            return;
        }
        let Some(target) = self.record.target_channel_id else {
            return;
        };

        let request = PullRequest {
            count: PullCount::FillDestination {
                unlimited: self.record.pull_count as usize,
            },
            destination: Some(target),
        };
        match self.handle_pull(request).await {
            Ok(admission) => emit(
                &self.ctx.notices,
                Notice::AutoFilled {
                    queue: self.channel_id,
                    members: admission.members,
                    destination: target,
                },
            ),
            Err(
                QueueError::Empty | QueueError::DestinationFull | QueueError::InsufficientMembers { .. },
            ) => {}
            Err(e) => warn!(queue = self.channel_id, target, error = %e, "Auto-fill failed"),
        }
    }

    /// Move members into `destination`, undoing the moves made so far if one fails.
    async fn relocate(&self, members: &[MemberId], destination: ChannelId) -> QueueResult<()> {
        for (moved, &member) in members.iter().enumerate() {
            if let Err(e) = self
                .ctx
                .platform
                .move_member(member, self.channel_id, destination)
                .await
            {
                warn!(
                    queue = self.channel_id,
                    member,
                    destination,
                    error = %e,
                    "Move failed, rolling back pull"
                );
                self.move_back(&members[..moved], destination).await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn move_back(&self, members: &[MemberId], destination: ChannelId) {
        for &member in members.iter().rev() {
            if let Err(e) = self
                .ctx
                .platform
                .move_member(member, destination, self.channel_id)
                .await
            {
                error!(
                    queue = self.channel_id,
                    member,
                    error = %e,
                    "Failed to move member back after aborted pull"
                );
            }
        }
    }
}
