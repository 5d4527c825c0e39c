//! Channel presence, grace expiry and startup reconciliation.
//!
//! Only voice queues follow presence. Entering the bound channel joins the
//! queue (or ends a grace period), leaving it starts one.

use super::super::{QueueActor, ReconcileReport};
use crate::db::{MemberState, QueueKind, now_millis};
use crate::error::QueueResult;
use crate::grace::{self, Reconcile};
use crate::platform::MemberId;
use crate::state::notice::{Notice, emit};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

impl QueueActor {
    pub(crate) async fn handle_presence(&mut self, member: MemberId, present: bool) {
        if self.record.kind != QueueKind::Voice || member == self.ctx.controller_id {
            return;
        }

        let result = if present {
            self.member_arrived(member).await
        } else {
            self.member_departed(member).await
        };

        if let Err(e) = result {
            if e.is_user_error() {
                debug!(queue = self.channel_id, member, error = %e, "Presence change not applied");
            } else {
                warn!(queue = self.channel_id, member, error = %e, "Presence change failed");
            }
        }
    }

    async fn member_arrived(&mut self, member: MemberId) -> QueueResult<()> {
        match self.ctx.db.members().find(self.channel_id, member).await? {
            Some(entry) if entry.state() == MemberState::Grace => {
                self.ctx.grace.cancel(self.channel_id, member);
                self.ctx
                    .db
                    .members()
                    .mark_connected(self.channel_id, member)
                    .await?;
                self.touch();
                info!(
                    queue = self.channel_id,
                    member,
                    order_key = entry.order_key,
                    "Member returned within grace"
                );
            }
            Some(_) => {}
            None => {
                self.handle_join(member, false).await?;
                self.handle_auto_fill().await;
            }
        }
        Ok(())
    }

    async fn member_departed(&mut self, member: MemberId) -> QueueResult<()> {
        match self.ctx.db.members().find(self.channel_id, member).await? {
            Some(entry) if entry.state() == MemberState::Active => {
                if self.still_present(member).await {
                    debug!(queue = self.channel_id, member, "Stale departure ignored");
                    return Ok(());
                }
                self.start_grace(member, now_millis()).await
            }
            _ => Ok(()),
        }
    }

    /// Whether the platform still sees the member in the channel, as it does
    /// after a rolled-back move whose echo arrives late.
    async fn still_present(&self, member: MemberId) -> bool {
        match self.ctx.platform.list_occupants(self.channel_id).await {
            Ok(occupants) => occupants.contains(&member),
            Err(e) => {
                debug!(queue = self.channel_id, error = %e, "Occupancy unknown, trusting departure");
                false
            }
        }
    }

    /// Put an entry into grace, or drop it right away when the queue has none.
    async fn start_grace(&mut self, member: MemberId, since: i64) -> QueueResult<()> {
        if self.record.grace_period == 0 {
            self.remove_member(member).await?;
            info!(queue = self.channel_id, member, "Member left channel, removed");
            return Ok(());
        }

        self.ctx
            .db
            .members()
            .mark_disconnected(self.channel_id, member, since)
            .await?;
        let period = Duration::from_secs(self.record.grace_period);
        self.ctx.grace.arm(self.channel_id, member, period);
        self.touch();
        info!(
            queue = self.channel_id,
            member,
            grace_secs = self.record.grace_period,
            "Member left channel, grace started"
        );
        Ok(())
    }

    pub(crate) async fn handle_grace_expired(&mut self, member: MemberId, generation: u64) {
        if !self
            .ctx
            .grace
            .take_if_current(self.channel_id, member, generation)
        {
            debug!(queue = self.channel_id, member, generation, "Stale grace expiry ignored");
            return;
        }

        match self.ctx.db.members().find(self.channel_id, member).await {
            Ok(Some(entry)) if entry.state() == MemberState::Grace => {
                if let Err(e) = self.expire(member).await {
                    warn!(queue = self.channel_id, member, error = %e, "Failed to expire grace");
                }
            }
            Ok(_) => debug!(queue = self.channel_id, member, "Grace expiry for entry no longer in grace"),
            Err(e) => warn!(queue = self.channel_id, member, error = %e, "Failed to read entry for grace expiry"),
        }
    }

    async fn expire(&mut self, member: MemberId) -> QueueResult<()> {
        if self.remove_member(member).await?.is_some() {
            emit(
                &self.ctx.notices,
                Notice::GraceExpired {
                    queue: self.channel_id,
                    member,
                },
            );
            info!(queue = self.channel_id, member, "Grace expired, member removed");
        }
        Ok(())
    }

    /// Re-derive grace state after a restart.
    ///
    /// Entries whose grace ran out while the process was down are removed,
    /// the rest get timers for what is left of their grace. With `occupants`
    /// known, presence is reconciled as well.
    pub(crate) async fn handle_reconcile(
        &mut self,
        occupants: Option<HashSet<MemberId>>,
    ) -> QueueResult<ReconcileReport> {
        let entries = self.ctx.db.members().list_ordered(self.channel_id).await?;
        let occupants = occupants.filter(|_| self.record.kind == QueueKind::Voice);
        let now = now_millis();
        let period = Duration::from_secs(self.record.grace_period);
        let mut report = ReconcileReport::default();

        for action in grace::reconcile(&entries, now, period, occupants.as_ref()) {
            match action {
                Reconcile::Expire(member) => {
                    self.expire(member).await?;
                    report.expired += 1;
                }
                Reconcile::Rearm(member, remaining) => {
                    self.ctx.grace.arm(self.channel_id, member, remaining);
                    report.rearmed += 1;
                }
                Reconcile::Return(member) => {
                    self.ctx
                        .db
                        .members()
                        .mark_connected(self.channel_id, member)
                        .await?;
                    report.returned += 1;
                }
                Reconcile::Depart(member) => {
                    self.start_grace(member, now).await?;
                    report.departed += 1;
                }
            }
        }

        if let Some(occupants) = &occupants {
            let queued: HashSet<MemberId> = entries.iter().map(|e| e.member_id).collect();
            let mut newcomers: Vec<MemberId> = occupants
                .iter()
                .copied()
                .filter(|m| *m != self.ctx.controller_id && !queued.contains(m))
                .collect();
            newcomers.sort_unstable();
            for member in newcomers {
                match self.handle_join(member, false).await {
                    Ok(_) => report.joined += 1,
                    Err(e) => debug!(queue = self.channel_id, member, error = %e, "Occupant not queued"),
                }
            }
        }

        if report != ReconcileReport::default() {
            self.touch();
        }
        info!(
            queue = self.channel_id,
            expired = report.expired,
            rearmed = report.rearmed,
            returned = report.returned,
            departed = report.departed,
            joined = report.joined,
            "Queue reconciled"
        );
        Ok(report)
    }
}
