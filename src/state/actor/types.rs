use crate::db::{MemberEntry, QueueRecord};
use crate::display::{DisplayMode, QueueSnapshot};
use crate::error::QueueResult;
use crate::platform::{ChannelId, MemberId, RoleId};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::oneshot;

/// How many members a pull asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PullCount {
    /// The queue's configured pull count.
    #[default]
    Configured,
    Exact(usize),
    /// The destination's free slots, or `unlimited` members when it has no
    /// user limit.
    FillDestination { unlimited: usize },
}

/// A pull from the head of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullRequest {
    pub count: PullCount,
    /// Voice channel to move the pulled members into.
    pub destination: Option<ChannelId>,
}

/// Members that left the queue through a pull, in line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub members: Vec<MemberId>,
    pub destination: Option<ChannelId>,
}

/// Counts of what startup reconciliation changed in one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub expired: usize,
    pub rearmed: usize,
    pub returned: usize,
    pub departed: usize,
    /// Channel occupants that were not queued yet.
    pub joined: usize,
}

/// A single queue setting change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum QueueSetting {
    Limit(Option<usize>),
    PullCount(u32),
    PartialPull(bool),
    /// Seconds.
    GracePeriod(u64),
    Lock(bool),
    MuteOnJoin(bool),
    AutoFill(bool),
    Role(Option<RoleId>),
    Target(Option<ChannelId>),
    Header(Option<String>),
    Color(u32),
    DisplayMode(DisplayMode),
}

impl QueueSetting {
    /// Apply the change to a record.
    pub fn apply(self, record: &mut QueueRecord) {
        match self {
            Self::Limit(limit) => record.size_limit = limit,
            Self::PullCount(count) => record.pull_count = count.max(1),
            Self::PartialPull(on) => record.partial_pull = on,
            Self::GracePeriod(secs) => record.grace_period = secs,
            Self::Lock(on) => record.locked = on,
            Self::MuteOnJoin(on) => record.mute_on_join = on,
            Self::AutoFill(on) => record.auto_fill = on,
            Self::Role(role) => record.role_id = role,
            Self::Target(target) => record.target_channel_id = target,
            Self::Header(header) => record.header = header,
            Self::Color(color) => record.color = color & 0x00FF_FFFF,
            Self::DisplayMode(mode) => record.display_mode = mode,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Limit(_) => "limit",
            Self::PullCount(_) => "pull_count",
            Self::PartialPull(_) => "partial_pull",
            Self::GracePeriod(_) => "grace_period",
            Self::Lock(_) => "lock",
            Self::MuteOnJoin(_) => "mute_on_join",
            Self::AutoFill(_) => "auto_fill",
            Self::Role(_) => "role",
            Self::Target(_) => "target",
            Self::Header(_) => "header",
            Self::Color(_) => "color",
            Self::DisplayMode(_) => "display_mode",
        }
    }
}

/// Events that can be sent to a Queue Actor.
#[derive(Debug)]
pub enum QueueEvent {
    /// Member asking to join.
    Join {
        member: MemberId,
        priority: bool,
        reply_tx: oneshot::Sender<QueueResult<MemberEntry>>,
    },
    /// Member asking to leave.
    Leave {
        member: MemberId,
        reply_tx: oneshot::Sender<QueueResult<MemberEntry>>,
    },
    /// Admit members from the head of the line.
    Pull {
        request: PullRequest,
        reply_tx: oneshot::Sender<QueueResult<Admission>>,
    },
    /// Operator removing specific members.
    Kick {
        members: Vec<MemberId>,
        reply_tx: oneshot::Sender<QueueResult<Vec<MemberId>>>,
    },
    /// Remove everyone.
    Clear {
        reply_tx: oneshot::Sender<QueueResult<Vec<MemberId>>>,
    },
    /// Randomly permute the line.
    Shuffle {
        reply_tx: oneshot::Sender<QueueResult<()>>,
    },
    Configure {
        setting: QueueSetting,
        reply_tx: oneshot::Sender<QueueResult<QueueRecord>>,
    },
    /// Member entered (`present`) or left the bound voice channel.
    Presence { member: MemberId, present: bool },
    /// A grace timer ran out.
    GraceExpired { member: MemberId, generation: u64 },
    /// Someone left the auto-fill target; try to top it up.
    AutoFill,
    /// Bring stored entries in line with the clock and channel occupancy.
    Reconcile {
        occupants: Option<HashSet<MemberId>>,
        reply_tx: oneshot::Sender<QueueResult<ReconcileReport>>,
    },
    Snapshot {
        reply_tx: oneshot::Sender<QueueResult<QueueSnapshot>>,
    },
    /// Delete the queue and stop the actor.
    Destroy {
        reply_tx: oneshot::Sender<QueueResult<()>>,
    },
}

impl QueueEvent {
    /// Short name for spans and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Pull { .. } => "pull",
            Self::Kick { .. } => "kick",
            Self::Clear { .. } => "clear",
            Self::Shuffle { .. } => "shuffle",
            Self::Configure { .. } => "configure",
            Self::Presence { .. } => "presence",
            Self::GraceExpired { .. } => "grace_expired",
            Self::AutoFill => "auto_fill",
            Self::Reconcile { .. } => "reconcile",
            Self::Snapshot { .. } => "snapshot",
            Self::Destroy { .. } => "destroy",
        }
    }
}
