//! Outbound notices.
//!
//! Things the engine did on its own, without an intent asking for them. The
//! host surfaces them however it likes; `lineupd` logs them.

use crate::error::QueueError;
use crate::platform::{ChannelId, MemberId};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the notice channel.
pub const NOTICE_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A member's grace period ran out and they lost their place.
    GraceExpired { queue: ChannelId, member: MemberId },
    /// Members were pulled into a queue's auto-fill target.
    AutoFilled {
        queue: ChannelId,
        members: Vec<MemberId>,
        destination: ChannelId,
    },
    /// A voice transfer moved members into the channel the controller was dragged to.
    Transferred {
        queue: ChannelId,
        members: Vec<MemberId>,
        destination: ChannelId,
    },
    /// A voice transfer could not be carried out.
    TransferFailed { queue: ChannelId, error: QueueError },
}

/// Send a notice without ever blocking the caller.
pub(crate) fn emit(tx: &mpsc::Sender<Notice>, notice: Notice) {
    if let Err(e) = tx.try_send(notice) {
        debug!(error = %e, "Notice dropped");
    }
}
