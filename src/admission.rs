//! Admission planning.
//!
//! Decides how many members leave the head of a queue for a pull request.
//! The queue actor owns the actual removal; this module only answers "how
//! many", so the policy can be tested without a store.

use crate::db::Database;
use crate::error::{QueueError, QueueResult};
use crate::platform::{ChannelId, ChannelPlatform, MemberId};

/// Inputs of a pull decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Members asked for (explicit count or the queue's default).
    pub requested: usize,
    /// Members currently eligible, in line order.
    pub available: usize,
    pub partial_pull: bool,
    /// Free slots at the destination, `None` when unlimited or no destination.
    pub destination_headroom: Option<usize>,
}

/// Number of members to admit.
///
/// An insufficient source is reported before a full destination: with partial
/// pulls disabled, a short queue fails with `InsufficientMembers` even when the
/// destination could not have taken anyone anyway.
pub fn plan(request: AdmissionRequest) -> QueueResult<usize> {
    let requested = request.requested.max(1);

    if request.available == 0 {
        return Err(QueueError::Empty);
    }

    let mut count = requested;
    if request.available < requested {
        if !request.partial_pull {
            return Err(QueueError::InsufficientMembers {
                available: request.available,
                requested,
            });
        }
        count = request.available;
    }

    if let Some(headroom) = request.destination_headroom {
        count = count.min(headroom);
        if count == 0 {
            return Err(QueueError::DestinationFull);
        }
    }

    Ok(count)
}

/// Free slots at a destination channel, `None` when nothing limits it.
///
/// Both the channel's user limit and the size limit of a queue bound to the
/// channel count; the tighter one wins. The controller does not take a slot:
/// it is about to be sent back to the source channel.
pub async fn destination_headroom(
    platform: &dyn ChannelPlatform,
    db: &Database,
    channel: ChannelId,
    controller: MemberId,
) -> QueueResult<Option<usize>> {
    let channel_room = match platform.channel_capacity(channel).await? {
        Some(capacity) => {
            let occupants = platform.list_occupants(channel).await?;
            let occupied = occupants.iter().filter(|m| **m != controller).count();
            Some(capacity.saturating_sub(occupied))
        }
        None => None,
    };

    let queue_room = match db.queues().find(channel).await? {
        Some(record) if record.size_limit.is_some() => {
            let queued = db.members().count(channel).await?;
            record.headroom(queued)
        }
        _ => None,
    };

    Ok(match (channel_room, queue_room) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    })
}
