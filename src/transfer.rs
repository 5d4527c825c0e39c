//! Voice transfer ("drag and swap").
//!
//! An operator arms a voice queue; the controller (the bot's own member) joins
//! the queue's channel and waits there. Dragging the controller into another
//! channel pulls members from the head of the queue into that channel, after
//! which the controller is sent back to wait for the next drag.
//!
//! ```text
//!          arm            controller enters source
//!  ┌──────┐ ───► ┌───────┐ ──────────────────────► ┌─────────┐ ◄─┐ controller dragged to D:
//!  │ Idle │      │ Armed │                         │ Waiting │   │ pull into D, send
//!  └──────┘ ◄─── └───────┘                         └────┬────┘ ──┘ controller back
//!      ▲   disarm                                       │
//!      └────────────────────────────────────────────────┘
//!        controller disconnects from source, queue deleted, or disarm
//! ```
//!
//! Sessions live in memory only. After a restart every queue is `Idle` and the
//! operator arms again.

use crate::db::QueueKind;
use crate::error::{QueueError, QueueResult};
use crate::platform::{ChannelId, ChannelPlatform, MemberId};
use crate::state::actor::{Admission, PullCount, PullRequest, QueueEvent};
use crate::state::managers::queue::{QueueManager, await_reply};
use crate::state::notice::{Notice, emit};
use crate::telemetry::spans;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

/// Where a queue's transfer session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    /// Armed; the controller has not arrived in the source channel yet.
    Armed,
    /// The controller is in the source channel waiting to be dragged.
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    source: ChannelId,
    state: TransferState,
}

/// What a controller move means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ignore,
    Ready(ChannelId),
    Transfer {
        source: ChannelId,
        destination: ChannelId,
    },
    TornDown(ChannelId),
}

/// Advance the session for a controller move from `from` to `to`.
fn step(session: &mut Option<Session>, from: Option<ChannelId>, to: Option<ChannelId>) -> Step {
    let Some(current) = session.as_mut() else {
        return Step::Ignore;
    };
    let source = current.source;

    if to == Some(source) {
        if current.state == TransferState::Armed {
            current.state = TransferState::Waiting;
            return Step::Ready(source);
        }
        return Step::Ignore;
    }

    if from != Some(source) || current.state != TransferState::Waiting {
        return Step::Ignore;
    }
    match to {
        None => {
            *session = None;
            Step::TornDown(source)
        }
        Some(destination) => Step::Transfer {
            source,
            destination,
        },
    }
}

/// Drives the voice transfer protocol for the controller.
///
/// There is one controller, so at most one session exists at a time; arming a
/// queue replaces any earlier session.
pub struct TransferCoordinator {
    controller: MemberId,
    session: Mutex<Option<Session>>,
    platform: Arc<dyn ChannelPlatform>,
    queues: Arc<QueueManager>,
    notices: mpsc::Sender<Notice>,
}

impl TransferCoordinator {
    pub fn new(
        controller: MemberId,
        platform: Arc<dyn ChannelPlatform>,
        queues: Arc<QueueManager>,
        notices: mpsc::Sender<Notice>,
    ) -> Self {
        Self {
            controller,
            session: Mutex::new(None),
            platform,
            queues,
            notices,
        }
    }

    pub fn controller(&self) -> MemberId {
        self.controller
    }

    pub fn state(&self, source: ChannelId) -> TransferState {
        match *self.session.lock() {
            Some(session) if session.source == source => session.state,
            _ => TransferState::Idle,
        }
    }

    /// Bind a session to a voice queue and send the controller there.
    pub async fn arm(&self, source: ChannelId) -> QueueResult<TransferState> {
        let snapshot = self.queues.snapshot(source).await?;
        if snapshot.queue.kind != QueueKind::Voice {
            return Err(QueueError::NotVoice(source));
        }

        let previous = self.session.lock().replace(Session {
            source,
            state: TransferState::Armed,
        });
        if let Some(previous) = previous
            && previous.source != source
        {
            info!(source = previous.source, "Transfer session replaced");
        }

        if let Err(e) = self.platform.connect_controller(source).await {
            self.disarm(source);
            return Err(e.into());
        }

        // The controller may already have been sitting in the channel.
        let occupants = self.platform.list_occupants(source).await?;
        let mut session = self.session.lock();
        if let Some(current) = session.as_mut()
            && current.source == source
            && occupants.contains(&self.controller)
        {
            current.state = TransferState::Waiting;
        }
        let state = session.map(|s| s.state).unwrap_or(TransferState::Idle);
        drop(session);

        info!(source, state = ?state, "Voice transfer armed");
        Ok(state)
    }

    /// Tear down the session for `source`. Returns whether one existed.
    pub fn disarm(&self, source: ChannelId) -> bool {
        let mut session = self.session.lock();
        if session.is_some_and(|s| s.source == source) {
            *session = None;
            info!(source, "Voice transfer disarmed");
            return true;
        }
        false
    }

    /// The queue bound to `source` is gone.
    pub fn queue_destroyed(&self, source: ChannelId) {
        self.disarm(source);
    }

    /// React to the controller moving between channels.
    ///
    /// A drag enqueues the pull before returning, so it is ordered after every
    /// event already dispatched to the source queue. The returned handle
    /// completes once the members were moved and the controller sent back.
    pub async fn controller_moved(
        &self,
        from: Option<ChannelId>,
        to: Option<ChannelId>,
    ) -> Option<JoinHandle<()>> {
        let action = step(&mut self.session.lock(), from, to);
        match action {
            Step::Ignore => None,
            Step::Ready(source) => {
                info!(source, "Controller waiting in source channel");
                None
            }
            Step::TornDown(source) => {
                info!(source, "Controller left source channel, transfer torn down");
                None
            }
            Step::Transfer {
                source,
                destination,
            } => {
                let span = spans::transfer(source, Some(destination));
                let request = PullRequest {
                    count: PullCount::FillDestination { unlimited: 1 },
                    destination: Some(destination),
                };
                let rx = self
                    .queues
                    .enqueue(source, |reply_tx| QueueEvent::Pull { request, reply_tx })
                    .await;
                Some(tokio::spawn(
                    self.finish(source, destination, rx).instrument(span),
                ))
            }
        }
    }

    /// Report the pull and send the controller back to the source channel.
    fn finish(
        &self,
        source: ChannelId,
        destination: ChannelId,
        rx: QueueResult<oneshot::Receiver<QueueResult<Admission>>>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let platform = self.platform.clone();
        let notices = self.notices.clone();
        let controller = self.controller;

        async move {
            let result = match rx {
                Ok(rx) => await_reply(rx).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(admission) => {
                    info!(pulled = ?admission.members, "Voice transfer completed");
                    emit(
                        &notices,
                        Notice::Transferred {
                            queue: source,
                            members: admission.members,
                            destination,
                        },
                    );
                }
                Err(error) => {
                    debug!(error = %error, "Voice transfer pulled nobody");
                    emit(
                        &notices,
                        Notice::TransferFailed {
                            queue: source,
                            error,
                        },
                    );
                }
            }

            if let Err(e) = platform.move_member(controller, destination, source).await {
                warn!(error = %e, "Failed to return controller to source channel");
            }
        }
    }
}
