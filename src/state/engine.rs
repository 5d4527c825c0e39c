//! The engine: every collaborator of the queue system wired together.

use crate::config::Config;
use crate::db::{Database, QueueKind};
use crate::display::{DisplayScheduler, DisplayStore};
use crate::error::QueueResult;
use crate::grace::{GraceExpiry, GraceTimers};
use crate::platform::{ChannelPlatform, RenderSurface};
use crate::state::actor::{ActorContext, QueueEvent};
use crate::state::managers::queue::QueueManager;
use crate::state::notice::{NOTICE_CHANNEL_SIZE, Notice};
use crate::transfer::TransferCoordinator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Shared engine state.
pub struct Engine {
    pub config: Config,
    pub db: Database,
    pub platform: Arc<dyn ChannelPlatform>,
    pub display: DisplayScheduler,
    pub grace: GraceTimers,
    pub queues: Arc<QueueManager>,
    pub transfer: TransferCoordinator,
}

impl Engine {
    /// Build the engine, start an actor per stored queue and reconcile them.
    ///
    /// Returns the engine together with the stream of notices it emits.
    pub async fn start(
        config: Config,
        db: Database,
        platform: Arc<dyn ChannelPlatform>,
        surface: Arc<dyn RenderSurface>,
    ) -> QueueResult<(Arc<Self>, mpsc::Receiver<Notice>)> {
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CHANNEL_SIZE);
        let (grace, expiry_rx) = GraceTimers::new();
        let store: Arc<dyn DisplayStore> = Arc::new(db.clone());
        let display = DisplayScheduler::new(surface, store, &config.display);
        let controller_id = config.engine.controller_id;

        let ctx = ActorContext {
            db: db.clone(),
            platform: platform.clone(),
            display: display.clone(),
            grace: grace.clone(),
            notices: notice_tx.clone(),
            controller_id,
        };
        let queues = Arc::new(QueueManager::new(ctx, config.engine.mailbox_capacity));
        let transfer = TransferCoordinator::new(controller_id, platform.clone(), queues.clone(), notice_tx);

        tokio::spawn(route_expiries(queues.clone(), expiry_rx));

        let engine = Arc::new(Self {
            config,
            db,
            platform,
            display,
            grace,
            queues,
            transfer,
        });

        engine.queues.load_all().await?;
        engine.reconcile_all().await;
        let bindings = engine.db.displays().load_all().await?;
        engine.display.restore(bindings).await;

        Ok((engine, notice_rx))
    }

    /// Bring every queue in line with the clock and, for voice queues, with
    /// who is actually in the channel.
    async fn reconcile_all(&self) {
        let records = match self.db.queues().load_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load queues for reconciliation");
                return;
            }
        };

        for record in records {
            let queue = record.channel_id;
            let occupants = match record.kind {
                QueueKind::Voice => match self.platform.list_occupants(queue).await {
                    Ok(occupants) => Some(occupants),
                    Err(e) => {
                        warn!(queue, error = %e, "Channel occupancy unknown, reconciling by clock only");
                        None
                    }
                },
                QueueKind::Text => None,
            };
            if let Err(e) = self.queues.reconcile(queue, occupants).await {
                warn!(queue, error = %e, "Queue reconciliation failed");
            }
        }
        info!(armed_timers = self.grace.armed_count(), "Startup reconciliation finished");
    }
}

/// Forward fired grace timers to the queue that owns them.
async fn route_expiries(queues: Arc<QueueManager>, mut rx: mpsc::Receiver<GraceExpiry>) {
    while let Some(expiry) = rx.recv().await {
        let event = QueueEvent::GraceExpired {
            member: expiry.member,
            generation: expiry.generation,
        };
        queues.notify(expiry.queue, event).await;
    }
}
