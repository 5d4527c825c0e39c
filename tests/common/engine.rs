//! In-process test engine.
//!
//! Runs the real engine and dispatcher against the local platform and
//! surface, feeding it the same inbound stream `lineupd` uses.

use super::FlakyPlatform;
use lineup::config::Config;
use lineup::db::{Database, QueueKind};
use lineup::dispatch::{Dispatcher, Inbound, Intent, Outcome, PlatformEvent, QueueOptions};
use lineup::error::QueueResult;
use lineup::platform::local::{LocalPlatform, LocalSurface};
use lineup::platform::{ChannelId, ChannelPlatform, MemberId, RenderSurface};
use lineup::state::{Engine, Notice};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Member id of the bot in every test engine.
pub const CONTROLLER: MemberId = 1;

/// How a test engine is started.
pub struct Setup {
    pub db_path: String,
    /// Wrap the platform so moves can be made to fail.
    pub flaky: bool,
    /// Members already sitting in voice channels at startup.
    pub occupants: Vec<(MemberId, ChannelId)>,
    pub capacities: Vec<(ChannelId, usize)>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            flaky: false,
            occupants: Vec::new(),
            capacities: Vec::new(),
        }
    }
}

pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub platform: Arc<LocalPlatform>,
    pub flaky: Option<Arc<FlakyPlatform>>,
    pub surface: Arc<LocalSurface>,
    pub notices: mpsc::Receiver<Notice>,
    inbound: mpsc::Sender<Inbound>,
}

impl TestEngine {
    pub async fn start() -> Self {
        Self::start_with(Setup::default()).await
    }

    pub async fn start_with(setup: Setup) -> Self {
        let mut config = Config::default();
        config.engine.controller_id = CONTROLLER;
        config.display.coalesce_ms = 20;
        config.display.renders_per_second = 100;

        let db = Database::new(&setup.db_path).await.unwrap();
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let local = LocalPlatform::new(CONTROLLER).with_feedback(inbound_tx.clone());
        for (member, channel) in &setup.occupants {
            local.record_voice_state(*member, None, Some(*channel));
        }
        for (channel, capacity) in &setup.capacities {
            local.set_capacity(*channel, *capacity);
        }
        let local = Arc::new(local);

        let flaky = setup
            .flaky
            .then(|| Arc::new(FlakyPlatform::new(local.clone())));
        let platform: Arc<dyn ChannelPlatform> = match &flaky {
            Some(flaky) => flaky.clone(),
            None => local.clone(),
        };
        let surface = Arc::new(LocalSurface::new());
        let render: Arc<dyn RenderSurface> = surface.clone();

        let (engine, notices) = Engine::start(config, db, platform, render).await.unwrap();
        tokio::spawn(Dispatcher::new(engine.clone()).run(inbound_rx));

        Self {
            engine,
            platform: local,
            flaky,
            surface,
            notices,
            inbound: inbound_tx,
        }
    }

    /// Dispatch an intent and wait for its outcome.
    pub async fn send(&self, intent: Intent) -> QueueResult<Outcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbound
            .send(Inbound::Intent {
                intent,
                reply: Some(reply_tx),
            })
            .await
            .unwrap();
        reply_rx.await.unwrap()
    }

    pub async fn create(&self, queue: ChannelId, kind: QueueKind, options: QueueOptions) {
        self.send(Intent::CreateQueue {
            queue,
            kind,
            options,
        })
        .await
        .unwrap();
    }

    pub async fn join(&self, queue: ChannelId, member: MemberId) -> QueueResult<Outcome> {
        self.send(Intent::Join {
            queue,
            member,
            priority: false,
        })
        .await
    }

    /// A member moves between voice channels on the platform.
    pub async fn voice(&self, member: MemberId, from: Option<ChannelId>, to: Option<ChannelId>) {
        self.platform.record_voice_state(member, from, to);
        self.inbound
            .send(Inbound::Event(PlatformEvent::VoiceState { member, from, to }))
            .await
            .unwrap();
    }

    pub async fn event(&self, event: PlatformEvent) {
        self.inbound.send(Inbound::Event(event)).await.unwrap();
    }

    /// Members of a queue in line order.
    pub async fn line(&self, queue: ChannelId) -> Vec<MemberId> {
        self.engine
            .queues
            .snapshot(queue)
            .await
            .unwrap()
            .entries
            .iter()
            .map(|e| e.member_id)
            .collect()
    }

    /// Wait until the queue's line is exactly `expected`.
    pub async fn wait_for_line(&self, queue: ChannelId, expected: &[MemberId]) {
        let this = self;
        eventually(move || async move { this.line(queue).await == expected }).await;
    }

    /// Wait until a grace timer is (or is no longer) armed for a member.
    pub async fn wait_for_grace(&self, queue: ChannelId, member: MemberId, armed: bool) {
        let grace = &self.engine.grace;
        eventually(move || async move { grace.is_armed(queue, member) == armed }).await;
    }

    /// Wait until the platform sees a member in a channel.
    pub async fn wait_for_occupant(&self, channel: ChannelId, member: MemberId) {
        let platform = &self.platform;
        eventually(move || async move { platform.occupants_of(channel).contains(&member) }).await;
    }

    /// Wait for the next notice.
    pub async fn next_notice(&mut self) -> Notice {
        tokio::time::timeout(Duration::from_secs(5), self.notices.recv())
            .await
            .expect("no notice within 5s")
            .expect("notice channel closed")
    }
}

/// Poll `check` until it holds, panicking after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}
