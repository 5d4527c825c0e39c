//! Debounced display refresh.
//!
//! Each displayed queue gets one worker task. Mutations call
//! [`DisplayScheduler::touch`], which stores a single [`Notify`] permit, so any
//! number of touches before the worker wakes collapse into one refresh. The
//! worker then waits out the coalescing window and renders whatever the store
//! holds at that moment. Bindings are guarded by a per-queue mutex, so a target
//! never has more than one render in flight.

use super::{DisplayMode, DisplayStore, QueueSnapshot, render};
use crate::config::DisplayConfig;
use crate::db::DisplayBinding;
use crate::error::QueueError;
use crate::platform::{ChannelId, RenderSurface, TargetId};
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Render state of one displayed queue.
struct QueueDisplay {
    queue: ChannelId,
    notify: Notify,
    bindings: Mutex<Vec<DisplayBinding>>,
}

struct DisplayEntry {
    state: Arc<QueueDisplay>,
    worker: AbortHandle,
}

struct Inner {
    surface: Arc<dyn RenderSurface>,
    store: Arc<dyn DisplayStore>,
    window: Duration,
    limiter: DefaultDirectRateLimiter,
    queues: DashMap<ChannelId, DisplayEntry>,
}

/// Keeps rendered queue displays in sync with the store.
#[derive(Clone)]
pub struct DisplayScheduler {
    inner: Arc<Inner>,
}

impl DisplayScheduler {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        store: Arc<dyn DisplayStore>,
        config: &DisplayConfig,
    ) -> Self {
        let rate = NonZeroU32::new(config.renders_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(Inner {
                surface,
                store,
                window: config.coalesce_window(),
                limiter: RateLimiter::direct(Quota::per_second(rate)),
                queues: DashMap::new(),
            }),
        }
    }

    /// Re-attach persisted bindings and schedule a refresh for each queue.
    pub async fn restore(&self, bindings: Vec<DisplayBinding>) {
        let mut grouped: HashMap<ChannelId, Vec<DisplayBinding>> = HashMap::new();
        for binding in bindings {
            grouped.entry(binding.channel_id).or_default().push(binding);
        }

        for (queue, bindings) in grouped {
            let display = self.display(queue);
            display.bindings.lock().await.extend(bindings);
            display.notify.notify_one();
        }
        info!(queues = self.inner.queues.len(), "Restored queue displays");
    }

    /// Note that a queue changed. Cheap, and a no-op for undisplayed queues.
    pub fn touch(&self, queue: ChannelId) {
        if let Some(entry) = self.inner.queues.get(&queue) {
            entry.state.notify.notify_one();
        }
    }

    pub fn is_displayed(&self, queue: ChannelId) -> bool {
        self.inner.queues.contains_key(&queue)
    }

    /// Show a queue on a surface right away.
    ///
    /// In edit mode this replaces every existing target of the queue; in the
    /// resend modes it replaces the binding on this surface, deleting the old
    /// target only for `ResendAndDelete`.
    pub async fn show(&self, queue: ChannelId, surface: ChannelId) -> Result<TargetId, QueueError> {
        let snapshot = self
            .inner
            .store
            .snapshot(queue)
            .await?
            .ok_or(QueueError::NoSuchQueue(queue))?;
        let rendered = render(&snapshot);
        let display = self.display(queue);
        let mut bindings = display.bindings.lock().await;

        self.inner.limiter.until_ready().await;
        let target_id = self
            .inner
            .surface
            .create_target(surface, &rendered.text)
            .await?;

        let binding = DisplayBinding {
            channel_id: queue,
            surface_id: surface,
            target_id,
            content_hash: Some(rendered.hash),
        };
        if let Err(err) = self.inner.store.save_binding(&binding).await {
            if let Err(e) = self.inner.surface.delete_target(target_id).await {
                debug!(queue, target = target_id, error = %e, "Unsaved display already gone");
            }
            return Err(err.into());
        }

        let mode = snapshot.queue.display_mode;
        let mut kept = Vec::with_capacity(bindings.len() + 1);
        for old in bindings.drain(..) {
            let replaced = mode == DisplayMode::Edit || old.surface_id == surface;
            if !replaced {
                kept.push(old);
                continue;
            }
            if mode != DisplayMode::Resend
                && let Err(e) = self.inner.surface.delete_target(old.target_id).await
            {
                debug!(queue, target = old.target_id, error = %e, "Old display already gone");
            }
            if old.surface_id != surface
                && let Err(e) = self.inner.store.drop_binding(queue, old.surface_id).await
            {
                warn!(queue, surface = old.surface_id, error = %e, "Failed to drop display binding");
            }
        }
        kept.push(binding);
        *bindings = kept;

        info!(queue, surface, target = target_id, mode = mode.as_str(), "Queue displayed");
        Ok(target_id)
    }

    /// Keep only the newest binding of a queue, deleting the other targets.
    ///
    /// Called when a queue switches to edit mode, which keeps exactly one
    /// target per queue.
    pub async fn collapse(&self, queue: ChannelId) {
        let Some(display) = self.inner.queues.get(&queue).map(|e| e.state.clone()) else {
            return;
        };
        let mut bindings = display.bindings.lock().await;
        let Some(newest) = bindings.pop() else {
            return;
        };

        for old in bindings.drain(..) {
            if let Err(e) = self.inner.surface.delete_target(old.target_id).await {
                debug!(queue, target = old.target_id, error = %e, "Old display already gone");
            }
            if let Err(e) = self.inner.store.drop_binding(queue, old.surface_id).await {
                warn!(queue, surface = old.surface_id, error = %e, "Failed to drop display binding");
            }
        }
        bindings.push(newest);
        display.notify.notify_one();
        debug!(queue, "Display collapsed to one target");
    }

    /// Stop displaying a queue and remove its targets.
    pub async fn forget(&self, queue: ChannelId) {
        let Some((_, entry)) = self.inner.queues.remove(&queue) else {
            return;
        };
        entry.worker.abort();

        let bindings = std::mem::take(&mut *entry.state.bindings.lock().await);
        for binding in bindings {
            if let Err(e) = self.inner.surface.delete_target(binding.target_id).await {
                debug!(queue, target = binding.target_id, error = %e, "Display target already gone");
            }
        }
        debug!(queue, "Display forgotten");
    }

    /// A surface was deleted; drop every binding rendered on it.
    pub async fn drop_surface(&self, surface: ChannelId) {
        let displays: Vec<Arc<QueueDisplay>> =
            self.inner.queues.iter().map(|e| e.state.clone()).collect();

        for display in displays {
            let queue = display.queue;
            let mut bindings = display.bindings.lock().await;
            let before = bindings.len();
            bindings.retain(|b| b.surface_id != surface);
            if bindings.len() == before {
                continue;
            }
            if let Err(e) = self.inner.store.drop_binding(queue, surface).await {
                warn!(queue, surface, error = %e, "Failed to drop display binding");
            }
            debug!(queue, surface, "Display surface removed");
        }
    }

    /// Get the display state for a queue, spawning its worker on first use.
    fn display(&self, queue: ChannelId) -> Arc<QueueDisplay> {
        if let Some(entry) = self.inner.queues.get(&queue) {
            return entry.state.clone();
        }

        let entry = self.inner.queues.entry(queue).or_insert_with(|| {
            let state = Arc::new(QueueDisplay {
                queue,
                notify: Notify::new(),
                bindings: Mutex::new(Vec::new()),
            });
            let worker = tokio::spawn(run_worker(self.inner.clone(), state.clone()));
            DisplayEntry {
                state,
                worker: worker.abort_handle(),
            }
        });
        entry.state.clone()
    }
}

async fn run_worker(inner: Arc<Inner>, display: Arc<QueueDisplay>) {
    loop {
        display.notify.notified().await;
        tokio::time::sleep(inner.window).await;
        if !inner.refresh(&display).await {
            inner.queues.remove(&display.queue);
            return;
        }
    }
}

impl Inner {
    /// Render the latest state into every binding whose content is stale.
    ///
    /// Returns `false` once the queue has disappeared from the store.
    async fn refresh(&self, display: &QueueDisplay) -> bool {
        let queue = display.queue;
        let snapshot = match self.store.snapshot(queue).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(queue, "Queue gone, stopping display worker");
                return false;
            }
            Err(e) => {
                warn!(queue, error = %e, "Failed to read queue for display");
                return true;
            }
        };

        let mut bindings = display.bindings.lock().await;
        let current = std::mem::take(&mut *bindings);
        for binding in current {
            if let Some(binding) = self.refresh_binding(&snapshot, binding).await {
                bindings.push(binding);
            }
        }
        true
    }

    /// Bring one binding up to date. `None` means the binding was dropped.
    async fn refresh_binding(
        &self,
        snapshot: &QueueSnapshot,
        mut binding: DisplayBinding,
    ) -> Option<DisplayBinding> {
        let rendered = render(snapshot);
        if binding.content_hash.as_deref() == Some(rendered.hash.as_str()) {
            return Some(binding);
        }

        self.limiter.until_ready().await;
        let queue = binding.channel_id;
        let outcome = match snapshot.queue.display_mode {
            DisplayMode::Edit => self
                .surface
                .update_target(binding.target_id, &rendered.text)
                .await
                .map(|_| binding.target_id),
            DisplayMode::ResendAndDelete | DisplayMode::Resend => {
                self.surface
                    .create_target(binding.surface_id, &rendered.text)
                    .await
            }
        };

        let target_id = match outcome {
            Ok(target_id) => target_id,
            Err(e) => {
                warn!(queue, target = binding.target_id, error = %e, "Render failed, dropping display");
                if let Err(e) = self.store.drop_binding(queue, binding.surface_id).await {
                    warn!(queue, error = %e, "Failed to drop display binding");
                }
                return None;
            }
        };

        if snapshot.queue.display_mode == DisplayMode::ResendAndDelete
            && let Err(e) = self.surface.delete_target(binding.target_id).await
        {
            debug!(queue, target = binding.target_id, error = %e, "Previous display already gone");
        }

        binding.target_id = target_id;
        binding.content_hash = Some(rendered.hash);
        if let Err(e) = self.store.save_binding(&binding).await {
            warn!(queue, error = %e, "Failed to persist display binding");
        }
        debug!(queue, target = target_id, "Display refreshed");
        Some(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueDefaults;
    use crate::db::{DbError, MemberEntry, QueueKind, QueueRecord};
    use crate::platform::local::LocalSurface;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    /// Store whose queue state tests mutate directly.
    struct FakeStore {
        state: SyncMutex<Option<QueueSnapshot>>,
        saved: SyncMutex<Vec<DisplayBinding>>,
        dropped: SyncMutex<Vec<(ChannelId, ChannelId)>>,
        fail_saves: SyncMutex<bool>,
    }

    impl FakeStore {
        fn new(mode: DisplayMode) -> Arc<Self> {
            let mut queue = QueueRecord::new(1, QueueKind::Text, &QueueDefaults::default());
            queue.display_mode = mode;
            Arc::new(Self {
                state: SyncMutex::new(Some(QueueSnapshot {
                    queue,
                    entries: Vec::new(),
                })),
                saved: SyncMutex::new(Vec::new()),
                dropped: SyncMutex::new(Vec::new()),
                fail_saves: SyncMutex::new(false),
            })
        }

        fn push_member(&self, member_id: i64) {
            let mut state = self.state.lock();
            let snapshot = state.as_mut().unwrap();
            let order_key = snapshot.entries.len() as i64 + 1;
            snapshot.entries.push(MemberEntry {
                channel_id: 1,
                member_id,
                order_key,
                priority: false,
                joined_at: order_key,
                disconnected_at: None,
            });
        }
    }

    #[async_trait]
    impl DisplayStore for FakeStore {
        async fn snapshot(&self, _queue: ChannelId) -> Result<Option<QueueSnapshot>, DbError> {
            Ok(self.state.lock().clone())
        }

        async fn save_binding(&self, binding: &DisplayBinding) -> Result<(), DbError> {
            if *self.fail_saves.lock() {
                return Err(DbError::Corrupt("disk full".to_string()));
            }
            self.saved.lock().push(binding.clone());
            Ok(())
        }

        async fn drop_binding(&self, queue: ChannelId, surface: ChannelId) -> Result<(), DbError> {
            self.dropped.lock().push((queue, surface));
            Ok(())
        }
    }

    fn scheduler(store: Arc<FakeStore>, surface: Arc<LocalSurface>) -> DisplayScheduler {
        let config = DisplayConfig {
            coalesce_ms: 100,
            renders_per_second: 100,
        };
        DisplayScheduler::new(surface, store, &config)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_touches_renders_once_with_latest_state() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        let target = scheduler.show(1, 50).await.unwrap();

        for member in 10..15 {
            store.push_member(member);
            scheduler.touch(1);
        }
        settle().await;

        assert_eq!(surface.call_counts(), (1, 1, 0));
        let content = surface.content(target).unwrap();
        assert!(content.contains("5. <@14>"));
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_content_is_not_rendered() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        scheduler.show(1, 50).await.unwrap();

        scheduler.touch(1);
        settle().await;
        scheduler.touch(1);
        settle().await;

        assert_eq!(surface.call_counts(), (1, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_on_undisplayed_queue_is_noop() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store, surface.clone());

        scheduler.touch(1);
        settle().await;

        assert!(!scheduler.is_displayed(1));
        assert_eq!(surface.call_counts(), (0, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn resend_and_delete_replaces_target() {
        let store = FakeStore::new(DisplayMode::ResendAndDelete);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        let first = scheduler.show(1, 50).await.unwrap();

        store.push_member(10);
        scheduler.touch(1);
        settle().await;

        let targets = surface.targets_on(50);
        assert_eq!(targets.len(), 1);
        assert_ne!(targets[0], first);
        assert_eq!(surface.call_counts(), (2, 0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn resend_keeps_history() {
        let store = FakeStore::new(DisplayMode::Resend);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        scheduler.show(1, 50).await.unwrap();

        store.push_member(10);
        scheduler.touch(1);
        settle().await;
        store.push_member(11);
        scheduler.touch(1);
        settle().await;

        assert_eq!(surface.targets_on(50).len(), 3);
        assert_eq!(surface.call_counts(), (3, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn externally_deleted_target_drops_binding() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        let target = scheduler.show(1, 50).await.unwrap();
        surface.remove_externally(target);

        store.push_member(10);
        scheduler.touch(1);
        settle().await;
        store.push_member(11);
        scheduler.touch(1);
        settle().await;

        // one failed update, no retry afterwards
        assert_eq!(surface.call_counts(), (1, 1, 0));
        assert_eq!(store.dropped.lock().as_slice(), &[(1, 50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_mode_show_replaces_existing_targets() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());

        scheduler.show(1, 50).await.unwrap();
        let second = scheduler.show(1, 60).await.unwrap();

        assert!(surface.targets_on(50).is_empty());
        assert_eq!(surface.targets_on(60), vec![second]);
        assert_eq!(store.dropped.lock().as_slice(), &[(1, 50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_surface_is_no_longer_rendered() {
        let store = FakeStore::new(DisplayMode::Resend);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        scheduler.show(1, 50).await.unwrap();
        scheduler.show(1, 60).await.unwrap();

        scheduler.drop_surface(50).await;
        store.push_member(10);
        scheduler.touch(1);
        settle().await;

        assert_eq!(store.dropped.lock().as_slice(), &[(1, 50)]);
        assert_eq!(surface.targets_on(50).len(), 1);
        assert_eq!(surface.targets_on(60).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_deletes_targets() {
        let store = FakeStore::new(DisplayMode::Edit);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store, surface.clone());
        scheduler.show(1, 50).await.unwrap();

        scheduler.forget(1).await;

        assert!(!scheduler.is_displayed(1));
        assert!(surface.targets_on(50).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_keeps_existing_displays() {
        let store = FakeStore::new(DisplayMode::Resend);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        scheduler.show(1, 50).await.unwrap();
        scheduler.show(1, 60).await.unwrap();

        *store.fail_saves.lock() = true;
        assert!(scheduler.show(1, 70).await.is_err());
        *store.fail_saves.lock() = false;
        // the unsaved target is cleaned up
        assert!(surface.targets_on(70).is_empty());

        store.push_member(10);
        scheduler.touch(1);
        settle().await;

        assert_eq!(surface.targets_on(50).len(), 2);
        assert_eq!(surface.targets_on(60).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn collapse_keeps_the_newest_target() {
        let store = FakeStore::new(DisplayMode::Resend);
        let surface = Arc::new(LocalSurface::new());
        let scheduler = scheduler(store.clone(), surface.clone());
        scheduler.show(1, 50).await.unwrap();
        let newest = scheduler.show(1, 60).await.unwrap();

        scheduler.collapse(1).await;

        assert!(surface.targets_on(50).is_empty());
        assert_eq!(surface.targets_on(60), vec![newest]);
        assert_eq!(store.dropped.lock().as_slice(), &[(1, 50)]);
    }
}
