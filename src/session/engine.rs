use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::mpsc;

use super::scheduler::{ScheduledTask, Scheduler, TickFn, TickFuture, TokioScheduler};
use super::state::{FeedSession, LoadState};
use crate::feed::{FeedError, FeedSource, PageRequest};

// ============================================================================
// Settings & Events
// ============================================================================

/// Page sizes and timer intervals for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: usize,
    /// Items fetched by each poll tick. Polling never re-pages the feed.
    pub poll_page_size: usize,
    pub poll_interval: Duration,
    pub backfill_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 25,
            poll_page_size: 5,
            poll_interval: Duration::from_secs(60),
            backfill_interval: Duration::from_secs(300),
        }
    }
}

/// Notifications emitted after the session's article list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The first page replaced the list.
    FirstPageLoaded { url: String, articles: usize },
    /// An older page was appended.
    PageAppended { url: String, added: usize, has_more: bool },
    /// A poll prepended articles not seen before.
    NewArticles { url: String, count: usize },
}

/// What happened to a single load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result was applied; carries the number of articles added.
    Loaded(usize),
    /// Nothing was requested (no more pages, already in flight, or hidden).
    Skipped,
    /// The result arrived after the session moved on and was dropped.
    Discarded,
    /// A background load failed. The error was logged and the list kept.
    Failed,
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner<S> {
    source: S,
    settings: SyncSettings,
    session: Mutex<FeedSession>,
    visible: AtomicBool,
    poll_in_flight: AtomicBool,
    backfill_in_flight: AtomicBool,
    poll_task: Mutex<Option<ScheduledTask>>,
    backfill_task: Mutex<Option<ScheduledTask>>,
    scheduler: Arc<dyn Scheduler>,
    events: Option<mpsc::Sender<SessionEvent>>,
}

/// Drives one [`FeedSession`]: initial load, "load more", polling for new
/// posts and background backfill of older ones.
///
/// Cloning is cheap and clones share the same session. Every load captures
/// the session generation before awaiting and re-checks it afterwards, so a
/// result that arrives after `load_feed` switched URL (or reloaded) is
/// dropped rather than applied.
pub struct FeedEngine<S: FeedSource> {
    inner: Arc<EngineInner<S>>,
}

impl<S: FeedSource> Clone for FeedEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Clears an in-flight flag when the tick finishes, however it finishes.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: FeedSource> FeedEngine<S> {
    pub fn new(source: S, settings: SyncSettings) -> Self {
        Self::with_scheduler(source, settings, Arc::new(TokioScheduler), None)
    }

    pub fn with_scheduler(
        source: S,
        settings: SyncSettings,
        scheduler: Arc<dyn Scheduler>,
        events: Option<mpsc::Sender<SessionEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                source,
                settings,
                session: Mutex::new(FeedSession::new(String::new(), settings.page_size)),
                visible: AtomicBool::new(true),
                poll_in_flight: AtomicBool::new(false),
                backfill_in_flight: AtomicBool::new(false),
                poll_task: Mutex::new(None),
                backfill_task: Mutex::new(None),
                scheduler,
                events,
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, FeedSession> {
        self.inner.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> SyncSettings {
        self.inner.settings
    }

    /// A copy of the current session state.
    pub fn snapshot(&self) -> FeedSession {
        self.session().clone()
    }

    /// Tells the engine whether the consuming view is on screen. Poll and
    /// backfill ticks do nothing while hidden.
    pub fn set_visible(&self, visible: bool) {
        self.inner.visible.store(visible, Ordering::Release);
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::Acquire)
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.inner.events {
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Session event send failed (receiver dropped)");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Foreground loads
    // ------------------------------------------------------------------------

    /// Loads the first page of `url`, replacing the article list.
    ///
    /// Switching to a different URL resets the session; loading the same URL
    /// again is a refresh. Both invalidate every load still in flight.
    ///
    /// # Errors
    ///
    /// Fetch and parse errors are returned and leave the session in
    /// [`LoadState::Failed`]. A stale failure is returned as
    /// [`LoadOutcome::Discarded`] instead.
    pub async fn load_feed(&self, url: &str) -> Result<LoadOutcome, FeedError> {
        let (generation, request) = {
            let mut session = self.session();
            if session.url() != url {
                session.switch_to(url);
            }
            session.begin_first_load()
        };

        tracing::debug!(feed = %url, generation, "Loading first page");
        let result = self.inner.source.load_page(url, request).await;

        let articles = {
            let mut session = self.session();
            if session.generation() != generation {
                tracing::debug!(
                    feed = %url,
                    generation,
                    current = session.generation(),
                    "Ignoring stale first page (generation mismatch)"
                );
                return Ok(LoadOutcome::Discarded);
            }
            match result {
                Ok(page) => {
                    session.apply_first_page(&page);
                    page.articles.len()
                }
                Err(e) => {
                    tracing::warn!(feed = %url, error = %e, "Initial feed load failed");
                    session.fail_first_load(&e);
                    return Err(e);
                }
            }
        };

        self.emit(SessionEvent::FirstPageLoaded {
            url: url.to_string(),
            articles,
        })
        .await;
        Ok(LoadOutcome::Loaded(articles))
    }

    /// Appends the next page, if the feed has one and no page load is
    /// already running. A second call while one is outstanding is dropped.
    ///
    /// # Errors
    ///
    /// Fetch and parse errors are returned; the cursor is left where it was.
    pub async fn load_more(&self) -> Result<LoadOutcome, FeedError> {
        let (generation, url, request) = {
            let mut session = self.session();
            match session.begin_next_page() {
                Some(request) => (session.generation(), session.url().to_string(), request),
                None => return Ok(LoadOutcome::Skipped),
            }
        };

        tracing::debug!(feed = %url, start_index = request.start_index, "Loading next page");
        let result = self.inner.source.load_page(&url, request).await;

        let (added, has_more) = {
            let mut session = self.session();
            if session.generation() != generation {
                tracing::debug!(feed = %url, generation, "Ignoring stale page (generation mismatch)");
                return Ok(LoadOutcome::Discarded);
            }
            match result {
                Ok(page) => (session.apply_next_page(&page), session.has_more()),
                Err(e) => {
                    session.abort_next_page();
                    return Err(e);
                }
            }
        };

        self.emit(SessionEvent::PageAppended {
            url,
            added,
            has_more,
        })
        .await;
        Ok(LoadOutcome::Loaded(added))
    }

    // ------------------------------------------------------------------------
    // Background ticks
    // ------------------------------------------------------------------------

    /// One poll: fetch the newest few items and prepend any not seen yet.
    ///
    /// Skipped while hidden, while a previous poll is still running, or
    /// before the first page has loaded. Errors are logged, never returned.
    pub async fn poll_once(&self) -> LoadOutcome {
        if !self.is_visible() {
            return LoadOutcome::Skipped;
        }
        let Some(_guard) = InFlightGuard::acquire(&self.inner.poll_in_flight) else {
            tracing::trace!("Poll still in flight, skipping tick");
            return LoadOutcome::Skipped;
        };

        let (generation, url) = {
            let session = self.session();
            if session.state() != &LoadState::Loaded {
                return LoadOutcome::Skipped;
            }
            (session.generation(), session.url().to_string())
        };

        let request = PageRequest::first(self.inner.settings.poll_page_size);
        let page = match self.inner.source.load_page(&url, request).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Poll failed");
                return LoadOutcome::Failed;
            }
        };

        let count = {
            let mut session = self.session();
            if session.generation() != generation {
                tracing::debug!(feed = %url, generation, "Ignoring stale poll (generation mismatch)");
                return LoadOutcome::Discarded;
            }
            session.merge_polled(&page.articles)
        };

        if count > 0 {
            tracing::info!(feed = %url, count, "New articles discovered");
            self.emit(SessionEvent::NewArticles { url, count }).await;
        }
        LoadOutcome::Loaded(count)
    }

    /// One backfill step: the same path as [`load_more`](Self::load_more),
    /// gated on visibility and its own in-flight flag. Errors are logged.
    pub async fn backfill_once(&self) -> LoadOutcome {
        if !self.is_visible() {
            return LoadOutcome::Skipped;
        }
        let Some(_guard) = InFlightGuard::acquire(&self.inner.backfill_in_flight) else {
            return LoadOutcome::Skipped;
        };

        match self.load_more().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let url = self.session().url().to_string();
                tracing::warn!(feed = %url, error = %e, "Backfill failed");
                LoadOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    /// Starts polling every `poll_interval`. Restarting replaces the timer.
    pub fn start_polling(&self) {
        let tick = self.tick_fn(|engine| async move {
            engine.poll_once().await;
        });
        let task = self
            .inner
            .scheduler
            .schedule_periodic("poll", self.inner.settings.poll_interval, tick);
        *lock_task(&self.inner.poll_task) = Some(task);
    }

    pub fn stop_polling(&self) {
        if let Some(task) = lock_task(&self.inner.poll_task).take() {
            task.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        lock_task(&self.inner.poll_task).is_some()
    }

    /// Starts backfilling every `backfill_interval`. Restarting replaces the timer.
    pub fn start_backfill(&self) {
        let tick = self.tick_fn(|engine| async move {
            engine.backfill_once().await;
        });
        let task = self.inner.scheduler.schedule_periodic(
            "backfill",
            self.inner.settings.backfill_interval,
            tick,
        );
        *lock_task(&self.inner.backfill_task) = Some(task);
    }

    pub fn stop_backfill(&self) {
        if let Some(task) = lock_task(&self.inner.backfill_task).take() {
            task.cancel();
        }
    }

    pub fn is_backfilling(&self) -> bool {
        lock_task(&self.inner.backfill_task).is_some()
    }

    /// Wraps `body` for the scheduler. The timer holds only a weak
    /// reference, so dropping the last engine handle stops it.
    fn tick_fn<F, Fut>(&self, body: F) -> TickFn
    where
        F: Fn(FeedEngine<S>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let weak: Weak<EngineInner<S>> = Arc::downgrade(&self.inner);
        let body = Arc::new(body);
        Box::new(move || -> TickFuture {
            let weak = weak.clone();
            let body = Arc::clone(&body);
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    body(FeedEngine { inner }).await;
                }
            })
        })
    }
}

fn lock_task(slot: &Mutex<Option<ScheduledTask>>) -> MutexGuard<'_, Option<ScheduledTask>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
