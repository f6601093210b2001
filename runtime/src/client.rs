//! Client-side transition runner.
//!
//! A long-lived application swaps pages as the user navigates. Navigating to
//! page B while page A is current unwinds A (`unrender`, `unhandle`) while B
//! runs `init`; once both finish, B is activated and runs `handle` then
//! `render`.
//!
//! Navigations may overlap. The runner keeps two slots: `current`, the page
//! whose lifecycle has been entered, and `pending`, the page most recently
//! navigated to that has not been activated yet. Every suspension point is
//! followed by a check against those slots, so an outdated transition stops
//! silently as soon as it notices a newer navigation has replaced it.
//!
//! # Example
//!
//! ```
//! use pageflow_core::application::Application;
//! use pageflow_core::context::Request;
//! use pageflow_core::page::{BasePage, PageHandle};
//! use pageflow_runtime::client::{ClientRunner, NavigationOutcome};
//! use pageflow_runtime::config::TransitionConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), pageflow_core::error::TransitionError> {
//! let app = Arc::new(Application::new("site"));
//! let runner = ClientRunner::new(Arc::clone(&app), TransitionConfig::default());
//!
//! let home = PageHandle::new("home", BasePage);
//! let outcome = runner.navigate(home.clone(), Request::new("/")).await?;
//!
//! assert_eq!(outcome, NavigationOutcome::Rendered);
//! assert_eq!(app.page(), Some(home));
//! # Ok(())
//! # }
//! ```

use crate::config::TransitionConfig;
use crate::metrics::TransitionMetrics;
use crate::phase;
use crate::rerender::{RerenderOutcome, RerenderScheduler};
use pageflow_core::application::Application;
use pageflow_core::context::{FlushFuture, FlushHook, PageContext, Request, RequestId};
use pageflow_core::error::{PageError, Phase, TransitionError};
use pageflow_core::page::PageHandle;
use pageflow_core::state::{
    HANDLED, HANDLING, INITED, INITING, PageFlag, RENDERED, RENDERING, UNHANDLED, UNHANDLING,
    UNRENDERED, UNRENDERING,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

/// How a navigation ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The page was activated, handled, and rendered
    Rendered,
    /// A newer navigation replaced this one before it finished
    Superseded,
    /// The page was still pending but its state did not allow activation
    Declined,
}

impl NavigationOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::Superseded => "superseded",
            Self::Declined => "declined",
        }
    }
}

/// Future returned by [`ClientRunner::navigate`].
pub type Navigation =
    Pin<Box<dyn Future<Output = Result<NavigationOutcome, TransitionError>> + Send + 'static>>;

#[derive(Default)]
struct Slots {
    current: Option<PageHandle>,
    pending: Option<PageHandle>,
    // Left behind by navigations dropped before they finished unwinding
    abandoned: Vec<PageHandle>,
}

/// Pages one navigation took out of the slots to unwind.
///
/// Dropping it before [`Unwinding::finish`] hands the pages back to the
/// runner, and the next navigation unwinds them.
struct Unwinding {
    runner: Weak<ClientInner>,
    pages: Vec<PageHandle>,
    finished: AtomicBool,
}

impl Unwinding {
    fn new(runner: &Arc<ClientInner>, pages: Vec<PageHandle>) -> Self {
        Self {
            runner: Arc::downgrade(runner),
            pages,
            finished: AtomicBool::new(false),
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

impl Drop for Unwinding {
    fn drop(&mut self) {
        if *self.finished.get_mut() || self.pages.is_empty() {
            return;
        }
        let Some(runner) = self.runner.upgrade() else {
            return;
        };
        tracing::debug!(
            pages = self.pages.len(),
            "navigation dropped before unwinding, handing pages to the next one"
        );
        runner.lock_slots().abandoned.append(&mut self.pages);
    }
}

struct ClientInner {
    app: Arc<Application>,
    config: TransitionConfig,
    slots: Mutex<Slots>,
    rerender: RerenderScheduler,
}

/// Runs page transitions for one client application.
///
/// Cloning is cheap; clones drive the same slots.
#[derive(Clone)]
pub struct ClientRunner {
    inner: Arc<ClientInner>,
}

impl ClientRunner {
    /// Create a runner for `app`.
    #[must_use]
    pub fn new(app: Arc<Application>, config: TransitionConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                rerender: RerenderScheduler::new(Arc::clone(&app)),
                app,
                config,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// The application this runner drives.
    #[must_use]
    pub fn app(&self) -> &Arc<Application> {
        &self.inner.app
    }

    /// The runner configuration.
    #[must_use]
    pub fn config(&self) -> &TransitionConfig {
        &self.inner.config
    }

    /// Navigate to `page` for `request`.
    ///
    /// The slots are updated before this returns: `page` becomes pending, the
    /// current page is taken for unwinding, and no page is live until `page`
    /// is activated. Calling order therefore decides which navigation is the
    /// most recent, regardless of when the returned futures are polled.
    ///
    /// The transition is then driven up to its first suspension, so phases
    /// that complete without waiting have already run when this returns. A
    /// page whose lifecycle never suspends is rendered before the next
    /// navigation can replace it.
    ///
    /// The returned future runs the rest of the transition. It resolves to
    /// [`NavigationOutcome::Superseded`] if a later navigation overtook it.
    /// Dropping it does not strand the previous page: whatever it had not
    /// finished unwinding is unwound by the next navigation.
    ///
    /// # Errors
    ///
    /// The future fails with the first lifecycle error of the transition.
    /// An unwind error is reported even if the navigation was superseded.
    pub fn navigate(&self, page: PageHandle, request: Request) -> Navigation {
        let request = request.with_id(RequestId::new(self.inner.app.uid()));
        let hook = Arc::new(PartialRender {
            runner: Arc::downgrade(&self.inner),
        });
        let ctx = PageContext::new(request).with_flush_hook(hook);

        let unwinding = Unwinding::new(&self.inner, self.inner.begin(&page));
        self.inner.app.set_current_context(ctx.clone());

        let inner = Arc::clone(&self.inner);
        let mut navigation: Navigation =
            Box::pin(async move { inner.change_page(&unwinding, &page, &ctx).await });

        // Leaf futures re-register their waker when the caller polls again.
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match navigation.as_mut().poll(&mut cx) {
            Poll::Ready(outcome) => Box::pin(futures::future::ready(outcome)),
            Poll::Pending => navigation,
        }
    }

    /// Navigate to the page registered under `id`.
    ///
    /// Returns `None` if no such page is registered.
    pub fn navigate_to(&self, id: &str, request: Request) -> Option<Navigation> {
        let page = self.inner.app.registered_page(id)?;
        Some(self.navigate(page, request))
    }

    /// Render the live page while its `handle` is still running.
    ///
    /// Does nothing and resolves to `Ok(false)` unless the live page is
    /// `INITED|HANDLING` under the configured guard mode.
    ///
    /// # Errors
    ///
    /// Returns the page's render error.
    pub async fn flush(&self) -> Result<bool, PageError> {
        self.inner.flush().await
    }

    /// Request a rerender of the live page.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed render cycle.
    pub async fn rerender(&self) -> Result<RerenderOutcome, TransitionError> {
        self.inner.rerender.rerender().await
    }

    /// The rerender scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &RerenderScheduler {
        &self.inner.rerender
    }

    /// The current page, whose lifecycle has been entered.
    #[must_use]
    pub fn current(&self) -> Option<PageHandle> {
        self.inner.lock_slots().current.clone()
    }

    /// The pending page, navigated to but not activated yet.
    #[must_use]
    pub fn pending(&self) -> Option<PageHandle> {
        self.inner.lock_slots().pending.clone()
    }

    /// Forget every page, including abandoned ones, and the rerender intent.
    ///
    /// Transitions still in flight will find themselves superseded.
    pub fn reset(&self) {
        *self.inner.lock_slots() = Slots::default();
        self.inner.app.set_page(None);
        self.inner.rerender.clear();
    }
}

impl std::fmt::Debug for ClientRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.inner.lock_slots();
        f.debug_struct("ClientRunner")
            .field("app", &self.inner.app.id())
            .field("current", &slots.current)
            .field("pending", &slots.pending)
            .field("abandoned", &slots.abandoned.len())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    fn begin(&self, page: &PageHandle) -> Vec<PageHandle> {
        let previous = {
            let mut slots = self.lock_slots();
            slots.pending = Some(page.clone());
            let mut previous: Vec<PageHandle> = slots.current.take().into_iter().collect();
            previous.append(&mut slots.abandoned);
            previous.retain(|other| !other.same_page(page));
            previous
        };
        self.app.set_page(None);
        previous
    }

    #[tracing::instrument(skip_all, name = "change_page", fields(page = page.id(), unwinding = unwinding.pages.len()))]
    async fn change_page(
        &self,
        unwinding: &Unwinding,
        page: &PageHandle,
        ctx: &PageContext,
    ) -> Result<NavigationOutcome, TransitionError> {
        let result = self.transition(unwinding, page, ctx).await;
        match &result {
            Ok(outcome) => {
                tracing::debug!(outcome = outcome.as_str(), state = %page.state(), "navigation finished");
                TransitionMetrics::record_outcome("client", outcome.as_str());
            }
            Err(error) => {
                tracing::debug!(%error, "navigation failed");
                TransitionMetrics::record_outcome("client", "failed");
            }
        }
        result
    }

    async fn transition(
        &self,
        unwinding: &Unwinding,
        page: &PageHandle,
        ctx: &PageContext,
    ) -> Result<NavigationOutcome, TransitionError> {
        let unwind = async {
            let unwinds = unwinding.pages.iter().map(|previous| self.unwind(previous, ctx));
            let results = futures::future::join_all(unwinds).await;
            unwinding.finish();
            results.into_iter().collect::<Result<(), _>>()
        };
        let init = async {
            page.reset_state();
            page.append_state(&[INITING]);
            let inited = phase::run(page, Phase::Init, ctx).await;
            page.append_state(&[-INITING, INITED]);
            inited
        };

        let (unwound, inited) = futures::join!(unwind, init);
        unwound?;
        if !self.is_pending(page) {
            return Ok(NavigationOutcome::Superseded);
        }
        inited?;

        self.activate(page, ctx).await
    }

    // Restartable: RENDERED and HANDLED are only cleared once their phase ends.
    async fn unwind(&self, page: &PageHandle, ctx: &PageContext) -> Result<(), TransitionError> {
        if page.contains_state(&[RENDERED]) {
            page.append_state(&[UNRENDERING]);
            let unrendered = phase::run(page, Phase::Unrender, ctx).await;
            page.append_state(&[-UNRENDERING, -RENDERED, UNRENDERED]);
            unrendered?;
        }

        page.append_state(&[UNHANDLING]);
        let unhandled = phase::run(page, Phase::Unhandle, ctx).await;
        page.append_state(&[-UNHANDLING, -HANDLED, UNHANDLED]);
        unhandled
    }

    async fn activate(
        &self,
        page: &PageHandle,
        ctx: &PageContext,
    ) -> Result<NavigationOutcome, TransitionError> {
        {
            let mut slots = self.lock_slots();
            if !slots.pending.as_ref().is_some_and(|pending| pending.same_page(page)) {
                return Ok(NavigationOutcome::Superseded);
            }
            if !page
                .state()
                .satisfies(PageFlag::Inited.into(), self.config.guard)
            {
                tracing::debug!(state = %page.state(), "activation declined");
                return Ok(NavigationOutcome::Declined);
            }
            slots.current = Some(page.clone());
            slots.pending = None;
        }
        self.app.set_page(Some(page.clone()));

        page.append_state(&[HANDLING]);
        let handled = phase::run(page, Phase::Handle, ctx).await;
        page.append_state(&[-HANDLING]);
        handled?;

        if !self.is_current(page) {
            return Ok(NavigationOutcome::Superseded);
        }

        page.append_state(&[HANDLED, RENDERING]);
        let rendered = phase::run(page, Phase::Render, ctx).await;
        page.append_state(&[-RENDERING, RENDERED]);
        rendered?;

        match self.rerender.drain(page).await {
            Ok(0) => {}
            Ok(cycles) => tracing::debug!(cycles, "drained rerender intent"),
            Err(error) => tracing::warn!(%error, "rerender after navigation failed"),
        }
        Ok(NavigationOutcome::Rendered)
    }

    async fn flush(&self) -> Result<bool, PageError> {
        let (Some(page), Some(ctx)) = (self.app.page(), self.app.current_context()) else {
            return Ok(false);
        };
        let guard = self.config.guard;
        if !page.append_state_if(
            |state| state.satisfies(PageFlag::Inited | PageFlag::Handling, guard),
            &[RENDERING],
        ) {
            tracing::debug!(page = page.id(), state = %page.state(), "flush ignored");
            return Ok(false);
        }

        let timings = ctx.response().timings();
        timings.time("write");
        let rendered = phase::run(&page, Phase::Render, &ctx).await;
        timings.time("write");
        page.append_state(&[-RENDERING]);
        TransitionMetrics::record_partial_render();

        rendered.map(|()| true).map_err(|error| error.source)
    }

    fn is_pending(&self, page: &PageHandle) -> bool {
        self.lock_slots()
            .pending
            .as_ref()
            .is_some_and(|pending| pending.same_page(page))
    }

    fn is_current(&self, page: &PageHandle) -> bool {
        let slots = self.lock_slots();
        slots.pending.is_none()
            && slots
                .current
                .as_ref()
                .is_some_and(|current| current.same_page(page))
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Flush hook installed on client request contexts.
struct PartialRender {
    runner: Weak<ClientInner>,
}

impl FlushHook for PartialRender {
    fn flush(&self) -> FlushFuture<'_> {
        Box::pin(async move {
            match self.runner.upgrade() {
                Some(inner) => inner.flush().await,
                None => Ok(false),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pageflow_core::page::BasePage;
    use pageflow_core::state::PageState;
    use pageflow_testing::{CallLog, ScriptedPage};
    use std::time::Duration;

    fn runner() -> ClientRunner {
        ClientRunner::new(Arc::new(Application::new("site")), TransitionConfig::default())
    }

    #[tokio::test]
    async fn test_first_navigation_renders() {
        let runner = runner();
        let home = PageHandle::new("home", BasePage);

        let outcome = runner.navigate(home.clone(), Request::new("/")).await.unwrap();

        assert_eq!(outcome, NavigationOutcome::Rendered);
        assert_eq!(
            home.state(),
            PageState::of(&[PageFlag::Inited, PageFlag::Handled, PageFlag::Rendered])
        );
        assert_eq!(runner.current(), Some(home.clone()));
        assert!(runner.pending().is_none());
        assert_eq!(runner.app().page(), Some(home));
    }

    #[tokio::test]
    async fn test_navigation_unwinds_previous_page() {
        let runner = runner();
        let home = PageHandle::new("home", BasePage);
        let about = PageHandle::new("about", BasePage);

        runner.navigate(home.clone(), Request::new("/")).await.unwrap();
        runner.navigate(about.clone(), Request::new("/about")).await.unwrap();

        assert_eq!(
            home.state(),
            PageState::of(&[PageFlag::Inited, PageFlag::Unrendered, PageFlag::Unhandled])
        );
        assert_eq!(runner.current(), Some(about));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_swap_at_call_time() {
        let log = CallLog::new();
        let runner = runner();
        let home = PageHandle::new("home", BasePage);
        runner.navigate(home.clone(), Request::new("/")).await.unwrap();

        let about = ScriptedPage::new("about", &log)
            .delay(Phase::Init, Duration::from_millis(10))
            .into_handle();
        let navigation = runner.navigate(about.clone(), Request::new("/about"));

        assert!(runner.current().is_none());
        assert_eq!(runner.pending(), Some(about.clone()));
        assert!(runner.app().page().is_none());
        assert!(about.state().has(PageFlag::Initing));

        assert_eq!(navigation.await.unwrap(), NavigationOutcome::Rendered);
        assert_eq!(runner.current(), Some(about));
    }

    #[tokio::test]
    async fn test_synchronous_page_renders_before_navigate_returns() {
        let runner = runner();
        let home = PageHandle::new("home", BasePage);

        let navigation = runner.navigate(home.clone(), Request::new("/"));

        assert_eq!(runner.current(), Some(home.clone()));
        assert!(home.state().has(PageFlag::Rendered));
        assert_eq!(navigation.await.unwrap(), NavigationOutcome::Rendered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_navigation_hands_back_unfinished_unwind() {
        let log = CallLog::new();
        let runner = runner();
        let home = ScriptedPage::new("home", &log)
            .delay(Phase::Unrender, Duration::from_millis(10))
            .into_handle();
        runner.navigate(home.clone(), Request::new("/")).await.unwrap();

        drop(runner.navigate(PageHandle::new("about", BasePage), Request::new("/about")));

        assert_eq!(runner.inner.lock_slots().abandoned, vec![home.clone()]);
        assert!(runner.current().is_none());

        runner.reset();
        assert!(runner.inner.lock_slots().abandoned.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_navigation_after_unwind_hands_back_nothing() {
        let runner = runner();
        let home = PageHandle::new("home", BasePage);
        runner.navigate(home.clone(), Request::new("/")).await.unwrap();

        drop(runner.navigate(PageHandle::new("about", BasePage), Request::new("/about")));

        assert!(runner.inner.lock_slots().abandoned.is_empty());
        assert!(home.state().has(PageFlag::Unhandled));
    }

    #[tokio::test]
    async fn test_request_id_is_application_uid() {
        let runner = runner();
        let home = PageHandle::new("home", BasePage);
        runner.navigate(home, Request::new("/")).await.unwrap();

        let ctx = runner.app().current_context().unwrap();
        assert_eq!(ctx.request().id().as_str(), runner.app().uid());
    }

    #[tokio::test]
    async fn test_navigate_to_registered_page() {
        let runner = runner();
        let home = runner
            .app()
            .register_page("home", pageflow_core::page::PageOptions::default(), BasePage);

        let navigation = runner.navigate_to("home", Request::new("/")).unwrap();
        assert_eq!(navigation.await.unwrap(), NavigationOutcome::Rendered);
        assert_eq!(runner.current(), Some(home));
        assert!(runner.navigate_to("missing", Request::new("/missing")).is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_slots() {
        let runner = runner();
        runner
            .navigate(PageHandle::new("home", BasePage), Request::new("/"))
            .await
            .unwrap();

        runner.reset();

        assert!(runner.current().is_none());
        assert!(runner.pending().is_none());
        assert!(runner.app().page().is_none());
    }

    #[tokio::test]
    async fn test_flush_without_live_page() {
        assert!(!runner().flush().await.unwrap());
    }
}
