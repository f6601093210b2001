//! Coalescing rerender scheduler.
//!
//! A rerender request against a page that is not in a stable `RENDERED`
//! state is remembered as a single intent instead of being run. Whoever
//! finishes the in-flight render drains that intent, so any burst of requests
//! during one render produces at most one extra render cycle.

use crate::metrics::TransitionMetrics;
use crate::phase;
use pageflow_core::application::Application;
use pageflow_core::context::PageContext;
use pageflow_core::error::{Phase, TransitionError};
use pageflow_core::page::PageHandle;
use pageflow_core::state::{PageFlag, RENDERED, RENDERING};
use std::sync::{Arc, Mutex, PoisonError};

/// What a rerender request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerenderOutcome {
    /// No page is live, or there is no request context to render with
    NoPage,
    /// A render is in flight; the request was folded into the pending intent
    Coalesced,
    /// The live page rendered `cycles` times, counting drained intents
    Rendered {
        /// Number of render cycles run by this request
        cycles: usize,
    },
}

impl RerenderOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NoPage => "no_page",
            Self::Coalesced => "coalesced",
            Self::Rendered { .. } => "rendered",
        }
    }
}

/// Re-runs `render` on the live page of an application.
pub struct RerenderScheduler {
    app: Arc<Application>,
    intent: Mutex<Option<PageHandle>>,
}

impl RerenderScheduler {
    /// Create a scheduler for `app`.
    #[must_use]
    pub fn new(app: Arc<Application>) -> Self {
        Self {
            app,
            intent: Mutex::new(None),
        }
    }

    /// Request a rerender of the live page.
    ///
    /// If the live page is `RENDERED` it is rendered again right away, and any
    /// intent recorded meanwhile is drained before returning. Otherwise the
    /// request is stored as the intent, replacing an older one.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed render cycle. The page is left
    /// `RENDERED` if it is still live, and no further cycles run.
    pub async fn rerender(&self) -> Result<RerenderOutcome, TransitionError> {
        let outcome = self.request().await;
        match &outcome {
            Ok(outcome) => TransitionMetrics::record_rerender(outcome.as_str()),
            Err(_) => TransitionMetrics::record_rerender("failed"),
        }
        outcome
    }

    async fn request(&self) -> Result<RerenderOutcome, TransitionError> {
        let (Some(page), Some(ctx)) = (self.app.page(), self.app.current_context()) else {
            return Ok(RerenderOutcome::NoPage);
        };

        if !page.append_state_if(|state| state.has(PageFlag::Rendered), &[-RENDERED, RENDERING]) {
            tracing::debug!(page = page.id(), state = %page.state(), "rerender coalesced");
            *self.lock_intent() = Some(page);
            return Ok(RerenderOutcome::Coalesced);
        }

        let cycles = self.render_cycles(&page, ctx).await?;
        Ok(RerenderOutcome::Rendered { cycles })
    }

    /// Run the intent recorded for `page` while it was rendering, if any.
    ///
    /// Returns the number of render cycles run.
    pub(crate) async fn drain(&self, page: &PageHandle) -> Result<usize, TransitionError> {
        let Some(ctx) = self.app.current_context() else {
            return Ok(0);
        };
        if !self.take_intent_for(page) {
            return Ok(0);
        }
        page.append_state(&[-RENDERED, RENDERING]);
        self.render_cycles(page, ctx).await
    }

    /// The page the pending intent targets.
    #[must_use]
    pub fn pending_intent(&self) -> Option<PageHandle> {
        self.lock_intent().clone()
    }

    /// Drop the pending intent.
    pub fn clear(&self) {
        *self.lock_intent() = None;
    }

    // Expects `page` to be RENDERING already. A page that stopped being live
    // mid-render may have been unwound, so it is not marked RENDERED again.
    async fn render_cycles(
        &self,
        page: &PageHandle,
        mut ctx: PageContext,
    ) -> Result<usize, TransitionError> {
        let mut cycles = 0;
        loop {
            let timings = ctx.response().timings();
            timings.time("rerender");
            let rendered = phase::run(page, Phase::Render, &ctx).await;
            timings.time("rerender");
            if self.is_live(page) {
                page.append_state(&[-RENDERING, RENDERED]);
            } else {
                page.append_state(&[-RENDERING]);
                tracing::debug!(page = page.id(), state = %page.state(), "page left during rerender");
            }
            rendered?;
            cycles += 1;

            if !self.take_intent_for(page) {
                return Ok(cycles);
            }
            page.append_state(&[-RENDERED, RENDERING]);
            if let Some(latest) = self.app.current_context() {
                ctx = latest;
            }
        }
    }

    /// Consume the intent if it targets `page`.
    ///
    /// An intent for a page that is no longer live is discarded; an intent for
    /// another page is left alone.
    fn take_intent_for(&self, page: &PageHandle) -> bool {
        let mut intent = self.lock_intent();
        if !intent.as_ref().is_some_and(|target| target.same_page(page)) {
            return false;
        }
        *intent = None;
        drop(intent);

        let live = self.is_live(page);
        if !live {
            tracing::debug!(page = page.id(), "stale rerender intent discarded");
            TransitionMetrics::record_rerender("discarded");
        }
        live
    }

    fn is_live(&self, page: &PageHandle) -> bool {
        self.app.page().is_some_and(|live| live.same_page(page))
    }

    fn lock_intent(&self) -> std::sync::MutexGuard<'_, Option<PageHandle>> {
        self.intent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RerenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerenderScheduler")
            .field("app", &self.app.id())
            .field("intent", &self.pending_intent().map(|page| page.id().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pageflow_core::context::Request;
    use pageflow_core::page::BasePage;
    use pageflow_core::state::{HANDLED, INITED, PageState};

    fn live_app(page: &PageHandle) -> Arc<Application> {
        let app = Arc::new(Application::new("site"));
        app.set_current_context(PageContext::new(Request::new("/")));
        app.set_page(Some(page.clone()));
        app
    }

    #[tokio::test]
    async fn test_no_live_page() {
        let scheduler = RerenderScheduler::new(Arc::new(Application::new("site")));
        assert_eq!(scheduler.rerender().await.unwrap(), RerenderOutcome::NoPage);
    }

    #[tokio::test]
    async fn test_rendered_page_renders_again() {
        let page = PageHandle::new("home", BasePage);
        page.append_state(&[INITED, HANDLED, RENDERED]);
        let scheduler = RerenderScheduler::new(live_app(&page));

        let outcome = scheduler.rerender().await.unwrap();

        assert_eq!(outcome, RerenderOutcome::Rendered { cycles: 1 });
        assert_eq!(
            page.state(),
            PageState::of(&[PageFlag::Inited, PageFlag::Handled, PageFlag::Rendered])
        );
    }

    #[tokio::test]
    async fn test_unrendered_page_records_intent() {
        let page = PageHandle::new("home", BasePage);
        page.append_state(&[INITED, HANDLED, RENDERING]);
        let scheduler = RerenderScheduler::new(live_app(&page));

        assert_eq!(scheduler.rerender().await.unwrap(), RerenderOutcome::Coalesced);
        assert_eq!(scheduler.rerender().await.unwrap(), RerenderOutcome::Coalesced);
        assert_eq!(scheduler.pending_intent(), Some(page.clone()));

        page.append_state(&[-RENDERING, RENDERED]);
        assert_eq!(scheduler.drain(&page).await.unwrap(), 1);
        assert!(scheduler.pending_intent().is_none());
    }

    #[tokio::test]
    async fn test_intent_for_replaced_page_is_discarded() {
        let page = PageHandle::new("home", BasePage);
        page.append_state(&[INITED, HANDLED, RENDERING]);
        let app = live_app(&page);
        let scheduler = RerenderScheduler::new(Arc::clone(&app));

        scheduler.rerender().await.unwrap();
        app.set_page(Some(PageHandle::new("about", BasePage)));
        page.append_state(&[-RENDERING, RENDERED]);

        assert_eq!(scheduler.drain(&page).await.unwrap(), 0);
        assert!(scheduler.pending_intent().is_none());
    }

    #[tokio::test]
    async fn test_page_replaced_during_render_is_not_marked_rendered() {
        let page = PageHandle::new("home", BasePage);
        page.append_state(&[INITED, HANDLED, RENDERING]);
        let app = live_app(&page);
        let scheduler = RerenderScheduler::new(Arc::clone(&app));
        app.set_page(None);

        let ctx = PageContext::new(Request::new("/"));
        assert_eq!(scheduler.render_cycles(&page, ctx).await.unwrap(), 1);
        assert_eq!(
            page.state(),
            PageState::of(&[PageFlag::Inited, PageFlag::Handled])
        );
    }

    #[tokio::test]
    async fn test_intent_for_other_page_is_kept() {
        let page = PageHandle::new("home", BasePage);
        let other = PageHandle::new("about", BasePage);
        page.append_state(&[INITED, HANDLED, RENDERED]);
        let scheduler = RerenderScheduler::new(live_app(&page));
        *scheduler.lock_intent() = Some(other.clone());

        assert_eq!(scheduler.drain(&page).await.unwrap(), 0);
        assert_eq!(scheduler.pending_intent(), Some(other));
    }
}
