//! Server-side transition runner.
//!
//! Drives one request-scoped page through `init → handle → render` exactly
//! once. Any phase error aborts the remaining phases and is returned to the
//! request pipeline; no cleanup is attempted since the page is discarded with
//! the request.

use crate::config::TransitionConfig;
use crate::metrics::TransitionMetrics;
use crate::phase;
use pageflow_core::application::Application;
use pageflow_core::context::{PageContext, Request, RequestId};
use pageflow_core::error::{Phase, TransitionError};
use pageflow_core::page::{PageFactory, PageHandle};
use pageflow_core::state::{
    HANDLED, HANDLING, INITED, INITING, PageFlag, RENDERED, RENDERING,
};
use std::sync::Arc;

/// How a server transition ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOutcome {
    /// The page rendered and the response was finalized
    Rendered,
    /// Rendering was skipped: the request was aborted, the response was
    /// already finished, or the page state changed during `handle`
    Skipped,
}

impl ServerOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::Skipped => "skipped",
        }
    }
}

/// Runs pages for inbound server requests.
///
/// # Example
///
/// ```
/// use pageflow_core::context::Request;
/// use pageflow_core::page::{BasePage, PageHandle};
/// use pageflow_runtime::server::{ServerOutcome, ServerRunner};
///
/// # async fn example() -> Result<(), pageflow_core::error::TransitionError> {
/// let runner = ServerRunner::default();
/// let page = PageHandle::new("home", BasePage);
/// let ctx = runner.context(Request::new("/"));
///
/// assert_eq!(runner.run(&page, &ctx).await?, ServerOutcome::Rendered);
/// assert!(ctx.response().is_finished());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerRunner {
    config: TransitionConfig,
}

impl ServerRunner {
    /// Create a runner with `config`.
    #[must_use]
    pub const fn new(config: TransitionConfig) -> Self {
        Self { config }
    }

    /// The runner configuration.
    #[must_use]
    pub const fn config(&self) -> &TransitionConfig {
        &self.config
    }

    /// Build the context for `request`, stamping it with a `<host>:<uuid>` id.
    #[must_use]
    pub fn context(&self, request: Request) -> PageContext {
        PageContext::new(request.with_id(RequestId::generate(&self.config.host_name)))
    }

    /// Create the page called `id` through `factory` and run it for `request`.
    ///
    /// Returns the outcome together with the request context so the caller
    /// can read the response.
    ///
    /// # Errors
    ///
    /// Returns the first phase error reported by the page.
    pub async fn serve(
        &self,
        factory: &dyn PageFactory,
        id: &str,
        app: &Arc<Application>,
        request: Request,
    ) -> Result<(ServerOutcome, PageContext), TransitionError> {
        let page = factory.create(id, app);
        let ctx = self.context(request);
        let outcome = self.run(&page, &ctx).await?;
        Ok((outcome, ctx))
    }

    /// Drive `page` through `init`, `handle`, and `render` for one request.
    ///
    /// The page state is reset first. Rendering only happens when the state is
    /// `INITED|HANDLED` (under the configured guard mode), the request was not
    /// aborted, and the response is not finished yet. After a successful render
    /// the response is finalized unless the page already did so.
    ///
    /// # Errors
    ///
    /// Returns the first phase error; later phases are not attempted.
    #[tracing::instrument(skip_all, name = "server_run", fields(page = page.id(), request = %ctx.request().id()))]
    pub async fn run(
        &self,
        page: &PageHandle,
        ctx: &PageContext,
    ) -> Result<ServerOutcome, TransitionError> {
        let timings = ctx.response().timings();
        timings.time("route");
        let result = self.run_phases(page, ctx).await;
        timings.time("route");

        match &result {
            Ok(outcome) => TransitionMetrics::record_outcome("server", outcome.as_str()),
            Err(_) => TransitionMetrics::record_outcome("server", "failed"),
        }
        result
    }

    async fn run_phases(
        &self,
        page: &PageHandle,
        ctx: &PageContext,
    ) -> Result<ServerOutcome, TransitionError> {
        page.reset_state();

        page.append_state(&[INITING]);
        let inited = phase::run(page, Phase::Init, ctx).await;
        page.append_state(&[-INITING, INITED]);
        inited?;

        page.append_state(&[HANDLING]);
        let handled = phase::run(page, Phase::Handle, ctx).await;
        page.append_state(&[-HANDLING, HANDLED]);
        handled?;

        if !self.may_render(page, ctx) {
            tracing::debug!(state = %page.state(), "render skipped");
            return Ok(ServerOutcome::Skipped);
        }

        page.append_state(&[RENDERING]);
        let rendered = phase::run(page, Phase::Render, ctx).await;
        page.append_state(&[-RENDERING, RENDERED]);
        rendered?;

        if ctx.response().finish() {
            tracing::debug!("response finished");
        }
        Ok(ServerOutcome::Rendered)
    }

    fn may_render(&self, page: &PageHandle, ctx: &PageContext) -> bool {
        page.state()
            .satisfies(PageFlag::Inited | PageFlag::Handled, self.config.guard)
            && !ctx.request().is_aborted()
            && !ctx.response().is_finished()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pageflow_core::page::BasePage;
    use pageflow_core::state::PageState;

    #[tokio::test]
    async fn test_base_page_renders_and_finishes() {
        let runner = ServerRunner::default();
        let page = PageHandle::new("home", BasePage);
        let ctx = runner.context(Request::new("/"));

        let outcome = runner.run(&page, &ctx).await.unwrap();

        assert_eq!(outcome, ServerOutcome::Rendered);
        assert_eq!(
            page.state(),
            PageState::of(&[PageFlag::Inited, PageFlag::Handled, PageFlag::Rendered])
        );
        assert!(ctx.response().is_finished());
        assert!(ctx.response().timings().get("route").is_some());
    }

    #[tokio::test]
    async fn test_context_uses_host_name() {
        let runner = ServerRunner::new(TransitionConfig::default().with_host_name("web-7"));
        let ctx = runner.context(Request::new("/"));
        assert!(ctx.request().id().as_str().starts_with("web-7:"));
        assert_eq!(ctx.request().id(), ctx.response().id());
    }

    #[tokio::test]
    async fn test_aborted_request_skips_render() {
        let runner = ServerRunner::default();
        let page = PageHandle::new("home", BasePage);
        let ctx = runner.context(Request::new("/"));
        ctx.request().abort();

        let outcome = runner.run(&page, &ctx).await.unwrap();

        assert_eq!(outcome, ServerOutcome::Skipped);
        assert!(!page.state().has(PageFlag::Rendered));
        assert!(!ctx.response().is_finished());
    }
}
