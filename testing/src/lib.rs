//! # Pageflow Testing
//!
//! Testing utilities for Pageflow transition runners.
//!
//! This crate provides:
//! - [`ScriptedPage`]: a page whose operations sleep, fail, or flush on demand
//! - [`CallLog`]: the ordered record of every lifecycle call across pages
//! - Helpers for applications, requests, state assertions, and test logging
//!
//! ## Example
//!
//! ```ignore
//! use pageflow_testing::{CallLog, ScriptedPage, helpers};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_slow_init_is_superseded() {
//!     let log = CallLog::new();
//!     let runner = ClientRunner::new(helpers::test_app(), TransitionConfig::default());
//!     let slow = ScriptedPage::new("slow", &log)
//!         .delay(Phase::Init, Duration::from_millis(50))
//!         .into_handle();
//!
//!     let first = runner.navigate(slow, helpers::test_request("/slow"));
//!     // ...
//! }
//! ```

/// Scripted pages and the shared call log
pub mod scripted_page;

/// Test helpers and utilities
pub mod helpers {
    use pageflow_core::application::Application;
    use pageflow_core::context::Request;
    use pageflow_core::page::PageHandle;
    use pageflow_core::state::{PageFlag, PageState};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    /// A fresh application called `test-app`.
    #[must_use]
    pub fn test_app() -> Arc<Application> {
        Arc::new(Application::new("test-app"))
    }

    /// A request for `path`.
    #[must_use]
    pub fn test_request(path: &str) -> Request {
        Request::new(path)
    }

    /// Assert that `page` holds exactly the markers in `expected`.
    ///
    /// # Panics
    ///
    /// Panics with both states spelled out if they differ.
    #[track_caller]
    pub fn assert_state(page: &PageHandle, expected: &[PageFlag]) {
        let expected = PageState::of(expected);
        let actual = page.state();
        assert_eq!(
            actual,
            expected,
            "page `{}` is {actual}, expected {expected}",
            page.id()
        );
    }

    /// Route `tracing` output through the test writer.
    ///
    /// Honours `RUST_LOG`; defaults to `warn`. Safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(fmt::layer().with_test_writer())
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{assert_state, init_tracing, test_app, test_request};
pub use scripted_page::{Call, CallLog, Edge, ScriptedPage};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pageflow_core::context::PageContext;
    use pageflow_core::error::Phase;
    use pageflow_core::state::{INITED, PageFlag};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_page_records_and_delays() {
        let log = CallLog::new();
        let page = ScriptedPage::new("home", &log)
            .delay(Phase::Init, Duration::from_millis(20))
            .into_handle();
        let ctx = PageContext::new(test_request("/"));

        let started = tokio::time::Instant::now();
        page.init(&ctx).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(
            log.calls(),
            vec![
                Call { page: "home".into(), phase: Phase::Init, edge: Edge::Start },
                Call { page: "home".into(), phase: Phase::Init, edge: Edge::End },
            ]
        );
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let log = CallLog::new();
        let page = ScriptedPage::new("broken", &log)
            .fail(Phase::Render, "template missing")
            .into_handle();
        let ctx = PageContext::new(test_request("/"));

        let error = page.render(&ctx).await.unwrap_err();

        assert_eq!(error.to_string(), "template missing");
        assert_eq!(ctx.response().body(), "[broken]");
        assert_eq!(log.count("broken", Phase::Render), 1);
    }

    #[tokio::test]
    async fn test_flush_without_hook_is_recorded_as_false() {
        let log = CallLog::new();
        let page = ScriptedPage::new("home", &log)
            .flush_during_handle(2)
            .into_handle();
        let ctx = PageContext::new(test_request("/"));

        page.handle(&ctx).await.unwrap();

        assert_eq!(log.flushes("home"), vec![false, false]);
    }

    #[test]
    fn test_assert_state() {
        let log = CallLog::new();
        let page = ScriptedPage::new("home", &log).into_handle();
        page.append_state(&[INITED]);
        assert_state(&page, &[PageFlag::Inited]);
        init_tracing();
        init_tracing();
    }
}
