//! The page abstraction and the shared handle runners operate on.
//!
//! A [`Page`] implements the five lifecycle operations. Runners never hold a
//! page directly; they hold a [`PageHandle`], which pairs the behaviour with
//! the page's id and its [`PageState`].

use crate::application::Application;
use crate::context::PageContext;
use crate::error::PageError;
use crate::state::{PageState, StateFlag};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// Result of a lifecycle operation.
pub type PhaseResult = Result<(), PageError>;

/// Future returned by a lifecycle operation.
pub type PhaseFuture<'a> = Pin<Box<dyn Future<Output = PhaseResult> + Send + 'a>>;

/// A routable unit of application logic.
///
/// Every operation resolves exactly once. Implementations may suspend for as
/// long as they like; a runner re-validates its own assumptions after every
/// operation, so a page must not assume it is the only transition in flight
/// for its application.
///
/// The default bodies complete immediately with `Ok(())`.
///
/// # Dyn Compatibility
///
/// Operations return explicit boxed futures instead of using `async fn` so
/// that pages can be stored as `Box<dyn Page>`.
///
/// # Example
///
/// ```
/// use pageflow_core::context::PageContext;
/// use pageflow_core::page::{Page, PhaseFuture};
///
/// struct Greeting;
///
/// impl Page for Greeting {
///     fn render<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
///         Box::pin(async move {
///             ctx.response().write_body("<h1>hello</h1>");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Page: Send + Sync {
    /// Prepare the page before it handles a request.
    fn init<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Load whatever the request needs.
    fn handle<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Produce output.
    fn render<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Release what `handle` acquired.
    fn unhandle<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    /// Remove what `render` produced.
    fn unrender<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// A page with no behaviour of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasePage;

impl Page for BasePage {}

struct PageInner {
    id: String,
    state: Mutex<PageState>,
    page: Box<dyn Page>,
}

/// Shared handle to a page and its lifecycle state.
///
/// Clones refer to the same page; equality is identity.
#[derive(Clone)]
pub struct PageHandle {
    inner: Arc<PageInner>,
}

impl PageHandle {
    /// Wrap `page` under `id` with an empty state.
    #[must_use]
    pub fn new(id: impl Into<String>, page: impl Page + 'static) -> Self {
        Self {
            inner: Arc::new(PageInner {
                id: id.into(),
                state: Mutex::new(PageState::EMPTY),
                page: Box::new(page),
            }),
        }
    }

    /// The page id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> PageState {
        *self.lock_state()
    }

    /// Apply signed flags to the state.
    pub fn append_state(&self, flags: &[StateFlag]) {
        self.lock_state().append(flags);
    }

    /// Test signed flags against the state.
    #[must_use]
    pub fn contains_state(&self, flags: &[StateFlag]) -> bool {
        self.lock_state().contains(flags)
    }

    /// Apply `flags` only if `guard` accepts the current state, as one step.
    ///
    /// Returns whether the flags were applied.
    pub fn append_state_if(
        &self,
        guard: impl FnOnce(PageState) -> bool,
        flags: &[StateFlag],
    ) -> bool {
        let mut state = self.lock_state();
        if guard(*state) {
            state.append(flags);
            true
        } else {
            false
        }
    }

    /// Clear every marker, ready for a new transition cycle.
    pub fn reset_state(&self) {
        *self.lock_state() = PageState::EMPTY;
    }

    /// Whether `other` is the same page.
    #[must_use]
    pub fn same_page(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run the page's `init`.
    pub fn init<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.inner.page.init(ctx)
    }

    /// Run the page's `handle`.
    pub fn handle<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.inner.page.handle(ctx)
    }

    /// Run the page's `render`.
    pub fn render<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.inner.page.render(ctx)
    }

    /// Run the page's `unhandle`.
    pub fn unhandle<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.inner.page.unhandle(ctx)
    }

    /// Run the page's `unrender`.
    pub fn unrender<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.inner.page.unrender(ctx)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for PageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_page(other)
    }
}

impl Eq for PageHandle {}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Options applied when a page is registered with an application.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Page-specific configuration, stored in the application settings
    /// under the page id
    pub config: Option<serde_json::Value>,
}

impl PageOptions {
    /// Attach page-specific configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Creates pages on demand, e.g. one per server request.
pub trait PageFactory: Send + Sync {
    /// Create the page called `id` for `app`.
    fn create(&self, id: &str, app: &Arc<Application>) -> PageHandle;
}

impl<F> PageFactory for F
where
    F: Fn(&str, &Arc<Application>) -> PageHandle + Send + Sync,
{
    fn create(&self, id: &str, app: &Arc<Application>) -> PageHandle {
        self(id, app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Request;
    use crate::state::{INITED, INITING, PageFlag, RENDERED};

    #[test]
    fn test_default_operations_succeed() {
        let page = PageHandle::new("base", BasePage);
        let ctx = PageContext::new(Request::new("/"));

        tokio_test::block_on(async {
            assert!(page.init(&ctx).await.is_ok());
            assert!(page.handle(&ctx).await.is_ok());
            assert!(page.render(&ctx).await.is_ok());
            assert!(page.unrender(&ctx).await.is_ok());
            assert!(page.unhandle(&ctx).await.is_ok());
        });
    }

    #[test]
    fn test_state_helpers() {
        let page = PageHandle::new("home", BasePage);
        assert!(page.state().is_empty());

        page.append_state(&[INITING]);
        page.append_state(&[-INITING, INITED, RENDERED]);
        assert_eq!(page.state(), PageFlag::Inited | PageFlag::Rendered);
        assert!(page.contains_state(&[INITED, -INITING]));

        page.reset_state();
        assert!(page.state().is_empty());
    }

    #[test]
    fn test_append_state_if() {
        let page = PageHandle::new("home", BasePage);
        page.append_state(&[RENDERED]);

        assert!(!page.append_state_if(|state| state.has(PageFlag::Inited), &[INITING]));
        assert_eq!(page.state(), PageState::from(PageFlag::Rendered));

        assert!(page.append_state_if(|state| state.has(PageFlag::Rendered), &[-RENDERED, INITED]));
        assert_eq!(page.state(), PageState::from(PageFlag::Inited));
    }

    #[test]
    fn test_identity() {
        let a = PageHandle::new("same-id", BasePage);
        let b = PageHandle::new("same-id", BasePage);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |id: &str, _app: &Arc<Application>| PageHandle::new(id, BasePage);
        let app = Arc::new(Application::new("site"));
        let page = factory.create("about", &app);
        assert_eq!(page.id(), "about");
    }
}
