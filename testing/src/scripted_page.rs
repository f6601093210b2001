//! Pages whose behaviour is scripted per phase, recording every call.

#![allow(clippy::module_name_repetitions)] // ScriptedPage is the natural name

use pageflow_core::context::PageContext;
use pageflow_core::error::{PageError, Phase};
use pageflow_core::page::{Page, PageHandle, PhaseFuture};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Which point of a lifecycle operation a [`Call`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The operation was entered
    Start,
    /// The operation was about to resolve
    End,
    /// A flush issued from `handle` resolved with this value
    Flushed(bool),
}

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Page id
    pub page: String,
    /// Lifecycle operation
    pub phase: Phase,
    /// Which point of the operation
    pub edge: Edge,
}

/// Shared, ordered record of lifecycle events across pages.
///
/// # Example
///
/// ```
/// use pageflow_core::context::{PageContext, Request};
/// use pageflow_testing::{CallLog, ScriptedPage};
///
/// let log = CallLog::new();
/// let page = ScriptedPage::new("home", &log).into_handle();
/// let ctx = PageContext::new(Request::new("/"));
///
/// tokio_test::block_on(page.init(&ctx)).unwrap();
/// assert_eq!(log.starts(), vec!["home.init"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, page: &str, phase: Phase, edge: Edge) {
        self.lock().push(Call {
            page: page.to_string(),
            phase,
            edge,
        });
    }

    /// Every event in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().clone()
    }

    /// Entered operations in order, formatted as `page.phase`.
    #[must_use]
    pub fn starts(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|call| call.edge == Edge::Start)
            .map(|call| format!("{}.{}", call.page, call.phase))
            .collect()
    }

    /// How often `page` entered `phase`.
    #[must_use]
    pub fn count(&self, page: &str, phase: Phase) -> usize {
        self.lock()
            .iter()
            .filter(|call| call.page == page && call.phase == phase && call.edge == Edge::Start)
            .count()
    }

    /// Index of the first matching event.
    #[must_use]
    pub fn position(&self, page: &str, phase: Phase, edge: Edge) -> Option<usize> {
        self.lock()
            .iter()
            .position(|call| call.page == page && call.phase == phase && call.edge == edge)
    }

    /// Results of the flushes `page` issued, in completion order.
    #[must_use]
    pub fn flushes(&self, page: &str) -> Vec<bool> {
        self.lock()
            .iter()
            .filter(|call| call.page == page)
            .filter_map(|call| match call.edge {
                Edge::Flushed(flushed) => Some(flushed),
                Edge::Start | Edge::End => None,
            })
            .collect()
    }

    /// Forget every event.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default)]
struct Step {
    delay: Option<Duration>,
    error: Option<String>,
}

/// A page that sleeps, fails, or flushes on demand.
///
/// Every operation records its start and end in the shared [`CallLog`].
/// `render` appends `[id]` to the response body so partial and full renders
/// are visible in the output.
///
/// Delays use `tokio::time::sleep`, so tests run with a paused clock stay
/// deterministic.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    id: String,
    log: CallLog,
    steps: HashMap<Phase, Step>,
    flushes: usize,
}

impl ScriptedPage {
    /// Create a page that completes every operation immediately.
    #[must_use]
    pub fn new(id: impl Into<String>, log: &CallLog) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
            steps: HashMap::new(),
            flushes: 0,
        }
    }

    /// Suspend `phase` for `delay` before it resolves.
    #[must_use]
    pub fn delay(mut self, phase: Phase, delay: Duration) -> Self {
        self.steps.entry(phase).or_default().delay = Some(delay);
        self
    }

    /// Make `phase` fail with `message`.
    #[must_use]
    pub fn fail(mut self, phase: Phase, message: impl Into<String>) -> Self {
        self.steps.entry(phase).or_default().error = Some(message.into());
        self
    }

    /// Issue `count` concurrent flushes from `handle`, after its delay.
    #[must_use]
    pub const fn flush_during_handle(mut self, count: usize) -> Self {
        self.flushes = count;
        self
    }

    /// Wrap the page in a handle under its id.
    #[must_use]
    pub fn into_handle(self) -> PageHandle {
        let id = self.id.clone();
        PageHandle::new(id, self)
    }

    fn run<'a>(&'a self, phase: Phase, ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async move {
            self.log.record(&self.id, phase, Edge::Start);
            let step = self.steps.get(&phase);

            if let Some(delay) = step.and_then(|step| step.delay) {
                tokio::time::sleep(delay).await;
            }

            if phase == Phase::Handle && self.flushes > 0 {
                let flushes = (0..self.flushes).map(|_| ctx.flush());
                for flushed in futures::future::join_all(flushes).await {
                    self.log.record(&self.id, phase, Edge::Flushed(flushed?));
                }
            }

            if phase == Phase::Render {
                ctx.response().write_body(&format!("[{}]", self.id));
            }

            self.log.record(&self.id, phase, Edge::End);
            match step.and_then(|step| step.error.as_ref()) {
                Some(message) => Err(PageError::msg(message.clone())),
                None => Ok(()),
            }
        })
    }
}

impl Page for ScriptedPage {
    fn init<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.run(Phase::Init, ctx)
    }

    fn handle<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.run(Phase::Handle, ctx)
    }

    fn render<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.run(Phase::Render, ctx)
    }

    fn unhandle<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.run(Phase::Unhandle, ctx)
    }

    fn unrender<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        self.run(Phase::Unrender, ctx)
    }
}
