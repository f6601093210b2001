//! Request-scoped context threaded through every lifecycle call.
//!
//! [`PageContext`] bundles the request, the response, and (on the client) a
//! flush hook that lets a long-running `handle` trigger a partial render.
//! The runners never interpret the request; the only response operations they
//! use are [`Response::finish`] and the timing helpers.

use crate::cache_control::{self, MaxAge};
use crate::error::{CacheControlError, PageError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Identifier shared by a request and its response (`<prefix>:<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id under `prefix` (a host name or an application uid).
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}:{}", uuid::Uuid::new_v4()))
    }

    /// Use `id` verbatim.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound request data a page reads from.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    path: String,
    params: HashMap<String, String>,
    aborted: AtomicBool,
}

impl Request {
    /// Create a request for `path` with a development id.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate("dev"),
            path: path.into(),
            params: HashMap::new(),
            aborted: AtomicBool::new(false),
        }
    }

    /// Replace the request id.
    #[must_use]
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Add a route parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The request id.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// The requested path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// A route parameter by name.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Mark the request as aborted by the client.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether the client aborted the request.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// A completed timing measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEntry {
    /// Measurement name (`handle`, `render`, ...)
    pub name: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Measured duration
    pub duration: Duration,
}

/// Named timing measurements for one response.
///
/// [`Timings::time`] toggles: the first call for a name starts a measurement,
/// the second stops it and stores the entry.
#[derive(Debug, Default)]
pub struct Timings {
    open: Mutex<HashMap<String, (DateTime<Utc>, Instant)>>,
    entries: Mutex<HashMap<String, TimingEntry>>,
}

impl Timings {
    /// Start or stop the measurement called `name`.
    ///
    /// Returns the completed entry when this call stopped a measurement.
    pub fn time(&self, name: &str) -> Option<TimingEntry> {
        let started = {
            let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
            match open.remove(name) {
                Some(started) => started,
                None => {
                    open.insert(name.to_string(), (Utc::now(), Instant::now()));
                    return None;
                },
            }
        };

        let entry = TimingEntry {
            name: name.to_string(),
            started_at: started.0,
            duration: started.1.elapsed(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), entry.clone());
        Some(entry)
    }

    /// Store an externally measured duration.
    pub fn record(&self, name: &str, duration: Duration) {
        let started_at = Utc::now()
            - chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                TimingEntry {
                    name: name.to_string(),
                    started_at,
                    duration,
                },
            );
    }

    /// The last completed entry called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TimingEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Every completed entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<TimingEntry> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.started_at);
        entries
    }

    /// Drop every entry and any measurement still open.
    pub fn clear(&self) {
        self.open.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Outbound response a page writes to.
#[derive(Debug)]
pub struct Response {
    id: RequestId,
    headers: Mutex<BTreeMap<String, String>>,
    body: Mutex<String>,
    finished: AtomicBool,
    timings: Timings,
}

impl Response {
    /// Create an empty response sharing the request's id.
    #[must_use]
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            headers: Mutex::new(BTreeMap::new()),
            body: Mutex::new(String::new()),
            finished: AtomicBool::new(false),
            timings: Timings::default(),
        }
    }

    /// The response id.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// A header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Append a chunk to the body.
    pub fn write_body(&self, chunk: &str) {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(chunk);
    }

    /// The body written so far.
    #[must_use]
    pub fn body(&self) -> String {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Finalize the response.
    ///
    /// Returns `true` only for the call that actually finished it; later calls
    /// are no-ops.
    pub fn finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    /// Whether the response has been finalized.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Timing measurements for this response.
    #[must_use]
    pub const fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Set the `Cache-Control` header from a default max-age and the max-ages
    /// reported by upstream responses. The shortest upstream value wins.
    ///
    /// # Errors
    ///
    /// Returns [`CacheControlError::Invalid`] if `default` cannot be
    /// interpreted as a duration.
    pub fn cache_control(
        &self,
        default: impl Into<MaxAge>,
        upstream: &[Option<u64>],
    ) -> Result<&Self, CacheControlError> {
        let seconds = cache_control::duration(default, upstream)?;
        self.set_header(cache_control::HEADER, cache_control::header_value(seconds));
        Ok(self)
    }
}

/// Future returned by a [`FlushHook`]: `Ok(true)` if a partial render ran.
pub type FlushFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, PageError>> + Send + 'a>>;

/// Per-request hook that renders the live page out of band while its
/// `handle` is still in flight.
pub trait FlushHook: Send + Sync {
    /// Trigger a partial render.
    fn flush(&self) -> FlushFuture<'_>;
}

/// Context passed to every page lifecycle operation.
#[derive(Clone)]
pub struct PageContext {
    request: Arc<Request>,
    response: Arc<Response>,
    flush: Option<Arc<dyn FlushHook>>,
}

impl PageContext {
    /// Build a context with a fresh response sharing the request id.
    #[must_use]
    pub fn new(request: Request) -> Self {
        let response = Response::new(request.id().clone());
        Self {
            request: Arc::new(request),
            response: Arc::new(response),
            flush: None,
        }
    }

    /// Install the partial render hook.
    #[must_use]
    pub fn with_flush_hook(mut self, hook: Arc<dyn FlushHook>) -> Self {
        self.flush = Some(hook);
        self
    }

    /// The request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Ask the runner to render the live page now, before `handle` finishes.
    ///
    /// Resolves to `Ok(false)` when no hook is installed (server requests) or
    /// when the page is not in a state that allows a partial render.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the page's `render`.
    pub async fn flush(&self) -> Result<bool, PageError> {
        match &self.flush {
            Some(hook) => hook.flush().await,
            None => Ok(false),
        }
    }
}

impl fmt::Debug for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("request", &self.request.id())
            .field("path", &self.request.path())
            .field("flush", &self.flush.is_some())
            .finish()
    }
}
