//! # Pageflow Core
//!
//! Core types for coordinating page lifecycle transitions.
//!
//! A *page* is a routable unit of application logic with five asynchronous
//! lifecycle operations: `init`, `handle`, `render`, `unhandle` and
//! `unrender`. The transition runners in `pageflow-runtime` drive pages
//! through those operations; this crate provides what they operate on.
//!
//! ## Core Concepts
//!
//! - **`PageState`**: set of lifecycle markers (`INITING`, `INITED`, ...)
//!   mutated through signed flags
//! - **Page**: trait with the five lifecycle operations, default no-ops
//! - **`PageHandle`**: shared handle pairing a page with its id and state
//! - **`PageContext`**: request/response pair threaded through every call
//! - **Application**: settings, registered pages, and the live page
//!
//! ## Example
//!
//! ```
//! use pageflow_core::page::{BasePage, PageHandle};
//! use pageflow_core::state::{INITED, INITING, PageFlag, PageState};
//!
//! let page = PageHandle::new("home", BasePage);
//! page.append_state(&[INITING]);
//! page.append_state(&[-INITING, INITED]);
//!
//! assert_eq!(page.state(), PageState::from(PageFlag::Inited));
//! ```

/// Application context shared by the pages of one app instance
pub mod application;

/// Cache-control duration derivation
pub mod cache_control;

/// Request, response, and flush hook passed to lifecycle operations
pub mod context;

/// Page and transition error types
pub mod error;

/// The `Page` trait and `PageHandle`
pub mod page;

/// Lifecycle state markers
pub mod state;

// Re-export commonly used types
pub use application::{Application, Settings};
pub use context::{FlushHook, PageContext, Request, RequestId, Response};
pub use error::{CacheControlError, PageError, Phase, TransitionError};
pub use page::{BasePage, Page, PageFactory, PageHandle, PageOptions, PhaseFuture, PhaseResult};
pub use state::{GuardMode, PageFlag, PageState, StateFlag};
