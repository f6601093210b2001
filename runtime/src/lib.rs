//! # Pageflow Runtime
//!
//! Transition runners for the Pageflow page lifecycle.
//!
//! The runners take pages from `pageflow-core` through their lifecycle while
//! keeping the per-page state markers consistent, even when navigations
//! overlap.
//!
//! ## Core Components
//!
//! - **`ServerRunner`**: one request, one fresh page, `init → handle → render`
//! - **`ClientRunner`**: a long-lived app swapping pages, with concurrent
//!   unwind/init, preemption by newer navigations, and partial renders
//! - **`RerenderScheduler`**: rerenders of the live page, coalesced while a
//!   render is in flight
//! - **`MetricsServer`**: Prometheus export of phase timings and outcomes
//!
//! ## Example
//!
//! ```
//! use pageflow_core::application::Application;
//! use pageflow_core::context::Request;
//! use pageflow_core::page::{BasePage, PageHandle};
//! use pageflow_runtime::{ClientRunner, NavigationOutcome, TransitionConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), pageflow_core::error::TransitionError> {
//! let app = Arc::new(Application::new("site"));
//! let runner = ClientRunner::new(app, TransitionConfig::from_env());
//!
//! let home = PageHandle::new("home", BasePage);
//! let about = PageHandle::new("about", BasePage);
//!
//! // Phases that never wait have already run when `navigate` returns.
//! let first = runner.navigate(home.clone(), Request::new("/"));
//! assert_eq!(runner.current(), Some(home));
//!
//! let second = runner.navigate(about.clone(), Request::new("/about"));
//! assert_eq!(first.await?, NavigationOutcome::Rendered);
//! assert_eq!(second.await?, NavigationOutcome::Rendered);
//! assert_eq!(runner.current(), Some(about));
//! # Ok(())
//! # }
//! ```

/// Client-side transition runner
pub mod client;

/// Runner configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Coalescing rerender scheduler
pub mod rerender;

/// Server-side transition runner
pub mod server;

mod phase;

pub use client::{ClientRunner, Navigation, NavigationOutcome};
pub use config::TransitionConfig;
pub use rerender::{RerenderOutcome, RerenderScheduler};
pub use server::{ServerOutcome, ServerRunner};
