//! Navigation Demo - page transitions on server and client
//!
//! Renders a page for a server request, then plays a client session that
//! overlaps navigations, flushes a slow page early, and coalesces rerenders.
//! Phase timings and outcomes are exported through the Prometheus recorder
//! and printed at the end.
//!
//! # Running the Example
//!
//! ```bash
//! RUST_LOG=info,pageflow_runtime=debug cargo run -p navigation-demo
//! ```

#![allow(missing_docs)]

use pageflow_core::application::Application;
use pageflow_core::context::{PageContext, Request};
use pageflow_core::page::{Page, PageOptions, PhaseFuture};
use pageflow_runtime::metrics::MetricsServer;
use pageflow_runtime::{ClientRunner, ServerRunner, TransitionConfig};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Static page
struct Home;

impl Page for Home {
    fn render<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async move {
            ctx.response().write_body("<h1>Home</h1>");
            Ok(())
        })
    }
}

// Page that loads slowly and flushes a skeleton while loading
struct Article {
    app: Weak<Application>,
}

impl Page for Article {
    fn handle<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async move {
            let flushed = ctx.flush().await?;
            tracing::info!(flushed, "skeleton flushed");
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok(())
        })
    }

    fn render<'a>(&'a self, ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async move {
            let title = self
                .app
                .upgrade()
                .and_then(|app| app.get("article"))
                .and_then(|config| config["title"].as_str().map(str::to_string))
                .unwrap_or_default();
            ctx.response().write_body(&format!("<article>{title}</article>"));
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        })
    }

    fn unrender<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async {
            tracing::info!("article detached");
            Ok(())
        })
    }
}

// Page with a slow init, usually abandoned before it finishes
struct Search;

impl Page for Search {
    fn init<'a>(&'a self, _ctx: &'a PageContext) -> PhaseFuture<'a> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
    }
}

fn build_app() -> Arc<Application> {
    let app = Arc::new(Application::new("demo"));
    app.register_page("home", PageOptions::default(), Home);
    app.register_page(
        "article",
        PageOptions::default().with_config(serde_json::json!({ "title": "Transitions" })),
        Article {
            app: Arc::downgrade(&app),
        },
    );
    app.register_page("search", PageOptions::default(), Search);
    app
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pageflow_runtime=info,navigation_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install the Prometheus recorder
    let mut metrics = MetricsServer::new(([127, 0, 0, 1], 9000).into());
    metrics.start()?;

    let config = TransitionConfig::from_env();
    let app = build_app();

    // 3. One server request
    let server = ServerRunner::new(config.clone());
    let factory = |id: &str, app: &Arc<Application>| {
        app.registered_page(id)
            .unwrap_or_else(|| pageflow_core::page::PageHandle::new(id, Home))
    };
    let (outcome, ctx) = server.serve(&factory, "home", &app, Request::new("/")).await?;
    tracing::info!(?outcome, body = %ctx.response().body(), "server request done");

    // 4. Client session
    let client = ClientRunner::new(Arc::clone(&app), config);
    let Some(home) = client.navigate_to("home", Request::new("/")) else {
        anyhow::bail!("home page is not registered");
    };
    let outcome = home.await?;
    tracing::info!(?outcome, "navigated home");

    // Search is overtaken by Article before its init finishes.
    let (Some(search), Some(article)) = (
        client.navigate_to("search", Request::new("/search")),
        client.navigate_to("article", Request::new("/article/1")),
    ) else {
        anyhow::bail!("pages are not registered");
    };
    let rerenders = async {
        tokio::time::sleep(Duration::from_millis(90)).await;
        for _ in 0..3 {
            let outcome = client.rerender().await?;
            tracing::info!(?outcome, "rerender requested");
        }
        Ok::<_, pageflow_core::error::TransitionError>(())
    };
    let (search, article, rerenders) = tokio::join!(search, article, rerenders);
    let (search, article) = (search?, article?);
    rerenders?;
    tracing::info!(?search, ?article, "overlapping navigations done");

    if let Some(ctx) = app.current_context() {
        tracing::info!(body = %ctx.response().body(), "article output");
    }

    // 5. Show what was recorded
    if let Some(text) = metrics.render() {
        println!("{text}");
    }
    Ok(())
}
