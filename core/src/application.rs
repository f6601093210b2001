//! Application (session) context shared by all pages of one app instance.

use crate::context::PageContext;
use crate::page::{Page, PageHandle, PageOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Key/value settings store.
#[derive(Debug, Default)]
pub struct Settings {
    values: RwLock<HashMap<String, Value>>,
}

impl Settings {
    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store `value` under `key`.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Whether `key` has a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

/// The surrounding application a page belongs to.
///
/// Holds long-lived settings, the registered pages, the page currently
/// published as live, and the context of the most recent request (used by
/// rerenders triggered outside a request cycle).
#[derive(Debug)]
pub struct Application {
    id: String,
    uid: String,
    settings: Settings,
    pages: RwLock<HashMap<String, PageHandle>>,
    live_page: RwLock<Option<PageHandle>>,
    current_context: RwLock<Option<PageContext>>,
}

impl Application {
    /// Create an application called `id` with a fresh `client:<uuid>` uid.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uid: format!("client:{}", uuid::Uuid::new_v4()),
            settings: Settings::default(),
            pages: RwLock::new(HashMap::new()),
            live_page: RwLock::new(None),
            current_context: RwLock::new(None),
        }
    }

    /// The application id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unique id of this application instance, used to stamp client requests.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Application settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shorthand for `settings().get(key)`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.settings.get(key)
    }

    /// Shorthand for `settings().set(key, value)`.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.settings.set(key, value);
    }

    /// Register `page` under `id`.
    ///
    /// Page-specific configuration from `options` is stored in the settings
    /// under the page id. Registering an id twice replaces the earlier page.
    pub fn register_page(
        &self,
        id: impl Into<String>,
        options: PageOptions,
        page: impl Page + 'static,
    ) -> PageHandle {
        let id = id.into();
        if let Some(config) = options.config {
            self.settings.set(id.clone(), config);
        }

        let handle = PageHandle::new(id.clone(), page);
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());
        handle
    }

    /// A registered page by id.
    #[must_use]
    pub fn registered_page(&self, id: &str) -> Option<PageHandle> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// The page currently published as live, if any.
    #[must_use]
    pub fn page(&self) -> Option<PageHandle> {
        self.live_page
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish (or clear) the live page.
    pub fn set_page(&self, page: Option<PageHandle>) {
        *self
            .live_page
            .write()
            .unwrap_or_else(PoisonError::into_inner) = page;
    }

    /// Context of the most recent request.
    #[must_use]
    pub fn current_context(&self) -> Option<PageContext> {
        self.current_context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the context of the request being served.
    pub fn set_current_context(&self, ctx: PageContext) {
        *self
            .current_context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(ctx);
    }
}
