//! Runner configuration.

use pageflow_core::state::GuardMode;

/// Environment variable naming the deployment environment.
pub const ENV_VAR: &str = "PAGEFLOW_ENV";

/// Environment variable holding the host name used for server request ids.
pub const HOSTNAME_VAR: &str = "HOSTNAME";

/// Configuration shared by the transition runners.
///
/// # Example
///
/// ```
/// use pageflow_core::state::GuardMode;
/// use pageflow_runtime::config::TransitionConfig;
///
/// let config = TransitionConfig::default()
///     .with_guard(GuardMode::AtLeast)
///     .with_host_name("web-3");
///
/// assert_eq!(config.host_name, "web-3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionConfig {
    /// How state guards compare a page's state with the expected combination
    /// before rendering, activating, or flushing
    pub guard: GuardMode,
    /// Prefix for server request ids
    pub host_name: String,
}

impl TransitionConfig {
    /// Create a configuration with explicit values.
    #[must_use]
    pub fn new(guard: GuardMode, host_name: impl Into<String>) -> Self {
        Self {
            guard,
            host_name: host_name.into(),
        }
    }

    /// Build from the process environment.
    ///
    /// The host name is taken from `HOSTNAME` only when `PAGEFLOW_ENV` is
    /// `production`; everything else uses `dev`.
    #[must_use]
    pub fn from_env() -> Self {
        let environment = std::env::var(ENV_VAR).ok();
        let host = std::env::var(HOSTNAME_VAR).ok();
        Self::default().with_host_name(resolve_host_name(environment.as_deref(), host.as_deref()))
    }

    /// Set the guard mode.
    #[must_use]
    pub const fn with_guard(mut self, guard: GuardMode) -> Self {
        self.guard = guard;
        self
    }

    /// Set the host name.
    #[must_use]
    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            guard: GuardMode::Exact,
            host_name: String::from("dev"),
        }
    }
}

fn resolve_host_name(environment: Option<&str>, host: Option<&str>) -> String {
    match (environment, host) {
        (Some("production"), Some(host)) if !host.is_empty() => host.to_string(),
        _ => String::from("dev"),
    }
}
