//! Error types shared by pages and transition runners.

use std::fmt;
use thiserror::Error;

/// Error reported by a page lifecycle operation.
#[derive(Error, Debug)]
pub enum PageError {
    /// The operation failed with a message
    #[error("{0}")]
    Failed(String),

    /// The operation failed with an underlying error
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PageError {
    /// Create an error from a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// The lifecycle operation a runner was executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `init`
    Init,
    /// `handle`
    Handle,
    /// `render`
    Render,
    /// `unrender`
    Unrender,
    /// `unhandle`
    Unhandle,
}

impl Phase {
    /// Lower-case name, used for metric labels and timing names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Handle => "handle",
            Self::Render => "render",
            Self::Unrender => "unrender",
            Self::Unhandle => "unhandle",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase error surfaced to the caller of a transition.
///
/// Superseded transitions and guard violations are not errors; runners report
/// them through their outcome types instead.
#[derive(Error, Debug)]
#[error("page `{page_id}` failed during {phase}: {source}")]
pub struct TransitionError {
    /// Id of the page whose operation failed
    pub page_id: String,
    /// The failing operation
    pub phase: Phase,
    /// The error reported by the page
    #[source]
    pub source: PageError,
}

impl TransitionError {
    /// Wrap a page error with the page id and phase it came from.
    #[must_use]
    pub fn new(page_id: impl Into<String>, phase: Phase, source: PageError) -> Self {
        Self {
            page_id: page_id.into(),
            phase,
            source,
        }
    }
}

/// Invalid cache-control input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheControlError {
    /// The max-age value could not be interpreted
    #[error("Invalid cache control value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError::new("home", Phase::Handle, PageError::msg("no data"));
        assert_eq!(err.to_string(), "page `home` failed during handle: no data");
    }

    #[test]
    fn test_boxed_source_is_transparent() {
        let io = std::io::Error::other("disk gone");
        let err = PageError::from(Box::new(io) as Box<dyn std::error::Error + Send + Sync>);
        assert_eq!(err.to_string(), "disk gone");
    }
}
