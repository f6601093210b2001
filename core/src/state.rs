//! Page lifecycle state.
//!
//! A page's state is a set of phase markers rather than a single enum value:
//! a page can be `INITED` from the current cycle while still `RENDERED` from a
//! previous one. Markers are only removed by appending their negation.
//!
//! # Example
//!
//! ```
//! use pageflow_core::state::{PageState, INITED, INITING, HANDLED};
//!
//! let mut state = PageState::EMPTY;
//! state.append(&[INITING]);
//! state.append(&[-INITING, INITED]);
//!
//! assert!(state.contains(&[INITED, -INITING]));
//! assert!(!state.contains(&[HANDLED]));
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{BitOr, Neg};

/// A single lifecycle phase marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageFlag {
    /// `init` is in flight
    Initing,
    /// `init` completed
    Inited,
    /// `handle` is in flight
    Handling,
    /// `handle` completed
    Handled,
    /// `render` is in flight
    Rendering,
    /// `render` completed
    Rendered,
    /// `unrender` is in flight
    Unrendering,
    /// `unrender` completed
    Unrendered,
    /// `unhandle` is in flight
    Unhandling,
    /// `unhandle` completed
    Unhandled,
}

impl PageFlag {
    /// Every flag, in lifecycle order.
    pub const ALL: [Self; 10] = [
        Self::Initing,
        Self::Inited,
        Self::Handling,
        Self::Handled,
        Self::Rendering,
        Self::Rendered,
        Self::Unrendering,
        Self::Unrendered,
        Self::Unhandling,
        Self::Unhandled,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Upper-case name used in logs (`INITED`, `HANDLING`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initing => "INITING",
            Self::Inited => "INITED",
            Self::Handling => "HANDLING",
            Self::Handled => "HANDLED",
            Self::Rendering => "RENDERING",
            Self::Rendered => "RENDERED",
            Self::Unrendering => "UNRENDERING",
            Self::Unrendered => "UNRENDERED",
            Self::Unhandling => "UNHANDLING",
            Self::Unhandled => "UNHANDLED",
        }
    }
}

impl fmt::Display for PageFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A signed flag: `Set` adds the marker, `Clear` removes it when appended and
/// tests for its absence when used with [`PageState::contains`].
///
/// Negating a `StateFlag` flips its sign, so `-INITING` reads as "clear
/// `INITING`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFlag {
    /// Positive flag
    Set(PageFlag),
    /// Negative flag
    Clear(PageFlag),
}

impl StateFlag {
    /// The underlying phase marker, regardless of sign.
    #[must_use]
    pub const fn flag(self) -> PageFlag {
        match self {
            Self::Set(flag) | Self::Clear(flag) => flag,
        }
    }
}

impl Neg for StateFlag {
    type Output = Self;

    fn neg(self) -> Self {
        match self {
            Self::Set(flag) => Self::Clear(flag),
            Self::Clear(flag) => Self::Set(flag),
        }
    }
}

impl From<PageFlag> for StateFlag {
    fn from(flag: PageFlag) -> Self {
        Self::Set(flag)
    }
}

/// `init` in flight
pub const INITING: StateFlag = StateFlag::Set(PageFlag::Initing);
/// `init` completed
pub const INITED: StateFlag = StateFlag::Set(PageFlag::Inited);
/// `handle` in flight
pub const HANDLING: StateFlag = StateFlag::Set(PageFlag::Handling);
/// `handle` completed
pub const HANDLED: StateFlag = StateFlag::Set(PageFlag::Handled);
/// `render` in flight
pub const RENDERING: StateFlag = StateFlag::Set(PageFlag::Rendering);
/// `render` completed
pub const RENDERED: StateFlag = StateFlag::Set(PageFlag::Rendered);
/// `unrender` in flight
pub const UNRENDERING: StateFlag = StateFlag::Set(PageFlag::Unrendering);
/// `unrender` completed
pub const UNRENDERED: StateFlag = StateFlag::Set(PageFlag::Unrendered);
/// `unhandle` in flight
pub const UNHANDLING: StateFlag = StateFlag::Set(PageFlag::Unhandling);
/// `unhandle` completed
pub const UNHANDLED: StateFlag = StateFlag::Set(PageFlag::Unhandled);

/// How a guard compares a page's state with an expected combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// The state must equal the expected combination, no other marker set.
    #[default]
    Exact,
    /// Every expected marker must be set; other markers are ignored.
    AtLeast,
}

/// Set of lifecycle markers currently held by a page.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageState(u16);

impl PageState {
    /// No markers set.
    pub const EMPTY: Self = Self(0);

    /// Build a state holding exactly `flags`.
    #[must_use]
    pub const fn of(flags: &[PageFlag]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < flags.len() {
            bits |= flags[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Apply signed flags in order: positive flags are added, negative flags
    /// removed. Adding never clears an unrelated marker.
    pub fn append(&mut self, flags: &[StateFlag]) {
        for flag in flags {
            match *flag {
                StateFlag::Set(flag) => self.0 |= flag.bit(),
                StateFlag::Clear(flag) => self.0 &= !flag.bit(),
            }
        }
    }

    /// Test signed flags: a positive flag requires the marker to be set, a
    /// negative flag requires it to be absent. An empty slice is vacuously
    /// true.
    #[must_use]
    pub fn contains(&self, flags: &[StateFlag]) -> bool {
        flags.iter().all(|flag| match *flag {
            StateFlag::Set(flag) => self.has(flag),
            StateFlag::Clear(flag) => !self.has(flag),
        })
    }

    /// Whether `flag` is set.
    #[must_use]
    pub const fn has(self, flag: PageFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Whether no marker is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Compare against `expected` under `mode`.
    #[must_use]
    pub const fn satisfies(self, expected: Self, mode: GuardMode) -> bool {
        match mode {
            GuardMode::Exact => self.0 == expected.0,
            GuardMode::AtLeast => self.0 & expected.0 == expected.0,
        }
    }

    /// Markers currently set, in lifecycle order.
    #[must_use]
    pub fn flags(self) -> SmallVec<[PageFlag; 10]> {
        PageFlag::ALL
            .into_iter()
            .filter(|flag| self.has(*flag))
            .collect()
    }
}

impl From<PageFlag> for PageState {
    fn from(flag: PageFlag) -> Self {
        Self(flag.bit())
    }
}

impl BitOr for PageFlag {
    type Output = PageState;

    fn bitor(self, rhs: Self) -> PageState {
        PageState(self.bit() | rhs.bit())
    }
}

impl BitOr<PageFlag> for PageState {
    type Output = Self;

    fn bitor(self, rhs: PageFlag) -> Self {
        Self(self.0 | rhs.bit())
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("EMPTY");
        }
        for (i, flag) in self.flags().iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(flag.name())?;
        }
        Ok(())
    }
}

impl fmt::Debug for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageState({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_sets_and_clears() {
        let mut state = PageState::EMPTY;
        state.append(&[INITING]);
        assert_eq!(state, PageState::from(PageFlag::Initing));

        state.append(&[-INITING, INITED]);
        assert_eq!(state, PageState::from(PageFlag::Inited));

        state.append(&[RENDERED]);
        assert_eq!(state, PageFlag::Inited | PageFlag::Rendered);
    }

    #[test]
    fn test_contains_negative_flag() {
        let state = PageFlag::Inited | PageFlag::Rendered;

        // Negative flag for a set marker fails
        assert!(!state.contains(&[-RENDERED]));
        // Negative flag for an absent marker passes
        assert!(state.contains(&[-HANDLED]));
        // Positive flags mirror the opposite
        assert!(state.contains(&[RENDERED]));
        assert!(!state.contains(&[HANDLED]));
    }

    #[test]
    fn test_contains_empty_is_vacuously_true() {
        assert!(PageState::EMPTY.contains(&[]));
        assert!((PageFlag::Inited | PageFlag::Handled).contains(&[]));
    }

    #[test]
    fn test_clear_absent_flag_is_noop() {
        let mut state = PageState::from(PageFlag::Inited);
        state.append(&[-RENDERED]);
        assert_eq!(state, PageState::from(PageFlag::Inited));
    }

    #[test]
    fn test_satisfies_modes() {
        let expected = PageFlag::Inited | PageFlag::Handled;
        let extra = expected | PageFlag::Rendering;

        assert!(expected.satisfies(expected, GuardMode::Exact));
        assert!(expected.satisfies(expected, GuardMode::AtLeast));
        assert!(!extra.satisfies(expected, GuardMode::Exact));
        assert!(extra.satisfies(expected, GuardMode::AtLeast));
        assert!(!PageState::from(PageFlag::Inited).satisfies(expected, GuardMode::AtLeast));
    }

    #[test]
    fn test_guard_mode_names() {
        assert_eq!(GuardMode::default(), GuardMode::Exact);
        assert_eq!(
            serde_json::to_value(GuardMode::AtLeast).ok(),
            Some(serde_json::json!("at_least"))
        );
        assert_eq!(
            serde_json::from_str::<GuardMode>("\"exact\"").ok(),
            Some(GuardMode::Exact)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(PageState::EMPTY.to_string(), "EMPTY");
        assert_eq!(
            (PageFlag::Inited | PageFlag::Unrendered | PageFlag::Unhandled).to_string(),
            "INITED|UNRENDERED|UNHANDLED"
        );
    }

    #[test]
    fn test_negation_round_trips() {
        assert_eq!(-(-HANDLED), HANDLED);
        assert_eq!((-HANDLED).flag(), PageFlag::Handled);
    }

    fn any_flag() -> impl Strategy<Value = PageFlag> {
        (0..PageFlag::ALL.len()).prop_map(|i| PageFlag::ALL[i])
    }

    fn any_signed() -> impl Strategy<Value = StateFlag> {
        (any_flag(), any::<bool>()).prop_map(|(flag, set)| {
            if set {
                StateFlag::Set(flag)
            } else {
                StateFlag::Clear(flag)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_appended_flags_hold_last_sign(flags in proptest::collection::vec(any_signed(), 0..24)) {
            let mut state = PageState::EMPTY;
            state.append(&flags);

            for flag in PageFlag::ALL {
                let last = flags.iter().rev().find(|f| f.flag() == flag);
                match last {
                    Some(StateFlag::Set(_)) => prop_assert!(state.has(flag)),
                    Some(StateFlag::Clear(_)) | None => prop_assert!(!state.has(flag)),
                }
            }
        }

        #[test]
        fn prop_append_never_touches_unrelated_flags(
            initial in proptest::collection::vec(any_flag(), 0..10),
            flag in any_signed(),
        ) {
            let mut state = PageState::of(&initial);
            let before = state;
            state.append(&[flag]);

            for other in PageFlag::ALL.into_iter().filter(|f| *f != flag.flag()) {
                prop_assert_eq!(state.has(other), before.has(other));
            }
        }

        #[test]
        fn prop_state_contains_what_was_appended(flags in proptest::collection::vec(any_signed(), 1..12)) {
            let mut state = PageState::EMPTY;
            state.append(&flags);
            let last = flags[flags.len() - 1];
            prop_assert!(state.contains(&[last]));
            prop_assert!(!state.contains(&[-last]));
        }
    }
}
