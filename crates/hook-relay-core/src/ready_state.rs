//! Pull request ready-state resolution.
//!
//! Every pull-request-capable provider reduces its own draft signals to a
//! current draft flag plus a [`ReadyTransition`], so downstream consumers can
//! branch on one [`PullRequestReadyState`] regardless of platform.

use crate::build_params::PullRequestReadyState;

/// What the delivering edit did to the draft status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyTransition {
    /// The edit moved the request out of draft (GitHub `ready_for_review`,
    /// or a draft flag flipping from true to false).
    ConvertedToReady,
    /// Any other edit.
    None,
}

impl ReadyTransition {
    /// Derive the transition from a GitHub-style action verb
    pub fn from_action(action: &str) -> Self {
        if action == "ready_for_review" {
            Self::ConvertedToReady
        } else {
            Self::None
        }
    }

    /// Derive the transition from a previous/current draft flag pair
    pub fn from_draft_change(previous: Option<bool>, current: bool) -> Self {
        match previous {
            Some(true) if !current => Self::ConvertedToReady,
            _ => Self::None,
        }
    }
}

/// Classify a pull request edit.
///
/// Draft always wins; otherwise a conversion out of draft is reported as
/// such; everything else is ready for review.
///
/// ```rust
/// use hook_relay_core::{resolve_ready_state, PullRequestReadyState, ReadyTransition};
///
/// let state = resolve_ready_state(false, ReadyTransition::from_action("ready_for_review"));
/// assert_eq!(state, PullRequestReadyState::ConvertedToReadyForReview);
/// ```
pub fn resolve_ready_state(is_draft_now: bool, transition: ReadyTransition) -> PullRequestReadyState {
    if is_draft_now {
        PullRequestReadyState::Draft
    } else if transition == ReadyTransition::ConvertedToReady {
        PullRequestReadyState::ConvertedToReadyForReview
    } else {
        PullRequestReadyState::ReadyForReview
    }
}

#[cfg(test)]
#[path = "ready_state_tests.rs"]
mod tests;
