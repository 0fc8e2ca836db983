//! Skip-CI commit message markers.

/// Markers that suppress a build, including markdown-escaped forms some
/// platforms store in PR descriptions.
const SKIP_MARKERS: [&str; 6] = [
    "[skip ci]",
    "[ci skip]",
    "\\[skip ci\\]",
    "\\[ci skip\\]",
    "\\\\[skip ci\\\\]",
    "\\\\[ci skip\\\\]",
];

/// True iff `text` contains a skip-ci marker.
///
/// Matching is a case-sensitive substring search: `[SKIP CI]` or
/// `[ skip ci ]` do not count.
///
/// ```rust
/// use hook_relay_core::is_skip_build_by_commit_message;
///
/// assert!(is_skip_build_by_commit_message("fix typo [skip ci]"));
/// assert!(!is_skip_build_by_commit_message("fix typo [Skip CI]"));
/// ```
pub fn is_skip_build_by_commit_message(text: &str) -> bool {
    SKIP_MARKERS.iter().any(|marker| text.contains(marker))
}

#[cfg(test)]
#[path = "skip_ci_tests.rs"]
mod tests;
