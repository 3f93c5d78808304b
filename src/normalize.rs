//! Title normalization
//!
//! Strips episode and season noise from raw history titles so catalog
//! searches hit the parent work. Pure and deterministic; callers keep the
//! original title as the fallback merge key when no match is found.

use regex::Regex;
use std::sync::OnceLock;

fn episode_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*:?\s*S\d+\s*:\s*E\d+.*$").unwrap())
}

fn season_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*:\s*(season|series|part|volume|chapter|book)\s+\d+.*$").unwrap()
    })
}

fn parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)").unwrap())
}

fn limited_series_tail() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*:?\s*limited series\s*$").unwrap())
}

/// Normalize a raw history title for catalog lookup
///
/// Removes parenthetical annotations, trailing `S<n>:E<n>` markers,
/// `: Season <n>` style segments, a trailing "Limited Series" qualifier,
/// and finally anything after the first remaining colon (episode names).
/// Falls back to the trimmed input if stripping would leave nothing.
pub fn normalize_title(raw: &str) -> String {
    let mut title = parenthetical().replace_all(raw, "").into_owned();
    title = episode_marker().replace(&title, "").into_owned();
    title = season_segment().replace(&title, "").into_owned();
    title = limited_series_tail().replace(&title, "").into_owned();

    // Whatever follows the first colon is an episode name
    if let Some(idx) = title.find(':') {
        title.truncate(idx);
    }

    let title = title.trim();
    if title.is_empty() {
        raw.trim().to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_episode_marker() {
        assert_eq!(normalize_title("Show S1:E2"), "Show");
        assert_eq!(normalize_title("Show: S2:E10 The End"), "Show");
    }

    #[test]
    fn test_strips_season_segment() {
        assert_eq!(normalize_title("Breaking Bad: Season 1: Pilot"), "Breaking Bad");
        assert_eq!(normalize_title("Dark: Season 2: Episode 3"), "Dark");
    }

    #[test]
    fn test_strips_parentheticals() {
        assert_eq!(normalize_title("Show (Limited Series)"), "Show");
        assert_eq!(normalize_title("The Office (U.S.)"), "The Office");
    }

    #[test]
    fn test_strips_limited_series_qualifier() {
        assert_eq!(normalize_title("Unbelievable: Limited Series"), "Unbelievable");
    }

    #[test]
    fn test_strips_episode_name_after_colon() {
        assert_eq!(normalize_title("The Crown: The Balmoral Test"), "The Crown");
    }

    #[test]
    fn test_plain_title_untouched() {
        assert_eq!(normalize_title("The Matrix"), "The Matrix");
        assert_eq!(normalize_title("  Dune  "), "Dune");
    }

    #[test]
    fn test_never_returns_empty() {
        assert_eq!(normalize_title("(2024)"), "(2024)");
        assert_eq!(normalize_title(": Pilot"), ": Pilot");
    }

    #[test]
    fn test_deterministic() {
        let a = normalize_title("Show: Season 3: Finale (Director's Cut)");
        let b = normalize_title("Show: Season 3: Finale (Director's Cut)");
        assert_eq!(a, b);
        assert_eq!(a, "Show");
    }
}
