//! Headline text helpers.
//!
//! Editorial markup wraps headlines across lines and pads them with
//! whitespace, and the article page may phrase the tail differently from the
//! home teaser. Comparisons therefore work on a normalized, lowercased prefix.

use std::sync::LazyLock;

use regex::Regex;

/// Characters of the home headline that must reappear in the article title.
pub const HEADLINE_PREFIX_CHARS: usize = 20;

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Collapse every whitespace run (newlines included) to one space and trim.
pub fn normalize_headline(raw: &str) -> String {
    WHITESPACE_RUNS.replace_all(raw.trim(), " ").into_owned()
}

/// Whether `article_title` contains the first `prefix_chars` characters of
/// `headline`, ignoring case and whitespace layout.
///
/// An empty headline never matches.
pub fn headline_matches(article_title: &str, headline: &str, prefix_chars: usize) -> bool {
    let headline = normalize_headline(headline).to_lowercase();
    if headline.is_empty() {
        return false;
    }
    let prefix: String = headline.chars().take(prefix_chars).collect();
    normalize_headline(article_title)
        .to_lowercase()
        .contains(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_line_breaks_and_runs() {
        assert_eq!(
            normalize_headline("  Flamengo vence\n  o clássico\t no Maracanã \n"),
            "Flamengo vence o clássico no Maracanã"
        );
    }

    #[test]
    fn non_breaking_spaces_count_as_whitespace() {
        assert_eq!(
            normalize_headline("Copa\u{a0}\u{a0}do Brasil\u{a0}"),
            "Copa do Brasil"
        );
    }

    #[test]
    fn prefix_match_ignores_case_and_tail() {
        let home = "Corinthians anuncia\nnovo técnico para 2025";
        let article = "CORINTHIANS ANUNCIA NOVO técnico; veja quem chega";
        assert!(headline_matches(article, home, HEADLINE_PREFIX_CHARS));
    }

    #[test]
    fn prefix_is_counted_in_characters() {
        // "ção" is multi-byte; slicing by bytes would split it.
        let home = "Seleção convoca atacantes";
        assert!(headline_matches("Seleção convoca", home, 15));
        assert!(!headline_matches("Seleção", home, 15));
    }

    #[test]
    fn different_story_does_not_match() {
        assert!(!headline_matches(
            "Palmeiras vence fora de casa",
            "Corinthians anuncia novo técnico",
            HEADLINE_PREFIX_CHARS
        ));
    }

    #[test]
    fn blank_headline_never_matches() {
        assert!(!headline_matches("Qualquer título", " \n ", HEADLINE_PREFIX_CHARS));
    }
}
