//! Pattern matching strategy used by `hears` and pattern-branch questions.

use regex::RegexBuilder;
use std::fmt::Debug;
use tracing::warn;

use crate::message::IncomingMessage;

/// Outcome of testing a message against a list of patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// The first pattern that matched, if any.
    pub matched: Option<String>,
    /// Capture groups of that match; index 0 is the whole match.
    pub captures: Vec<String>,
}

impl MatchResult {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Decides whether a message matches any of a list of patterns.
///
/// Swap the controller-wide matcher with `Controller::change_ears` to plug in
/// intent classification without touching conversation code.
pub trait Matcher: Send + Sync + Debug {
    fn test(&self, patterns: &[String], message: &IncomingMessage) -> MatchResult;
}

/// Case-insensitive regular expression matching, first pattern wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexMatcher;

impl Matcher for RegexMatcher {
    fn test(&self, patterns: &[String], message: &IncomingMessage) -> MatchResult {
        let text = message.text();
        for pattern in patterns {
            let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => regex,
                Err(e) => {
                    warn!("Skipping invalid pattern {pattern:?}: {e}");
                    continue;
                }
            };
            if let Some(caps) = regex.captures(text) {
                return MatchResult {
                    matched: Some(pattern.clone()),
                    captures: caps
                        .iter()
                        .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                        .collect(),
                };
            }
        }
        MatchResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn matches_case_insensitively_with_captures() {
        let msg = IncomingMessage::new("u", "c", "Call me ADA please");
        let result = RegexMatcher.test(&patterns(&["call me (\\w+)"]), &msg);
        assert_eq!(result.matched.as_deref(), Some("call me (\\w+)"));
        assert_eq!(result.captures, vec!["Call me ADA", "ADA"]);
    }

    #[test]
    fn first_matching_pattern_wins() {
        let msg = IncomingMessage::new("u", "c", "yes and no");
        let result = RegexMatcher.test(&patterns(&["no", "yes"]), &msg);
        assert_eq!(result.matched.as_deref(), Some("no"));
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let msg = IncomingMessage::new("u", "c", "hello");
        let result = RegexMatcher.test(&patterns(&["(", "hel+o"]), &msg);
        assert!(result.is_match());
        assert_eq!(result.matched.as_deref(), Some("hel+o"));
    }

    #[test]
    fn no_match_is_empty() {
        let msg = IncomingMessage::new("u", "c", "maybe");
        assert_eq!(
            RegexMatcher.test(&patterns(&["^yes$", "^no$"]), &msg),
            MatchResult::default()
        );
    }
}
