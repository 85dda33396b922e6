//! Page condition detection
//!
//! Markers are plain substrings of the rendered page. Not-found wins over the
//! challenge marker, since a missing channel never clears.

use crate::config::ScraperConfig;

/// What a fetched page shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCondition {
    /// The channel does not exist
    NotFound,
    /// An anti-automation interstitial is in front of the chat
    Challenge,
    /// Chat content can be parsed
    Ready,
}

/// Substring classifier for fetched pages
#[derive(Debug, Clone)]
pub struct PageClassifier {
    not_found: String,
    challenge: String,
}

impl PageClassifier {
    /// Classifier with explicit markers
    pub fn new(not_found: impl Into<String>, challenge: impl Into<String>) -> Self {
        Self {
            not_found: not_found.into(),
            challenge: challenge.into(),
        }
    }

    /// Classifier using the markers in `config`
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(&config.not_found_marker, &config.challenge_marker)
    }

    /// Classify one page snapshot
    pub fn classify(&self, page: &str) -> PageCondition {
        if !self.not_found.is_empty() && page.contains(&self.not_found) {
            PageCondition::NotFound
        } else if self.is_challenge(page) {
            PageCondition::Challenge
        } else {
            PageCondition::Ready
        }
    }

    /// Whether the challenge marker is present
    pub fn is_challenge(&self, page: &str) -> bool {
        !self.challenge.is_empty() && page.contains(&self.challenge)
    }
}

impl Default for PageClassifier {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}
