//! User-agent pattern bot detection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ports::BotDetector;

/// Substrings that mark a user agent as automated, matched case-insensitively.
const BOT_PATTERNS: [&str; 10] = [
    "bot",
    "crawl",
    "spider",
    "slurp",
    "mediapartners",
    "headless",
    "phantom",
    "selenium",
    "webdriver",
    "scraper",
];

static BOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    let alternation = BOT_PATTERNS.join("|");
    Regex::new(&format!("(?i)(?:{})", alternation)).expect("bot patterns are plain words")
});

/// Flags requests whose `User-Agent` is missing, blank, or looks automated.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentBotDetector;

impl UserAgentBotDetector {
    pub fn new() -> Self {
        Self
    }
}

impl BotDetector for UserAgentBotDetector {
    fn is_bot(&self, user_agent: Option<&str>) -> bool {
        match user_agent {
            None => true,
            Some(ua) if ua.trim().is_empty() => true,
            Some(ua) => BOT_REGEX.is_match(ua),
        }
    }
}
