//! Content matching for extracting passcodes from message bodies.
//!
//! The engine only needs one heuristic, [`OtpMatcher`]: the first run of 5 or
//! 6 ASCII digits bounded by word boundaries. The [`Matcher`] trait lets
//! callers plug in a stricter rule without touching the engine.
//!
//! # Example
//!
//! ```
//! use mailbox_otp::matcher::{Matcher, OtpMatcher};
//!
//! let otp = OtpMatcher::new();
//! assert_eq!(otp.find_match("Your code is 482913 today").as_deref(), Some("482913"));
//! assert_eq!(otp.find_match("Order #1234 shipped"), None);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Trait for matching and extracting content from message bodies.
///
/// # Example
///
/// ```
/// use mailbox_otp::matcher::Matcher;
/// use std::borrow::Cow;
///
/// struct KeywordMatcher;
///
/// impl Matcher for KeywordMatcher {
///     fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
///         text.split_once("code: ").map(|(_, rest)| Cow::Borrowed(rest.trim()))
///     }
///
///     fn description(&self) -> &str {
///         "keyword code"
///     }
/// }
/// ```
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Returns `Some(matched_value)` if found, `None` otherwise.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Regex-based matcher that extracts the first capture group.
///
/// # Example
///
/// ```
/// use mailbox_otp::matcher::{RegexMatcher, Matcher};
///
/// let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
/// assert_eq!(matcher.find_match("Your code: 42"), Some("42".into()));
/// ```
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a new regex matcher.
    ///
    /// The first capture group is the match result.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    /// Creates a new regex matcher with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
        })
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Pattern for a word-bounded run of 5 or 6 ASCII digits.
const OTP_PATTERN: &str = r"\b([0-9]{5,6})\b";

static DEFAULT_OTP: Lazy<RegexMatcher> = Lazy::new(|| {
    RegexMatcher::with_description(OTP_PATTERN, "5-6 digit OTP code").expect("valid regex")
});

/// Matcher for numeric one-time passcodes.
///
/// No context keyword or checksum is required: any isolated 5 or 6 digit run
/// qualifies, so order numbers and postcodes can produce false positives.
#[derive(Debug, Clone)]
pub struct OtpMatcher {
    inner: RegexMatcher,
}

impl OtpMatcher {
    /// Creates the default 5-6 digit matcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DEFAULT_OTP.clone(),
        }
    }

    /// Creates a matcher for codes of `min..=max` digits.
    ///
    /// # Panics
    ///
    /// Panics if `min` is 0 or greater than `max`.
    #[must_use]
    pub fn digits(min: usize, max: usize) -> Self {
        assert!(min > 0 && min <= max, "invalid digit range {min}..={max}");
        let pattern = format!(r"\b([0-9]{{{min},{max}}})\b");
        Self {
            inner: RegexMatcher::with_description(&pattern, format!("{min}-{max} digit OTP code"))
                .expect("valid regex"),
        }
    }
}

impl Default for OtpMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for OtpMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.inner.find_match(text)
    }

    fn description(&self) -> &str {
        self.inner.description()
    }
}

/// Runs `matcher` on the plain-text body, then on the HTML body.
///
/// The plain-text result wins whenever both contain a match.
pub fn match_bodies(matcher: &dyn Matcher, plain: &str, html: &str) -> Option<String> {
    matcher
        .find_match(plain)
        .or_else(|| matcher.find_match(html))
        .map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_matcher() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        assert_eq!(
            matcher.find_match("Your code: 12345").as_deref(),
            Some("12345")
        );
        assert_eq!(matcher.find_match("No code here"), None);
    }

    #[test]
    fn test_otp_six_digit() {
        let otp = OtpMatcher::new();
        assert_eq!(
            otp.find_match("Your code is 482913 today").as_deref(),
            Some("482913")
        );
        assert_eq!(otp.find_match("OTP: 739201").as_deref(), Some("739201"));
        assert_eq!(otp.find_match("Code 482913.").as_deref(), Some("482913"));
    }

    #[test]
    fn test_otp_five_digit() {
        let otp = OtpMatcher::new();
        assert_eq!(otp.find_match("PIN 12345 expires").as_deref(), Some("12345"));
    }

    #[test]
    fn test_otp_rejects_other_lengths() {
        let otp = OtpMatcher::new();
        assert_eq!(otp.find_match("Order 1234 shipped"), None);
        assert_eq!(otp.find_match("Tracking 1234567"), None);
        assert_eq!(otp.find_match("no digits at all"), None);
        // digits glued to letters are not word-bounded
        assert_eq!(otp.find_match("ref A123456"), None);
    }

    #[test]
    fn test_otp_first_match_wins() {
        let otp = OtpMatcher::new();
        assert_eq!(
            otp.find_match("first 11111 then 222222").as_deref(),
            Some("11111")
        );
    }

    #[test]
    fn test_otp_ignores_non_ascii_digits() {
        let otp = OtpMatcher::new();
        assert_eq!(otp.find_match("code ١٢٣٤٥٦"), None);
    }

    #[test]
    fn test_otp_digits_range() {
        let otp = OtpMatcher::digits(4, 4);
        assert_eq!(otp.find_match("PIN: 1234").as_deref(), Some("1234"));
        assert_eq!(otp.find_match("PIN: 12345"), None);
    }

    #[test]
    fn test_plain_takes_precedence() {
        let otp = OtpMatcher::new();
        let result = match_bodies(&otp, "code 111111", "<p>code 222222</p>");
        assert_eq!(result.as_deref(), Some("111111"));
    }

    #[test]
    fn test_html_fallback() {
        let otp = OtpMatcher::new();
        let result = match_bodies(&otp, "see the HTML version", "<b>654321</b>");
        assert_eq!(result.as_deref(), Some("654321"));
        assert_eq!(match_bodies(&otp, "", ""), None);
    }

    #[test]
    fn test_regex_matcher_returns_borrowed() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        let result = matcher.find_match("Your code: 12345");
        assert!(matches!(result, Some(Cow::Borrowed(_))));
    }
}
