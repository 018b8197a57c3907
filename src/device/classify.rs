//! Message classifiers for the device's free-text status replies.
//!
//! `/cams_status` and `/preview_status` have no structured running/active
//! field; the only signal is a human-readable `message`. Each classifier is
//! an ordered rule table evaluated against the lower-cased message. The first
//! matching rule wins; a message that matches nothing is classified `false`.

/// A single substring rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    /// Substring that must be present.
    pub needle: &'static str,
    /// Substring that must be absent for the rule to match.
    pub unless: Option<&'static str>,
    /// Classification when the rule matches.
    pub verdict: bool,
}

impl Rule {
    const fn is(needle: &'static str, verdict: bool) -> Self {
        Self {
            needle,
            unless: None,
            verdict,
        }
    }

    const fn is_without(needle: &'static str, unless: &'static str, verdict: bool) -> Self {
        Self {
            needle,
            unless: Some(unless),
            verdict,
        }
    }

    fn matches(&self, message: &str) -> bool {
        message.contains(self.needle) && self.unless.map_or(true, |u| !message.contains(u))
    }
}

/// Rules for `/cams_status` messages. Negative phrasings come first so that
/// "cams not running" or "not started" never hit a positive rule.
pub const CAMS_RULES: &[Rule] = &[
    Rule::is("not running", false),
    Rule::is("not started", false),
    Rule::is("stopped", false),
    Rule::is("cams are running", true),
    Rule::is("are running", true),
    Rule::is_without("running", "not", true),
    Rule::is("started", true),
];

/// Rules for `/preview_status` messages.
pub const PREVIEW_RULES: &[Rule] = &[
    Rule::is("not active", false),
    Rule::is("inactive", false),
    Rule::is("preview is active", true),
    Rule::is("preview active", true),
    Rule::is_without("active", "not", true),
    Rule::is_without("running", "not", true),
];

/// Evaluate `rules` in order against `message`. Total: unmatched → `false`.
pub fn classify(message: &str, rules: &[Rule]) -> bool {
    let message = message.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&message))
        .map(|rule| rule.verdict)
        .unwrap_or(false)
}

/// Whether a `/cams_status` message says the cameras are running.
pub fn cams_running(message: &str) -> bool {
    classify(message, CAMS_RULES)
}

/// Whether a `/preview_status` message says the preview is active.
pub fn preview_active(message: &str) -> bool {
    classify(message, PREVIEW_RULES)
}
