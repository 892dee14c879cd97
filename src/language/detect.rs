/// Returned by the router when a detector gives up on a text.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

const DEVANAGARI: std::ops::RangeInclusive<char> = '\u{0900}'..='\u{097F}';

/// Classify a text by script.
///
/// Any Devanagari code point makes the text "Hindi"; everything else,
/// including the empty string, is "English". Pure and allocation-free.
pub fn classify(text: &str) -> &'static str {
    if contains_devanagari(text) {
        "Hindi"
    } else {
        "English"
    }
}

pub(crate) fn contains_devanagari(text: &str) -> bool {
    text.chars().any(|c| DEVANAGARI.contains(&c))
}

/// Language-detection provider.
///
/// Must be synchronous and fast: it runs inline on every chat message.
/// Returning `None` means the provider could not decide; the router tags the
/// message with [`UNKNOWN_LANGUAGE`] in that case.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Default detector backed by [`classify`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptDetector;

impl LanguageDetector for ScriptDetector {
    fn detect(&self, text: &str) -> Option<String> {
        Some(classify(text).to_string())
    }
}
