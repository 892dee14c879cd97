use thiserror::Error;

use super::detect::contains_devanagari;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation backend failed: {0}")]
    Backend(String),
}

/// Translation provider consumed by the `translate` event.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError>;
}

/// Offline translator with a handful of canned phrases.
///
/// Covers English <-> Hindi greetings; anything else comes back wrapped in a
/// `[Translation to <lang>: ...]` marker so the UI can still show something.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTranslator;

const HINDI_TO_ENGLISH: &[(&str, &str)] = &[
    ("नमस्ते", "Hello"),
    ("कैसे हो", "How are you"),
    ("धन्यवाद", "Thank you"),
];

const ENGLISH_TO_HINDI: &[(&str, &str)] = &[
    ("hello", "नमस्ते"),
    ("how are you", "आप कैसे हैं"),
    ("thank you", "धन्यवाद"),
];

impl Translator for SimulatedTranslator {
    fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError> {
        let is_hindi = contains_devanagari(text);
        match target_language {
            "English" if is_hindi => {
                let phrase = HINDI_TO_ENGLISH
                    .iter()
                    .find(|(hi, _)| text.contains(hi))
                    .map(|(_, en)| *en)
                    .unwrap_or("This is a translation from Hindi to English");
                Ok(phrase.to_string())
            }
            "Hindi" if !is_hindi => {
                let lower = text.to_lowercase();
                let phrase = ENGLISH_TO_HINDI
                    .iter()
                    .find(|(en, _)| lower.contains(en))
                    .map(|(_, hi)| *hi)
                    .unwrap_or("यह अंग्रेजी से हिंदी का अनुवाद है");
                Ok(phrase.to_string())
            }
            _ => Ok(format!("[Translation to {}: {}]", target_language, text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hindi_greeting_to_english() {
        let out = SimulatedTranslator.translate("नमस्ते जी", "English").unwrap();
        assert_eq!(out, "Hello");
    }

    #[test]
    fn test_english_to_hindi_is_case_insensitive() {
        let out = SimulatedTranslator.translate("Thank You!", "Hindi").unwrap();
        assert_eq!(out, "धन्यवाद");
    }

    #[test]
    fn test_unknown_hindi_phrase_gets_generic_english() {
        let out = SimulatedTranslator.translate("मकान", "English").unwrap();
        assert_eq!(out, "This is a translation from Hindi to English");
    }

    #[test]
    fn test_same_language_is_wrapped() {
        let out = SimulatedTranslator.translate("Hello", "English").unwrap();
        assert_eq!(out, "[Translation to English: Hello]");
    }

    #[test]
    fn test_other_target_is_wrapped() {
        let out = SimulatedTranslator.translate("Hello", "Tamil").unwrap();
        assert_eq!(out, "[Translation to Tamil: Hello]");
    }

    #[test]
    fn test_empty_text_gets_canned_fallback() {
        assert_eq!(
            SimulatedTranslator.translate("", "Hindi").unwrap(),
            "यह अंग्रेजी से हिंदी का अनुवाद है"
        );
        assert_eq!(
            SimulatedTranslator.translate("", "English").unwrap(),
            "[Translation to English: ]"
        );
    }
}
