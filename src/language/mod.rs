//! Language helpers used by the message router.
//!
//! Both providers are traits so a real detector or translation backend can be
//! plugged into `AppState` without touching the routing code.

pub mod detect;
pub mod translate;

pub use detect::{classify, LanguageDetector, ScriptDetector, UNKNOWN_LANGUAGE};
pub use translate::{SimulatedTranslator, TranslateError, Translator};
