//! Supported target languages.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    /// Name in the language itself, used for switcher links.
    pub native_name: &'static str,
    pub english_name: &'static str,
}

const fn lang(code: &'static str, native_name: &'static str, english_name: &'static str) -> Language {
    Language {
        code,
        native_name,
        english_name,
    }
}

pub const SUPPORTED_LANGUAGES: &[Language] = &[
    lang("en", "English", "English"),
    lang("zh-CN", "简体中文", "Chinese (Simplified)"),
    lang("zh-TW", "繁體中文", "Chinese (Traditional)"),
    lang("ja", "日本語", "Japanese"),
    lang("ko", "한국어", "Korean"),
    lang("es", "Español", "Spanish"),
    lang("fr", "Français", "French"),
    lang("de", "Deutsch", "German"),
    lang("pt", "Português", "Portuguese"),
    lang("ru", "Русский", "Russian"),
    lang("ar", "العربية", "Arabic"),
    lang("hi", "हिन्दी", "Hindi"),
    lang("it", "Italiano", "Italian"),
    lang("nl", "Nederlands", "Dutch"),
    lang("pl", "Polski", "Polish"),
    lang("tr", "Türkçe", "Turkish"),
    lang("vi", "Tiếng Việt", "Vietnamese"),
    lang("th", "ไทย", "Thai"),
    lang("id", "Bahasa Indonesia", "Indonesian"),
    lang("ms", "Bahasa Melayu", "Malay"),
];

pub fn find_language(code: &str) -> Option<&'static Language> {
    SUPPORTED_LANGUAGES.iter().find(|l| l.code == code)
}

/// Native display name, or the code itself for unknown languages.
pub fn language_name(code: &str) -> &str {
    find_language(code).map(|l| l.native_name).unwrap_or(code)
}
