//! Destination paths for translated files.

/// Directory under the repository root that holds every translation.
pub const TRANSLATIONS_DIR: &str = "translations";

/// Where the `target_lang` translation of `source_path` is written.
///
/// Pure string construction; the source path is not normalized.
pub fn get_translated_path(source_path: &str, target_lang: &str) -> String {
    format!("{TRANSLATIONS_DIR}/{target_lang}/{source_path}")
}
