//! Translation domain.
//!
//! - `engine`: runs queued translation tasks
//! - `readme`: README language switcher rewriting
//! - `path`: destination path convention
//! - `languages`: supported languages and display names
//! - `types`: task, job payload and outcome records

pub mod engine;
pub mod languages;
pub mod path;
pub mod readme;
pub mod types;

pub use engine::{EngineConfig, ReadmePlacement, TranslationEngine, TranslationQueue};
pub use languages::{SUPPORTED_LANGUAGES, language_name};
pub use path::get_translated_path;
pub use readme::{find_insert_position, generate_language_links, insert_language_links};
pub use types::{
    FileStatus, TaskKind, TaskProgress, TaskStatus, TaskSummary, TranslatedFile, TranslationJob,
    TranslationTask,
};
