//! Key translation
//!
//! Pure functions mapping per-user logical paths to object store keys.
//! No I/O happens here.

pub mod path;
mod translator;

pub use path::{ensure_trailing_slash, is_directory, is_root, normalize, normalize_directory, parent_of, ROOT};
pub use translator::{key_to_path, name_of, parent_path_of, KeyTranslator, Namespace};
