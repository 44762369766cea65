//! Build-time configuration for [`crate::ParserGenerator`] and [`crate::LexerGenerator`].

use std::path::PathBuf;

/// Options controlling how `build()` behaves.
///
/// Mirrors the shape of a conventional code-generator settings struct: a
/// handful of knobs with sane defaults, constructed with `..Default::default()`.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Directory used for the on-disk LALR table cache. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Identifier distinguishing this grammar's cache file from others sharing
    /// `cache_dir` (e.g. a crate name). Required when `cache_dir` is set.
    pub cache_id: Option<String>,
    /// Promote generator warnings (unused terminals, conflicts, ...) to a
    /// build-time error instead of a logged diagnostic.
    pub warnings_as_errors: bool,
    /// Whether the default lexer skips runs of ASCII whitespace between
    /// tokens when no explicit `ignore` rule is registered.
    pub skip_whitespace: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_id: None,
            warnings_as_errors: false,
            skip_whitespace: false,
        }
    }
}
