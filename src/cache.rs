//! On-disk cache for built LALR tables, keyed by a structural fingerprint of
//! the grammar. Building a table is the expensive part of `build()`; for
//! grammars that don't change between runs (the common case once a grammar
//! is stable) this lets repeated process starts skip straight to a
//! deserialized [`LrTable`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::error::{GeneratorResult, Warning};
use crate::grammar::Grammar;
use crate::table::{self, LrTable};

/// A structural hash of everything that affects the generated table: terminal
/// names and precedences, and every production's lhs/rhs/precedence. The
/// semantic actions attached to productions are deliberately excluded --
/// they're `Box<dyn Fn>` and can't be hashed, and two builds of the same
/// grammar with differently-implemented actions still want the same table.
fn fingerprint<V, S>(grammar: &Grammar<V, S>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for term in grammar.terminals.iter() {
        term.name.hash(&mut hasher);
        term.precedence.assoc.hash(&mut hasher);
        term.precedence.level.hash(&mut hasher);
    }
    for prod in grammar.productions.iter() {
        prod.lhs.hash(&mut hasher);
        for sym in &prod.rhs {
            sym.hash(&mut hasher);
        }
        prod.precedence.assoc.hash(&mut hasher);
        prod.precedence.level.hash(&mut hasher);
    }
    hasher.finish()
}

/// What's actually written to disk: the fingerprint the table was built from
/// plus the table itself. The fingerprint is checked before trusting the
/// cached table; a mismatch (the grammar changed) falls back to a fresh build.
#[derive(serde::Serialize, serde::Deserialize)]
struct CacheDocument {
    fingerprint: u64,
    table: LrTable,
}

fn cache_path(dir: &Path, id: &str) -> std::path::PathBuf {
    dir.join(format!("{id}.lalr-cache.json"))
}

/// Loads a cached table for `grammar` if one exists at `dir/<id>...` and its
/// fingerprint still matches; otherwise builds a fresh table and writes it
/// back. The write is atomic (temp file + rename) so a crash mid-write never
/// leaves a corrupt cache file for the next run to trip over.
pub fn load_or_build<V, S>(
    dir: &Path,
    id: &str,
    grammar: &Grammar<V, S>,
) -> GeneratorResult<(LrTable, Vec<Warning>)> {
    let fp = fingerprint(grammar);
    let path = cache_path(dir, id);

    if let Ok(bytes) = std::fs::read(&path) {
        match serde_json::from_slice::<CacheDocument>(&bytes) {
            Ok(doc) if doc.fingerprint == fp => {
                log::debug!("loaded cached LALR table from {}", path.display());
                return Ok((doc.table, Vec::new()));
            }
            Ok(_) => log::debug!("cache at {} is stale, rebuilding", path.display()),
            Err(e) => log::warn!("cache at {} is unreadable ({e}), rebuilding", path.display()),
        }
    }

    let (table, warnings) = table::build(grammar);

    std::fs::create_dir_all(dir)?;
    let doc = CacheDocument {
        fingerprint: fp,
        table,
    };
    let serialized = serde_json::to_vec(&doc)?;
    let tmp_path = dir.join(format!("{id}.lalr-cache.json.tmp-{}", std::process::id()));
    std::fs::write(&tmp_path, &serialized)?;
    std::fs::rename(&tmp_path, &path)?;
    log::debug!("wrote LALR table cache to {}", path.display());

    Ok((doc.table, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::parser::Value;

    fn noop() -> Box<dyn Fn(&mut (), Vec<Value<i64>>) -> i64 + Send + Sync> {
        Box::new(|_s, _v| 0)
    }

    fn build_grammar() -> Grammar<i64, ()> {
        let mut g: Grammar<i64, ()> = Grammar::new();
        g.add_terminal("id").unwrap();
        g.add_production("S", &["id"], noop(), None).unwrap();
        g.set_start("S").unwrap();
        g
    }

    #[test]
    fn test_fingerprint_is_stable_across_builds() {
        let g1 = build_grammar();
        let g2 = build_grammar();
        assert_eq!(fingerprint(&g1), fingerprint(&g2));
    }

    #[test]
    fn test_fingerprint_changes_with_precedence() {
        let g1 = build_grammar();
        let mut g2: Grammar<i64, ()> = Grammar::new();
        g2.add_terminal("id").unwrap();
        g2.set_precedence("id", crate::grammar::Assoc::Left, 1).unwrap();
        g2.add_production("S", &["id"], noop(), None).unwrap();
        g2.set_start("S").unwrap();
        assert_ne!(fingerprint(&g1), fingerprint(&g2));
    }

    #[test]
    fn test_load_or_build_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("parsegen-cache-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let g = build_grammar();
        let (table1, warnings1) = load_or_build(&dir, "test-grammar", &g).unwrap();
        assert!(warnings1.is_empty());
        assert!(!table1.actions.is_empty());

        // Second call should hit the cache and return an equivalent table.
        let (table2, warnings2) = load_or_build(&dir, "test-grammar", &g).unwrap();
        assert!(warnings2.is_empty());
        assert_eq!(table1.actions.len(), table2.actions.len());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
