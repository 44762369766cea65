//! The grammar model: symbols, productions, precedence, and the FIRST/FOLLOW
//! fixpoint computations that later stages of table construction depend on.

use indexmap::{IndexMap, IndexSet};
use std::cell::Cell;

use crate::error::{GeneratorError, GeneratorResult};
use crate::index::{NonTermIndex, NonTermVec, ProdIndex, ProdVec, SymbolIndex, TermIndex, TermVec};

/// Synthetic end-of-input terminal, always terminal index 0.
pub const END_SYMBOL: &str = "$end";
/// Reserved terminal usable in productions wanting to mention error recovery
/// points; never triggers an "unused terminal" warning. No implicit lexer
/// rule is associated with it (see design notes on error recovery).
pub const ERROR_SYMBOL: &str = "error";
/// Name of the synthesised augmented start nonterminal, nonterminal index 0.
pub const AUGMENTED_START: &str = "S'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    NonAssoc,
}

impl std::str::FromStr for Assoc {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Assoc::Left),
            "right" => Ok(Assoc::Right),
            "nonassoc" => Ok(Assoc::NonAssoc),
            other => Err(GeneratorError::InvalidAssociativity(other.to_string())),
        }
    }
}

/// A production's (or terminal's) precedence. Level `0` means "no precedence
/// declared" and never wins a comparison against a declared level; this
/// asymmetry with user levels (which start at 1) is intentional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    pub assoc: Assoc,
    pub level: u32,
}

impl Precedence {
    pub const NONE: Precedence = Precedence {
        assoc: Assoc::Right,
        level: 0,
    };

    pub fn is_none(&self) -> bool {
        self.level == 0
    }
}

impl Default for Precedence {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone)]
pub struct Terminal {
    pub idx: TermIndex,
    pub name: String,
    pub precedence: Precedence,
}

#[derive(Debug, Clone)]
pub struct NonTerminal {
    pub idx: NonTermIndex,
    pub name: String,
    pub productions: Vec<ProdIndex>,
}

/// A grammar rewrite rule `lhs -> rhs` with an attached semantic action.
///
/// `action` and the optional threaded parser state are generic over the
/// grammar's chosen output type `V` and state type `S`; see
/// [`crate::parser::Value`] for how reduced values and shifted tokens share a
/// stack.
pub struct Production<V, S> {
    pub idx: ProdIndex,
    pub lhs: NonTermIndex,
    pub rhs: Vec<SymbolIndex>,
    pub precedence: Precedence,
    pub action: Box<dyn Fn(&mut S, Vec<crate::parser::Value<V>>) -> V + Send + Sync>,
    /// Marker flipped by `closure()` to avoid a per-call membership set; see
    /// design notes on counter-based set membership.
    pub(crate) last_closure_stamp: Cell<u64>,
}

impl<V, S> std::fmt::Debug for Production<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Production")
            .field("idx", &self.idx)
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .field("precedence", &self.precedence)
            .finish()
    }
}


/// The grammar being assembled. `V` is the single output type every
/// production's semantic action returns; `S` is an optional user-supplied
/// state object threaded through every action call (use `()` if unneeded).
pub struct Grammar<V, S> {
    pub terminals: TermVec<Terminal>,
    pub nonterminals: NonTermVec<NonTerminal>,
    pub productions: ProdVec<Production<V, S>>,
    pub start: Option<NonTermIndex>,
    symbol_names: IndexMap<String, SymbolIndex>,
}

fn res_symbol_name<V, S>(grammar: &Grammar<V, S>, sym: SymbolIndex) -> &str {
    if grammar.is_term(sym) {
        &grammar.terminals[grammar.symbol_to_term(sym)].name
    } else {
        &grammar.nonterminals[grammar.symbol_to_nonterm(sym)].name
    }
}

impl<V, S> Grammar<V, S> {
    pub fn new() -> Self {
        let mut g = Self {
            terminals: TermVec::new(),
            nonterminals: NonTermVec::new(),
            productions: ProdVec::new(),
            start: None,
            symbol_names: IndexMap::new(),
        };
        // $end is always terminal 0, `error` is always terminal 1. Neither
        // participates in "unused terminal" warnings.
        g.register_terminal(END_SYMBOL, Precedence::NONE)
            .expect("reserved terminal registration cannot fail");
        g.register_terminal(ERROR_SYMBOL, Precedence::NONE)
            .expect("reserved terminal registration cannot fail");
        g
    }

    fn register_terminal(&mut self, name: &str, precedence: Precedence) -> GeneratorResult<TermIndex> {
        if self.symbol_names.contains_key(name) {
            return Err(GeneratorError::DuplicateTerminal(name.to_string()));
        }
        let idx = TermIndex(self.terminals.len());
        self.terminals.push(Terminal {
            idx,
            name: name.to_string(),
            precedence,
        });
        self.symbol_names.insert(name.to_string(), idx.to_symbol_index());
        Ok(idx)
    }

    pub fn add_terminal(&mut self, name: &str) -> GeneratorResult<TermIndex> {
        self.register_terminal(name, Precedence::NONE)
    }

    pub fn set_precedence(&mut self, term: &str, assoc: Assoc, level: u32) -> GeneratorResult<()> {
        let idx = match self.symbol_names.get(term) {
            Some(&sym) if self.is_term(sym) => self.symbol_to_term(sym),
            _ => return Err(GeneratorError::UnknownSymbol(term.to_string())),
        };
        if !self.terminals[idx].precedence.is_none() {
            return Err(GeneratorError::PrecedenceAlreadySet(term.to_string()));
        }
        self.terminals[idx].precedence = Precedence { assoc, level };
        Ok(())
    }

    fn get_or_add_nonterminal(&mut self, name: &str) -> GeneratorResult<NonTermIndex> {
        if let Some(&sym) = self.symbol_names.get(name) {
            if self.is_term(sym) {
                return Err(GeneratorError::ProductionNameIsTerminal(name.to_string()));
            }
            return Ok(self.symbol_to_nonterm(sym));
        }
        let idx = NonTermIndex(self.nonterminals.len());
        self.nonterminals.push(NonTerminal {
            idx,
            name: name.to_string(),
            productions: vec![],
        });
        self.symbol_names
            .insert(name.to_string(), idx.to_symbol_index(self.terminals.len()));
        Ok(idx)
    }

    fn resolve_symbol(&mut self, name: &str) -> SymbolIndex {
        if let Some(&sym) = self.symbol_names.get(name) {
            sym
        } else {
            // Forward reference to a nonterminal not yet defined by any
            // production: register it now, it may get productions later.
            let idx = NonTermIndex(self.nonterminals.len());
            self.nonterminals.push(NonTerminal {
                idx,
                name: name.to_string(),
                productions: vec![],
            });
            let sym = idx.to_symbol_index(self.terminals.len());
            self.symbol_names.insert(name.to_string(), sym);
            sym
        }
    }

    /// Registers one production `name -> rhs` with `action`. `explicit_prec`
    /// names a terminal whose declared precedence overrides the default
    /// "rightmost terminal in rhs" rule (or `(right, 0)` if there is none).
    pub fn add_production(
        &mut self,
        name: &str,
        rhs: &[&str],
        action: Box<dyn Fn(&mut S, Vec<crate::parser::Value<V>>) -> V + Send + Sync>,
        explicit_prec: Option<&str>,
    ) -> GeneratorResult<ProdIndex> {
        if let Some(&sym) = self.symbol_names.get(name) {
            if self.is_term(sym) {
                return Err(GeneratorError::ProductionNameIsTerminal(name.to_string()));
            }
        }
        let lhs = self.get_or_add_nonterminal(name)?;
        let rhs_syms: Vec<SymbolIndex> = rhs.iter().map(|s| self.resolve_symbol(s)).collect();

        let precedence = if let Some(prec_name) = explicit_prec {
            match self.symbol_names.get(prec_name) {
                Some(&sym) if self.is_term(sym) => self.terminals[self.symbol_to_term(sym)].precedence,
                _ => return Err(GeneratorError::UnknownPrecedence(prec_name.to_string())),
            }
        } else {
            rhs_syms
                .iter()
                .rev()
                .find(|&&s| self.is_term(s))
                .map(|&s| self.terminals[self.symbol_to_term(s)].precedence)
                .unwrap_or(Precedence::NONE)
        };

        let idx = ProdIndex(self.productions.len());
        self.productions.push(Production {
            idx,
            lhs,
            rhs: rhs_syms,
            precedence,
            action,
            last_closure_stamp: Cell::new(0),
        });
        self.nonterminals[lhs].productions.push(idx);
        Ok(idx)
    }

    /// Synthesises production 0, `S' -> start_name`, the first production
    /// registered by the caller.
    pub fn set_start(&mut self, start_name: &str) -> GeneratorResult<()> {
        let start_sym = match self.symbol_names.get(start_name) {
            Some(&sym) if !self.is_term(sym) => self.symbol_to_nonterm(sym),
            Some(_) => return Err(GeneratorError::ProductionNameIsTerminal(start_name.to_string())),
            None => return Err(GeneratorError::UnknownSymbol(start_name.to_string())),
        };

        let augmented = NonTermIndex(self.nonterminals.len());
        self.nonterminals.push(NonTerminal {
            idx: augmented,
            name: AUGMENTED_START.to_string(),
            productions: vec![],
        });
        self.symbol_names.insert(
            AUGMENTED_START.to_string(),
            augmented.to_symbol_index(self.terminals.len()),
        );

        // Production 0 must exist before any other; since callers always add
        // real productions first, shift every existing production's index up
        // by one slot is avoided by instead inserting at the front and
        // renumbering. Renumbering is cheap: grammars are small and this
        // runs once at build() time.
        let old_productions = std::mem::replace(&mut self.productions, ProdVec::new());
        let start_prod_action: Box<dyn Fn(&mut S, Vec<crate::parser::Value<V>>) -> V + Send + Sync> =
            Box::new(|_state, mut values| match values.pop() {
                Some(crate::parser::Value::Node(v)) => v,
                _ => unreachable!("S' -> start always reduces a single nonterminal value"),
            });
        self.productions.push(Production {
            idx: ProdIndex(0),
            lhs: augmented,
            rhs: vec![start_sym.to_symbol_index(self.terminals.len())],
            precedence: Precedence::NONE,
            action: start_prod_action,
            last_closure_stamp: Cell::new(0),
        });
        self.nonterminals[augmented].productions.push(ProdIndex(0));

        for mut prod in old_productions {
            let new_idx = ProdIndex(self.productions.len());
            prod.idx = new_idx;
            self.productions.push(prod);
        }
        // Fix up the `productions` list on every nonterminal now that indices shifted by one.
        for nt in self.nonterminals.iter_mut() {
            nt.productions = self
                .productions
                .iter()
                .filter(|p| p.lhs == nt.idx)
                .map(|p| p.idx)
                .collect();
        }

        self.start = Some(augmented);
        Ok(())
    }

    pub fn is_term(&self, sym: SymbolIndex) -> bool {
        sym.0 < self.terminals.len()
    }

    pub fn is_nonterm(&self, sym: SymbolIndex) -> bool {
        !self.is_term(sym)
    }

    pub fn symbol_to_term(&self, sym: SymbolIndex) -> TermIndex {
        debug_assert!(self.is_term(sym));
        TermIndex(sym.0)
    }

    pub fn symbol_to_nonterm(&self, sym: SymbolIndex) -> NonTermIndex {
        debug_assert!(self.is_nonterm(sym));
        NonTermIndex(sym.0 - self.terminals.len())
    }

    pub fn symbol_name(&self, sym: SymbolIndex) -> &str {
        res_symbol_name(self, sym)
    }

    pub fn symbol_index(&self, name: &str) -> SymbolIndex {
        self.symbol_names[name]
    }

    /// Resolves a terminal by name, returning `None` both for unknown names
    /// and for names that resolve to a nonterminal instead.
    pub fn term_index(&self, name: &str) -> Option<TermIndex> {
        match self.symbol_names.get(name) {
            Some(&sym) if self.is_term(sym) => Some(self.symbol_to_term(sym)),
            _ => None,
        }
    }

    pub fn end_index(&self) -> SymbolIndex {
        TermIndex(0).to_symbol_index()
    }

    pub fn error_index(&self) -> SymbolIndex {
        TermIndex(1).to_symbol_index()
    }

    /// The pseudo-symbol representing "derives the empty string", placed one
    /// past every real terminal and nonterminal so FIRST/FOLLOW vectors sized
    /// `symbol_count() + 1` can index it directly without reserving a slot in
    /// the name table (it is never user-visible, never resolvable by name).
    pub fn empty_index(&self) -> SymbolIndex {
        SymbolIndex(self.symbol_count())
    }

    pub fn start_symbol(&self) -> SymbolIndex {
        self.start
            .expect("set_start() must run before the grammar is queried")
            .to_symbol_index(self.terminals.len())
    }

    pub fn symbol_count(&self) -> usize {
        self.terminals.len() + self.nonterminals.len()
    }

    /// Terminals never appearing on any rhs except the reserved `error`
    /// terminal (which is exempt by design).
    pub fn unused_terminals(&self) -> Vec<String> {
        let mut used = vec![false; self.terminals.len()];
        used[0] = true; // $end is always "used" (it is never declared by the user)
        used[1] = true; // error is exempt
        for prod in &self.productions {
            for &sym in &prod.rhs {
                if self.is_term(sym) {
                    used[self.symbol_to_term(sym).0] = true;
                }
            }
        }
        self.terminals
            .iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|(t, _)| t.name.clone())
            .collect()
    }

    /// Nonterminals (besides the augmented start) never appearing on any
    /// rhs.
    pub fn unused_productions(&self) -> Vec<String> {
        let mut used = vec![false; self.nonterminals.len()];
        if let Some(start) = self.start {
            used[start.0] = true;
        }
        for prod in &self.productions {
            for &sym in &prod.rhs {
                if self.is_nonterm(sym) {
                    used[self.symbol_to_nonterm(sym).0] = true;
                }
            }
        }
        self.nonterminals
            .iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|(nt, _)| nt.name.clone())
            .collect()
    }
}

impl<V, S> Default for Grammar<V, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The `<empty>` pseudo-terminal used by FIRST-set computation to mark that a
/// symbol sequence can derive the empty string.
pub type Firsts = IndexSet<SymbolIndex>;

/// FIRST(X) for every grammar symbol, indexed by `SymbolIndex`, computed to a
/// fixpoint. FIRST(terminal) = {terminal}; FIRST(nonterminal) is the union of
/// FIRST(rhs) over its productions. Kept as insertion-ordered sets so output
/// is deterministic across runs. The vector has `symbol_count() + 1` slots;
/// the extra slot at `grammar.empty_index()` is not itself meaningful but
/// keeps indexing uniform.
pub fn first_sets<V, S>(grammar: &Grammar<V, S>) -> Vec<Firsts> {
    let empty = grammar.empty_index();
    let mut first = vec![Firsts::new(); empty.0 + 1];
    for t in &grammar.terminals {
        first[t.idx.0].insert(t.idx.to_symbol_index());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for prod in &grammar.productions {
            let lhs_sym = prod.lhs.to_symbol_index(grammar.terminals.len());
            let before = first[lhs_sym.0].len();
            let seq_first = firsts_of_sequence(grammar, &first, &prod.rhs);
            for s in seq_first {
                first[lhs_sym.0].insert(s);
            }
            if first[lhs_sym.0].len() > before {
                changed = true;
            }
        }
    }
    first
}

/// FIRST of a symbol sequence: FIRST of each symbol in turn, stopping at the
/// first symbol that cannot derive the empty string; `empty` is included iff
/// every symbol in the sequence derives it (including the empty sequence
/// itself).
pub fn firsts_of_sequence<V, S>(
    grammar: &Grammar<V, S>,
    first: &[Firsts],
    seq: &[SymbolIndex],
) -> Firsts {
    let empty = grammar.empty_index();
    let mut result = Firsts::new();
    let mut all_nullable = true;
    for &sym in seq {
        let mut nullable_here = false;
        for &f in &first[sym.0] {
            if f == empty {
                nullable_here = true;
            } else {
                result.insert(f);
            }
        }
        if !nullable_here {
            all_nullable = false;
            break;
        }
    }
    if all_nullable {
        result.insert(empty);
    }
    result
}

/// FOLLOW(A) for every nonterminal, computed to a fixpoint per the Dragon
/// Book rules: FOLLOW(start) seeded with `$end`; for `A -> αBβ`,
/// FIRST(β)\{ε} joins FOLLOW(B); if β derives ε, FOLLOW(A) joins FOLLOW(B).
pub fn follow_sets<V, S>(grammar: &Grammar<V, S>, first: &[Firsts]) -> Vec<Firsts> {
    let empty = grammar.empty_index();
    let mut follow = vec![Firsts::new(); empty.0 + 1];
    follow[grammar.start_symbol().0].insert(grammar.end_index());

    let mut changed = true;
    while changed {
        changed = false;
        for prod in &grammar.productions {
            let lhs_sym = prod.lhs.to_symbol_index(grammar.terminals.len());
            for i in 0..prod.rhs.len() {
                let b = prod.rhs[i];
                let before = follow[b.0].len();
                let beta = &prod.rhs[i + 1..];
                let beta_first = firsts_of_sequence(grammar, &first, beta);
                for f in beta_first.iter().filter(|&&f| *f != empty) {
                    follow[b.0].insert(*f);
                }
                if beta_first.contains(&empty) {
                    let lhs_follow: Vec<SymbolIndex> = follow[lhs_sym.0].iter().copied().collect();
                    for f in lhs_follow {
                        follow[b.0].insert(f);
                    }
                }
                if follow[b.0].len() > before {
                    changed = true;
                }
            }
        }
    }
    follow
}

/// Rule-string mini-parser: splits on whitespace, requires the second token
/// to be the literal `:`, and splits the remainder on `|` into alternatives.
/// Each alternative's rhs is its own whitespace-split symbol list.
pub fn parse_rule_string(rule: &str) -> GeneratorResult<(String, Vec<Vec<String>>)> {
    let mut tokens = rule.split_whitespace();
    let lhs = tokens
        .next()
        .ok_or_else(|| GeneratorError::MalformedRuleString(rule.to_string()))?
        .to_string();
    match tokens.next() {
        Some(":") => {}
        _ => return Err(GeneratorError::MalformedRuleString(rule.to_string())),
    }
    let rest: Vec<&str> = tokens.collect();
    let mut alternatives = vec![];
    let mut current: Vec<String> = vec![];
    for tok in rest {
        if tok == "|" {
            alternatives.push(std::mem::take(&mut current));
        } else {
            current.push(tok.to_string());
        }
    }
    alternatives.push(current);
    Ok((lhs, alternatives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Value;

    fn noop_action() -> Box<dyn Fn(&mut (), Vec<Value<i64>>) -> i64 + Send + Sync> {
        Box::new(|_s, _v| 0)
    }

    fn build_expr_grammar() -> Grammar<i64, ()> {
        let mut g: Grammar<i64, ()> = Grammar::new();
        g.add_terminal("id").unwrap();
        g.add_terminal("plus").unwrap();
        g.add_terminal("star").unwrap();
        g.add_terminal("lparen").unwrap();
        g.add_terminal("rparen").unwrap();

        g.add_production("E", &["T", "Ep"], noop_action(), None).unwrap();
        g.add_production("Ep", &["plus", "T", "Ep"], noop_action(), None)
            .unwrap();
        g.add_production("Ep", &[], noop_action(), None).unwrap();
        g.add_production("T", &["F", "Tp"], noop_action(), None).unwrap();
        g.add_production("Tp", &["star", "F", "Tp"], noop_action(), None)
            .unwrap();
        g.add_production("Tp", &[], noop_action(), None).unwrap();
        g.add_production("F", &["lparen", "E", "rparen"], noop_action(), None)
            .unwrap();
        g.add_production("F", &["id"], noop_action(), None).unwrap();

        g.set_start("E").unwrap();
        g
    }

    #[test]
    fn test_unused_terminal_detection() {
        let mut g: Grammar<i64, ()> = Grammar::new();
        g.add_terminal("used").unwrap();
        g.add_terminal("dead").unwrap();
        g.add_production("main", &["used"], noop_action(), None).unwrap();
        g.set_start("main").unwrap();
        assert_eq!(g.unused_terminals(), vec!["dead".to_string()]);
    }

    #[test]
    fn test_parse_rule_string() {
        let (lhs, alts) = parse_rule_string("a : B | C D").unwrap();
        assert_eq!(lhs, "a");
        assert_eq!(alts, vec![vec!["B".to_string()], vec!["C".to_string(), "D".to_string()]]);
    }

    #[test]
    fn test_parse_rule_string_missing_colon() {
        assert!(parse_rule_string("a B C").is_err());
    }

    #[test]
    fn test_first_sets_classic_grammar() {
        let g = build_expr_grammar();
        let first = first_sets(&g);
        let id_idx = g.symbol_index("id");
        let f_idx = g.symbol_index("F");
        let expected: Firsts = first[id_idx.0]
            .union(&first[g.symbol_index("lparen").0])
            .copied()
            .collect();
        assert_eq!(first[f_idx.0], expected);
    }

    #[test]
    fn test_follow_sets_classic_grammar() {
        let g = build_expr_grammar();
        let first = first_sets(&g);
        let follow = follow_sets(&g, &first);
        let e_idx = g.symbol_index("E");
        assert!(follow[e_idx.0].contains(&g.end_index()));
        assert!(follow[e_idx.0].contains(&g.symbol_index("rparen")));
    }
}
