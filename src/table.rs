//! LR action/goto table assembly: combines the LR(0) automaton with LALR(1)
//! lookaheads, resolves shift/reduce and reduce/reduce conflicts using
//! declared precedence and associativity, and computes default reductions.

use crate::error::Warning;
use crate::grammar::{Assoc, Grammar};
use crate::index::{NonTermVec, ProdIndex, StateIndex, StateVec, TermVec};
use crate::lalr;
use crate::lr0;

/// One entry of the action table. `Shift` and `Reduce` carry just enough to
/// drive the runtime: the target state for a shift, the production to
/// reduce by (its rhs length and lhs come from the grammar itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Action {
    Shift(StateIndex),
    Reduce(ProdIndex),
    Accept,
    Error,
}

/// The tables the parser runtime actually drives off of. The LR(0) item
/// sets used to derive them are discarded once lookaheads are computed;
/// nothing at parse time needs to inspect items directly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LrTable {
    pub actions: StateVec<TermVec<Action>>,
    pub gotos: StateVec<NonTermVec<Option<StateIndex>>>,
    /// `Some(p)` when every terminal in this state's row either errors or
    /// reduces by the same production `p` and no shift is possible; the
    /// runtime can skip the lookahead entirely and always reduce.
    pub default_reductions: StateVec<Option<ProdIndex>>,
}

/// Builds the full LR table for `grammar`. Never fails on its own; grammar
/// well-formedness (unknown symbols, missing start, ...) is checked earlier
/// while the grammar is being assembled.
pub fn build<V, S>(grammar: &Grammar<V, S>) -> (LrTable, Vec<Warning>) {
    let automaton = lr0::canonical_collection(grammar);
    let lookaheads = lalr::compute(grammar, &automaton);

    let term_count = grammar.terminals.len();
    let nonterm_count = grammar.nonterminals.len();

    let mut actions: StateVec<TermVec<Action>> = StateVec::new();
    let mut gotos: StateVec<NonTermVec<Option<StateIndex>>> = StateVec::new();
    for _ in automaton.states.iter() {
        actions.push(TermVec::from_iter(std::iter::repeat(Action::Error).take(term_count)));
        gotos.push(NonTermVec::from_iter(std::iter::repeat(None).take(nonterm_count)));
    }

    let mut shift_reduce_conflicts = 0usize;
    let mut reduce_reduce_conflicts = 0usize;

    // Pass 1: shifts and gotos, read straight off the automaton's goto map.
    for (&(state, sym), &target) in &automaton.goto {
        if grammar.is_term(sym) {
            actions[state][grammar.symbol_to_term(sym)] = Action::Shift(target);
        } else {
            gotos[state][grammar.symbol_to_nonterm(sym)] = Some(target);
        }
    }

    // Pass 2: accept. The augmented production's completed item marks
    // accept on `$end`, not a reduce.
    for state in automaton.states.iter() {
        for item in &state.items {
            if item.prod == ProdIndex(0) && item.is_complete(grammar) {
                actions[state.idx][grammar.symbol_to_term(grammar.end_index())] = Action::Accept;
            }
        }
    }

    // Pass 3: reduces, with conflict resolution.
    for state in automaton.states.iter() {
        for item in &state.items {
            if item.prod == ProdIndex(0) || !item.is_complete(grammar) {
                continue;
            }
            let Some(lookahead) = lookaheads.lookaheads.get(&(state.idx, item.prod)) else {
                continue;
            };
            for &sym in lookahead {
                let term = grammar.symbol_to_term(sym);
                let slot = &mut actions[state.idx][term];
                match *slot {
                    Action::Error => *slot = Action::Reduce(item.prod),
                    Action::Accept => {}
                    Action::Shift(_) => {
                        match resolve_shift_reduce(grammar, term, item.prod) {
                            Resolution::Shift => {}
                            Resolution::Reduce => *slot = Action::Reduce(item.prod),
                            Resolution::Neither => {
                                *slot = Action::Error;
                            }
                            Resolution::Unresolved => {
                                shift_reduce_conflicts += 1;
                            }
                        }
                    }
                    Action::Reduce(existing_prod) => {
                        if item.prod != existing_prod {
                            reduce_reduce_conflicts += 1;
                            // Earlier-declared production wins, matching
                            // conventional yacc/bison tie-breaking.
                            if item.prod.0 < existing_prod.0 {
                                *slot = Action::Reduce(item.prod);
                            }
                        }
                    }
                }
            }
        }
    }

    let mut default_reductions: StateVec<Option<ProdIndex>> = StateVec::new();
    for row in actions.iter() {
        default_reductions.push(default_reduction_for_row(row));
    }

    let mut warnings = Vec::new();
    if shift_reduce_conflicts > 0 {
        warnings.push(Warning::ShiftReduceConflicts(shift_reduce_conflicts));
    }
    if reduce_reduce_conflicts > 0 {
        warnings.push(Warning::ReduceReduceConflicts(reduce_reduce_conflicts));
    }

    (
        LrTable {
            actions,
            gotos,
            default_reductions,
        },
        warnings,
    )
}

enum Resolution {
    Shift,
    Reduce,
    /// Declared `nonassoc`: using the operator this way is a syntax error.
    Neither,
    Unresolved,
}

/// Classic yacc precedence resolution: the side with higher precedence
/// wins; equal precedence falls back to the terminal's associativity
/// (`left` reduces, `right` shifts, `nonassoc` is a hard error); missing
/// precedence on either side leaves the conflict unresolved (shift wins by
/// default, but it's reported).
fn resolve_shift_reduce<V, S>(
    grammar: &Grammar<V, S>,
    term: crate::index::TermIndex,
    prod: ProdIndex,
) -> Resolution {
    let term_prec = grammar.terminals[term].precedence;
    let prod_prec = grammar.productions[prod].precedence;
    if term_prec.is_none() || prod_prec.is_none() {
        return Resolution::Unresolved;
    }
    if prod_prec.level > term_prec.level {
        Resolution::Reduce
    } else if term_prec.level > prod_prec.level {
        Resolution::Shift
    } else {
        match term_prec.assoc {
            Assoc::Left => Resolution::Reduce,
            Assoc::Right => Resolution::Shift,
            Assoc::NonAssoc => Resolution::Neither,
        }
    }
}

fn default_reduction_for_row(row: &TermVec<Action>) -> Option<ProdIndex> {
    let mut candidate = None;
    for action in row.iter() {
        match (action, candidate) {
            (Action::Error, _) => {}
            (Action::Shift(_), _) | (Action::Accept, _) => return None,
            (Action::Reduce(p), None) => candidate = Some(*p),
            (Action::Reduce(p), Some(existing)) if *p != existing => return None,
            (Action::Reduce(_), Some(_)) => {}
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Value;

    fn noop() -> Box<dyn Fn(&mut (), Vec<Value<i64>>) -> i64 + Send + Sync> {
        Box::new(|_s, _v| 0)
    }

    fn build_calc_grammar() -> Grammar<i64, ()> {
        let mut g: Grammar<i64, ()> = Grammar::new();
        g.add_terminal("num").unwrap();
        g.add_terminal("plus").unwrap();
        g.add_terminal("star").unwrap();
        g.set_precedence("plus", Assoc::Left, 1).unwrap();
        g.set_precedence("star", Assoc::Left, 2).unwrap();
        g.add_production("E", &["E", "plus", "E"], noop(), Some("plus"))
            .unwrap();
        g.add_production("E", &["E", "star", "E"], noop(), Some("star"))
            .unwrap();
        g.add_production("E", &["num"], noop(), None).unwrap();
        g.set_start("E").unwrap();
        g
    }

    #[test]
    fn test_precedence_resolves_shift_reduce_conflicts() {
        let g = build_calc_grammar();
        let (table, warnings) = build(&g);
        assert!(
            warnings.is_empty(),
            "precedence should resolve every conflict in this grammar: {warnings:?}"
        );
        assert!(!table.actions.is_empty());
    }

    #[test]
    fn test_accept_action_present_on_end() {
        let g = build_calc_grammar();
        let (table, _) = build(&g);
        let end = g.symbol_to_term(g.end_index());
        let has_accept = table
            .actions
            .iter()
            .any(|row| matches!(row[end], Action::Accept));
        assert!(has_accept);
    }

    #[test]
    fn test_default_reduction_skips_lookup_in_pure_reduce_states() {
        let mut g: Grammar<i64, ()> = Grammar::new();
        g.add_terminal("id").unwrap();
        g.add_production("S", &["id"], noop(), None).unwrap();
        g.set_start("S").unwrap();
        let (table, _) = build(&g);
        // The state reached after shifting `id` has a single reducible item
        // and no further shifts: it must get a default reduction.
        assert!(table.default_reductions.iter().any(|d| d.is_some()));
    }
}
