//! LR(0) item-set construction: closure, goto, and the canonical collection
//! of states. Lookaheads are not computed here; see [`crate::lalr`] for the
//! DeRemer-Pennello phase that annotates completed items with them.

use std::cell::Cell;

use indexmap::{IndexMap, IndexSet};

use crate::grammar::Grammar;
use crate::index::{ProdIndex, StateIndex, StateVec};
use crate::index::SymbolIndex;

/// `A -> alpha . beta`, represented as a production plus a dot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LrItem {
    pub prod: ProdIndex,
    pub dot: usize,
}

impl LrItem {
    pub fn symbol_at_dot<V, S>(&self, grammar: &Grammar<V, S>) -> Option<SymbolIndex> {
        grammar.productions[self.prod].rhs.get(self.dot).copied()
    }

    pub fn advance(&self) -> LrItem {
        LrItem {
            prod: self.prod,
            dot: self.dot + 1,
        }
    }

    pub fn is_complete<V, S>(&self, grammar: &Grammar<V, S>) -> bool {
        self.dot >= grammar.productions[self.prod].rhs.len()
    }
}

/// A state in the LR(0) automaton: a closed set of items plus the kernel
/// (pre-closure) items that determine its identity.
#[derive(Debug, Clone)]
pub struct LrState {
    pub idx: StateIndex,
    pub items: IndexSet<LrItem>,
    pub kernel: Vec<LrItem>,
}

/// Closes item sets over a grammar, reusing a single closure-call counter
/// stamped onto each `Production` so that scanning whether a production has
/// already contributed its dot-0 item to the *current* closure call is an
/// `O(1)` field comparison rather than a set lookup (see design notes).
pub struct ClosureBuilder {
    stamp: Cell<u64>,
}

impl ClosureBuilder {
    pub fn new() -> Self {
        Self { stamp: Cell::new(0) }
    }

    pub fn closure<V, S>(&self, grammar: &Grammar<V, S>, kernel: Vec<LrItem>) -> IndexSet<LrItem> {
        self.stamp.set(self.stamp.get() + 1);
        let stamp = self.stamp.get();

        let mut items: IndexSet<LrItem> = IndexSet::new();
        let mut worklist = Vec::new();
        for item in kernel {
            if items.insert(item) {
                worklist.push(item);
            }
        }

        let mut i = 0;
        while i < worklist.len() {
            let item = worklist[i];
            i += 1;
            let Some(sym) = item.symbol_at_dot(grammar) else {
                continue;
            };
            if !grammar.is_nonterm(sym) {
                continue;
            }
            let nt = grammar.symbol_to_nonterm(sym);
            for &p in &grammar.nonterminals[nt].productions {
                let prod = &grammar.productions[p];
                if prod.last_closure_stamp.get() == stamp {
                    continue;
                }
                prod.last_closure_stamp.set(stamp);
                let new_item = LrItem { prod: p, dot: 0 };
                if items.insert(new_item) {
                    worklist.push(new_item);
                }
            }
        }
        items
    }
}

impl Default for ClosureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The canonical collection of LR(0) states plus the goto function between
/// them.
pub struct Lr0Automaton {
    pub states: StateVec<LrState>,
    pub goto: IndexMap<(StateIndex, SymbolIndex), StateIndex>,
}

fn kernel_key(items: &[LrItem]) -> Vec<LrItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|it| (it.prod.0, it.dot));
    sorted.dedup();
    sorted
}

/// Builds the canonical collection, seeded with `closure({S' -> .S})`.
/// Symbols are iterated in insertion order at every state so that state
/// numbering (and therefore every downstream table) is deterministic run to
/// run for a given grammar.
pub fn canonical_collection<V, S>(grammar: &Grammar<V, S>) -> Lr0Automaton {
    let cb = ClosureBuilder::new();
    let mut states: StateVec<LrState> = StateVec::new();
    let mut goto: IndexMap<(StateIndex, SymbolIndex), StateIndex> = IndexMap::new();
    let mut by_kernel: IndexMap<Vec<LrItem>, StateIndex> = IndexMap::new();

    let start_kernel = vec![LrItem {
        prod: ProdIndex(0),
        dot: 0,
    }];
    let start_items = cb.closure(grammar, start_kernel.clone());
    let start_idx = StateIndex(states.len());
    states.push(LrState {
        idx: start_idx,
        items: start_items,
        kernel: start_kernel.clone(),
    });
    by_kernel.insert(kernel_key(&start_kernel), start_idx);

    let mut worklist = vec![start_idx];
    let mut wi = 0;
    while wi < worklist.len() {
        let state_idx = worklist[wi];
        wi += 1;

        let mut per_symbol: IndexMap<SymbolIndex, Vec<LrItem>> = IndexMap::new();
        for item in &states[state_idx].items {
            if let Some(sym) = item.symbol_at_dot(grammar) {
                per_symbol.entry(sym).or_default().push(item.advance());
            }
        }

        for (sym, kernel_items) in per_symbol {
            let key = kernel_key(&kernel_items);
            let target = if let Some(&existing) = by_kernel.get(&key) {
                existing
            } else {
                let closure_items = cb.closure(grammar, kernel_items.clone());
                let idx = StateIndex(states.len());
                states.push(LrState {
                    idx,
                    items: closure_items,
                    kernel: kernel_items.clone(),
                });
                by_kernel.insert(key, idx);
                worklist.push(idx);
                idx
            };
            goto.insert((state_idx, sym), target);
        }
    }

    Lr0Automaton { states, goto }
}
