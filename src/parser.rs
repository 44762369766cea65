//! The parser runtime: the `Value` stack representation, the shift/reduce
//! driver loop, and the `ParserGenerator` builder that ties a grammar, a
//! table (fresh or cached) and an optional error handler into a usable
//! [`Parser`].

use std::sync::Arc;

use crate::cache;
use crate::error::{Error, GeneratorError, GeneratorResult, ParsingError, Warning};
use crate::grammar::{Assoc, Grammar};
use crate::index::ProdIndex;
use crate::lexer::{SourcePos, Token};
use crate::settings::GeneratorSettings;
use crate::table::{self, Action, LrTable};

/// An entry on the parser's value stack: either a token fresh off the
/// lexer (not yet reduced into anything) or a value produced by a
/// production's action.
#[derive(Debug)]
pub enum Value<V> {
    Token(Token),
    Node(V),
}

impl<V> Value<V> {
    /// Unwraps a shifted token, panicking if this slot holds a reduced
    /// node instead. Actions use this to pull the literal matched text out
    /// of a terminal they consumed; calling it on the wrong variant is a
    /// grammar action bug, not a recoverable condition.
    pub fn into_token(self) -> Token {
        match self {
            Value::Token(t) => t,
            Value::Node(_) => panic!("expected a shifted token on the value stack, found a reduced node"),
        }
    }

    /// Unwraps a reduced value, panicking if this slot holds a raw token.
    pub fn into_node(self) -> V {
        match self {
            Value::Node(v) => v,
            Value::Token(_) => panic!("expected a reduced node on the value stack, found a shifted token"),
        }
    }
}

/// A built, immutable parser. Cheap to clone (shares the grammar and table
/// via `Arc`); safe to use from multiple threads concurrently, each call to
/// [`Parser::parse`] owns its own stacks.
pub struct Parser<V, S> {
    grammar: Arc<Grammar<V, S>>,
    table: Arc<LrTable>,
    error_handler: Option<Arc<dyn Fn(&mut S, &ParsingError) + Send + Sync>>,
}

impl<V, S> Clone for Parser<V, S> {
    fn clone(&self) -> Self {
        Self {
            grammar: Arc::clone(&self.grammar),
            table: Arc::clone(&self.table),
            error_handler: self.error_handler.clone(),
        }
    }
}

impl<V, S> Parser<V, S> {
    /// Drives the shift/reduce automaton over `tokens`, calling semantic
    /// actions (threaded through `state`) as productions reduce.
    pub fn parse<I>(&self, state: &mut S, tokens: I) -> Result<V, ParsingError>
    where
        I: IntoIterator<Item = Token>,
    {
        let mut state_stack = vec![crate::index::StateIndex(0)];
        let mut value_stack: Vec<Value<V>> = Vec::new();
        let mut input = tokens.into_iter();
        let mut lookahead: Option<Token> = None;
        let mut pushback: Vec<Token> = Vec::new();

        loop {
            if lookahead.is_none() {
                lookahead = pushback.pop().or_else(|| input.next());
            }
            let (term_name, term_value, term_pos, term_idx) = match &lookahead {
                Some(tok) => {
                    let idx = self.grammar.term_index(&tok.name).ok_or_else(|| ParsingError {
                        pos: tok.pos,
                        token_name: tok.name.clone(),
                        token_value: tok.value.clone(),
                    })?;
                    (tok.name.clone(), tok.value.clone(), tok.pos, idx)
                }
                None => {
                    let end = self.grammar.symbol_to_term(self.grammar.end_index());
                    ("$end".to_string(), String::new(), SourcePos {
                        idx: 0,
                        lineno: 1,
                        colno: 1,
                    }, end)
                }
            };

            let cur_state = *state_stack.last().expect("state stack never empty");
            let action = if let Some(prod) = self.table.default_reductions[cur_state] {
                Action::Reduce(prod)
            } else {
                self.table.actions[cur_state][term_idx]
            };

            match action {
                Action::Shift(next) => {
                    let tok = lookahead.take().expect("shift requires a lookahead token");
                    state_stack.push(next);
                    value_stack.push(Value::Token(tok));
                }
                Action::Reduce(prod_idx) => {
                    self.reduce(prod_idx, state, &mut state_stack, &mut value_stack);
                }
                Action::Accept => {
                    return Ok(value_stack.pop().expect("accept with empty value stack").into_node());
                }
                Action::Error => {
                    let err = ParsingError {
                        pos: term_pos,
                        token_name: term_name,
                        token_value: term_value,
                    };
                    if let Some(handler) = &self.error_handler {
                        handler(state, &err);
                        panic!(
                            "parser error handler returned normally for {err}; handlers must abort \
                             (panic or exit) instead of returning, since this parser does not \
                             implement error recovery"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    fn reduce(
        &self,
        prod_idx: ProdIndex,
        state: &mut S,
        state_stack: &mut Vec<crate::index::StateIndex>,
        value_stack: &mut Vec<Value<V>>,
    ) {
        let prod = &self.grammar.productions[prod_idx];
        let rhs_len = prod.rhs.len();
        let args = value_stack.split_off(value_stack.len() - rhs_len);
        state_stack.truncate(state_stack.len() - rhs_len);

        let result = (prod.action)(state, args);

        let top = *state_stack.last().expect("state stack never empty after pop");
        let next = self.table.gotos[top][prod.lhs]
            .expect("goto must be defined for every (state, lhs) reachable via a reduce");
        state_stack.push(next);
        value_stack.push(Value::Node(result));
    }
}

/// Builds a grammar, a lexer-independent LALR(1) table (from cache when
/// configured, freshly otherwise) and an optional error handler into a
/// [`Parser`].
pub struct ParserGenerator<V, S = ()> {
    grammar: Grammar<V, S>,
    settings: GeneratorSettings,
    error_handler: Option<Arc<dyn Fn(&mut S, &ParsingError) + Send + Sync>>,
}

impl<V, S> ParserGenerator<V, S> {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self {
            grammar: Grammar::new(),
            settings,
            error_handler: None,
        }
    }

    pub fn terminal(&mut self, name: &str) -> GeneratorResult<()> {
        self.grammar.add_terminal(name).map(|_| ())
    }

    pub fn precedence(&mut self, name: &str, assoc: Assoc, level: u32) -> GeneratorResult<()> {
        self.grammar.set_precedence(name, assoc, level)
    }

    pub fn production(
        &mut self,
        name: &str,
        rhs: &[&str],
        action: Box<dyn Fn(&mut S, Vec<Value<V>>) -> V + Send + Sync>,
        explicit_prec: Option<&str>,
    ) -> GeneratorResult<ProdIndex> {
        self.grammar.add_production(name, rhs, action, explicit_prec)
    }

    pub fn start(&mut self, name: &str) -> GeneratorResult<()> {
        self.grammar.set_start(name)
    }

    /// Registers a handler invoked in place of raising [`ParsingError`].
    /// The handler must diverge (panic, `process::exit`, ...); returning
    /// normally from it is treated as a programming error and panics.
    pub fn error(&mut self, handler: Box<dyn Fn(&mut S, &ParsingError) + Send + Sync>) -> &mut Self {
        self.error_handler = Some(Arc::from(handler));
        self
    }

    pub fn build(self) -> GeneratorResult<(Parser<V, S>, Vec<Warning>)>
    where
        V: 'static,
        S: 'static,
    {
        let mut warnings: Vec<Warning> = self
            .grammar
            .unused_terminals()
            .into_iter()
            .map(Warning::UnusedTerminal)
            .collect();
        warnings.extend(
            self.grammar
                .unused_productions()
                .into_iter()
                .map(Warning::UnreachableProduction),
        );
        if self.grammar.start.is_none() {
            return Err(GeneratorError::NoStartProduction);
        }

        let (table, conflict_warnings) = if let (Some(dir), Some(id)) =
            (&self.settings.cache_dir, &self.settings.cache_id)
        {
            cache::load_or_build(dir, id, &self.grammar)?
        } else {
            table::build(&self.grammar)
        };
        warnings.extend(conflict_warnings);

        for warning in &warnings {
            log::warn!("{warning}");
        }
        if self.settings.warnings_as_errors && !warnings.is_empty() {
            return Err(GeneratorError::WarningsPromotedToErrors(
                warnings.iter().map(|w| w.to_string()).collect(),
            ));
        }

        Ok((
            Parser {
                grammar: Arc::new(self.grammar),
                table: Arc::new(table),
                error_handler: self.error_handler,
            },
            warnings,
        ))
    }
}

/// Unifying convenience over [`Parser::parse`] that also surfaces lexing
/// errors through the crate's top-level [`Error`] type, matching the
/// typical "lex then parse" call shape.
pub fn parse_str<V, S>(
    parser: &Parser<V, S>,
    lexer: &crate::lexer::Lexer,
    state: &mut S,
    input: &str,
) -> Result<V, Error> {
    let mut tokens = Vec::new();
    for tok in lexer.lex(input) {
        tokens.push(tok?);
    }
    Ok(parser.parse(state, tokens)?)
}
