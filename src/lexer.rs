//! Lexer generator and runtime: an ordered set of regex rules per state,
//! matched first-rule-in-order-wins, with an optional push/pop state stack
//! for context-sensitive tokenization (e.g. string interpolation).

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{GeneratorError, GeneratorResult, LexingError};

pub const INITIAL_STATE: &str = "INITIAL";

/// What a token rule does to the lexer's state stack once it matches.
#[derive(Debug, Clone)]
pub enum Transition {
    Push(String),
    Pop,
}

struct TokenRule {
    name: String,
    regex: Regex,
    transition: Option<Transition>,
}

#[derive(Default)]
struct LexerState {
    ignore: Vec<Regex>,
    tokens: Vec<TokenRule>,
}

/// A byte offset plus 1-based line/column, attached to every token and
/// every lexing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub idx: usize,
    pub lineno: usize,
    pub colno: usize,
}

impl SourcePos {
    fn start() -> Self {
        SourcePos {
            idx: 0,
            lineno: 1,
            colno: 1,
        }
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (byte {})", self.lineno, self.colno, self.idx)
    }
}

/// A single recognized token: its rule name, the exact matched text, and
/// where it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: String,
    pub value: String,
    pub pos: SourcePos,
}

fn compile(name: &str, pattern: &str) -> GeneratorResult<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| GeneratorError::InvalidPattern {
        name: name.to_string(),
        source,
    })
}

/// Accumulates lexer states and their rules; `build()` compiles every
/// pattern and validates state transitions.
pub struct LexerGenerator {
    states: IndexMap<String, LexerState>,
    start: String,
    skip_whitespace: bool,
}

impl LexerGenerator {
    pub fn new() -> Self {
        let mut states = IndexMap::new();
        states.insert(INITIAL_STATE.to_string(), LexerState::default());
        Self {
            states,
            start: INITIAL_STATE.to_string(),
            skip_whitespace: false,
        }
    }

    /// When set, `build()` inserts a default `\s+` ignore rule into
    /// `INITIAL_STATE` if no ignore rule was registered for it explicitly.
    pub fn skip_whitespace(&mut self, enabled: bool) -> &mut Self {
        self.skip_whitespace = enabled;
        self
    }

    pub fn add_state(&mut self, name: &str) -> &mut Self {
        self.states.entry(name.to_string()).or_default();
        self
    }

    /// Registers a token rule named `name` matching `pattern` in `state`,
    /// with an optional push/pop transition applied once the rule matches.
    pub fn add_in(
        &mut self,
        state: &str,
        name: &str,
        pattern: &str,
        transition: Option<Transition>,
    ) -> GeneratorResult<()> {
        let regex = compile(name, pattern)?;
        let entry = self.states.entry(state.to_string()).or_default();
        entry.tokens.push(TokenRule {
            name: name.to_string(),
            regex,
            transition,
        });
        Ok(())
    }

    pub fn add(&mut self, name: &str, pattern: &str) -> GeneratorResult<()> {
        self.add_in(INITIAL_STATE, name, pattern, None)
    }

    /// Registers an anonymous rule in `state` whose matches are skipped
    /// without emitting a token. Ignore rules are tried before token rules
    /// at every position.
    pub fn ignore_in(&mut self, state: &str, pattern: &str) -> GeneratorResult<()> {
        let regex = compile("<ignore>", pattern)?;
        let entry = self.states.entry(state.to_string()).or_default();
        entry.ignore.push(regex);
        Ok(())
    }

    pub fn ignore(&mut self, pattern: &str) -> GeneratorResult<()> {
        self.ignore_in(INITIAL_STATE, pattern)
    }

    pub fn build(mut self) -> GeneratorResult<Lexer> {
        if self.skip_whitespace {
            let needs_default = self
                .states
                .get(INITIAL_STATE)
                .map(|s| s.ignore.is_empty())
                .unwrap_or(true);
            if needs_default {
                self.ignore(r"\s+")?;
            }
        }

        for state in self.states.values() {
            for rule in &state.tokens {
                if let Some(Transition::Push(target)) = &rule.transition {
                    if !self.states.contains_key(target) {
                        return Err(GeneratorError::UnknownLexerState(target.clone()));
                    }
                }
            }
        }
        // A Pop rule reachable from the start state would underflow the
        // stack on the very first transition, since parsing always begins
        // with a single-element stack holding the start state.
        if let Some(start_state) = self.states.get(&self.start) {
            if start_state
                .tokens
                .iter()
                .any(|r| matches!(r.transition, Some(Transition::Pop)))
            {
                return Err(GeneratorError::LexerStatePopUnderflow);
            }
        }

        Ok(Lexer {
            states: self.states,
            start: self.start,
        })
    }
}

impl Default for LexerGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, built lexer. Cheap to share (`Arc`-wrap at the call site);
/// `lex()` creates a fresh, independent token stream per call.
pub struct Lexer {
    states: IndexMap<String, LexerState>,
    start: String,
}

impl Lexer {
    pub fn lex<'a>(&'a self, input: &'a str) -> TokenStream<'a> {
        TokenStream {
            lexer: self,
            input,
            pos: SourcePos::start(),
            state_stack: vec![self.start.clone()],
        }
    }
}

/// Iterator over the tokens of one input, created by [`Lexer::lex`].
pub struct TokenStream<'a> {
    lexer: &'a Lexer,
    input: &'a str,
    pos: SourcePos,
    state_stack: Vec<String>,
}

impl<'a> TokenStream<'a> {
    fn advance(&mut self, len: usize) {
        let consumed = &self.input[self.pos.idx..self.pos.idx + len];
        for ch in consumed.chars() {
            if ch == '\n' {
                self.pos.lineno += 1;
                self.pos.colno = 1;
            } else {
                self.pos.colno += 1;
            }
        }
        self.pos.idx += len;
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<Token, LexingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos.idx >= self.input.len() {
                return None;
            }
            let state_name = self.state_stack.last().expect("state stack never empty").clone();
            let state = &self.lexer.states[state_name.as_str()];
            let remaining = &self.input[self.pos.idx..];

            if let Some(m) = state.ignore.iter().find_map(|re| re.find(remaining).filter(|m| m.end() > 0))
            {
                log::trace!("skipping {} bytes of ignored input at {}", m.end(), self.pos);
                self.advance(m.end());
                continue;
            }

            let matched = state
                .tokens
                .iter()
                .find_map(|rule| rule.regex.find(remaining).filter(|m| m.end() > 0).map(|m| (rule, m)));

            let Some((rule, m)) = matched else {
                log::trace!("no rule matches remaining input at {}", self.pos);
                return Some(Err(LexingError { pos: self.pos }));
            };

            let start_pos = self.pos;
            let value = m.as_str().to_string();
            self.advance(m.end());

            match &rule.transition {
                Some(Transition::Push(target)) => {
                    log::trace!("lexer state push: {target}");
                    self.state_stack.push(target.clone());
                }
                Some(Transition::Pop) => {
                    log::trace!("lexer state pop");
                    self.state_stack.pop();
                }
                None => {}
            }

            return Some(Ok(Token {
                name: rule.name.clone(),
                value,
                pos: start_pos,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_calc_lexer() -> Lexer {
        let mut gen = LexerGenerator::new();
        gen.add("NUMBER", r"\d+").unwrap();
        gen.add("PLUS", r"\+").unwrap();
        gen.ignore(r"\s+").unwrap();
        gen.build().unwrap()
    }

    #[test]
    fn test_position_tracking_single_line() {
        let lexer = build_calc_lexer();
        let tokens: Vec<Token> = lexer.lex("2 + 3").map(|t| t.unwrap()).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].pos.colno, 1);
        assert_eq!(tokens[1].pos.colno, 3);
        assert_eq!(tokens[2].pos.colno, 5);
        assert!(tokens.iter().all(|t| t.pos.lineno == 1));
    }

    #[test]
    fn test_position_tracking_across_newline() {
        let lexer = build_calc_lexer();
        let tokens: Vec<Token> = lexer.lex("2 +\n    37").map(|t| t.unwrap()).collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].pos.lineno, 2);
        assert_eq!(tokens[2].pos.colno, 5);
    }

    #[test]
    fn test_lexing_error_reports_position() {
        let lexer = build_calc_lexer();
        let mut stream = lexer.lex("fail");
        let err = stream.next().unwrap().unwrap_err();
        assert_eq!(err.pos.idx, 0);
        assert_eq!(err.pos.lineno, 1);
        assert_eq!(err.pos.colno, 1);
    }

    #[test]
    fn test_first_rule_in_order_wins_over_later_overlapping_rule() {
        let mut gen = LexerGenerator::new();
        gen.add("KEYWORD_IF", "if").unwrap();
        gen.add("IDENT", r"[a-z]+").unwrap();
        let lexer = gen.build().unwrap();
        let tok = lexer.lex("if").next().unwrap().unwrap();
        assert_eq!(tok.name, "KEYWORD_IF");
    }

    #[test]
    fn test_pop_from_start_state_rejected_at_build() {
        let mut gen = LexerGenerator::new();
        gen.add_in(INITIAL_STATE, "BAD", "x", Some(Transition::Pop)).unwrap();
        assert!(gen.build().is_err());
    }

    #[test]
    fn test_push_to_unknown_state_rejected_at_build() {
        let mut gen = LexerGenerator::new();
        gen.add_in(INITIAL_STATE, "ENTER", "\"", Some(Transition::Push("MISSING".to_string())))
            .unwrap();
        assert!(gen.build().is_err());
    }

    #[test]
    fn test_state_stack_push_then_pop_returns_to_initial() {
        let mut gen = LexerGenerator::new();
        gen.add_state("STRING");
        gen.add_in(
            INITIAL_STATE,
            "QUOTE_OPEN",
            "\"",
            Some(Transition::Push("STRING".to_string())),
        )
        .unwrap();
        gen.add_in("STRING", "QUOTE_CLOSE", "\"", Some(Transition::Pop))
            .unwrap();
        gen.add_in("STRING", "CHAR", ".", None).unwrap();
        let lexer = gen.build().unwrap();
        let tokens: Vec<Token> = lexer.lex("\"ab\"").map(|t| t.unwrap()).collect();
        let names: Vec<&str> = tokens.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["QUOTE_OPEN", "CHAR", "CHAR", "QUOTE_CLOSE"]);
    }
}
