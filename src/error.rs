//! Error and warning types shared by the generator, the lexer and the parser runtime.

use crate::lexer::SourcePos;

/// Errors raised while building a grammar or a lexer (`build()` time). These are
/// always fatal: the generator stops and no parser/lexer is produced.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("terminal '{0}' is already declared")]
    DuplicateTerminal(String),

    #[error("'{0}' is declared as both a terminal and a production name")]
    TerminalProductionCollision(String),

    #[error("terminal '{0}' already has a precedence assigned")]
    PrecedenceAlreadySet(String),

    #[error("invalid associativity '{0}', expected one of left, right, nonassoc")]
    InvalidAssociativity(String),

    #[error("production refers to unknown precedence group '{0}'")]
    UnknownPrecedence(String),

    #[error("rule string '{0}' is malformed: missing ':' separator")]
    MalformedRuleString(String),

    #[error("left-hand side '{0}' of a production is a declared terminal")]
    ProductionNameIsTerminal(String),

    #[error("production references unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("no start production registered before build()")]
    NoStartProduction,

    #[error(
        "shift/shift conflict in state {state}: both goto {first} and {second} on the \
         same terminal (grammar is inconsistent, this is a generator bug)"
    )]
    ShiftShiftConflict {
        state: usize,
        first: usize,
        second: usize,
    },

    #[error("lexer state '{0}' is unknown")]
    UnknownLexerState(String),

    #[error("attempt to pop the only state on the lexer state stack")]
    LexerStatePopUnderflow,

    #[error("invalid regular expression for rule '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("table cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("table cache (de)serialization error: {0}")]
    CacheFormat(#[from] serde_json::Error),

    #[error("build warnings promoted to errors: {0:?}")]
    WarningsPromotedToErrors(Vec<String>),
}

pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Non-fatal diagnostics collected during `build()`. These never prevent the
/// parser/lexer from being constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnusedTerminal(String),
    UnreachableProduction(String),
    ShiftReduceConflicts(usize),
    ReduceReduceConflicts(usize),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnusedTerminal(name) => write!(f, "Token '{name}' is unused"),
            Warning::UnreachableProduction(name) => {
                write!(f, "Production '{name}' is not reachable")
            }
            Warning::ShiftReduceConflicts(n) => write!(f, "{n} shift/reduce conflicts"),
            Warning::ReduceReduceConflicts(n) => write!(f, "{n} reduce/reduce conflicts"),
        }
    }
}

/// Raised at parse time when the action table has no entry for the current
/// state/lookahead pair and no error handler is registered.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("parsing error at {pos}: unexpected token '{token_name}' (value: {token_value:?})")]
pub struct ParsingError {
    pub pos: SourcePos,
    pub token_name: String,
    pub token_value: String,
}

/// Raised by the lexer runtime when no rule matches at the current position.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("lexing error at {pos}: no rule matches the input")]
pub struct LexingError {
    pub pos: SourcePos,
}

/// Unifying error type for callers who want a single `?`-propagatable error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error(transparent)]
    Lexing(#[from] LexingError),
}
