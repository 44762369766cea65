//! A combined lexer and LALR(1) parser generator library.
//!
//! Grammars are assembled at runtime through [`grammar::Grammar`] (usually
//! via [`ParserGenerator`], its builder), compiled into an [`table::LrTable`]
//! by [`table::build`] (or loaded from an on-disk [`cache`] keyed by a
//! structural fingerprint of the grammar), and driven by [`Parser::parse`]
//! against a token stream produced by a [`Lexer`] built from
//! [`LexerGenerator`].
//!
//! ```
//! use parsegen::{GeneratorSettings, LexerGenerator, ParserGenerator};
//!
//! let mut lexer = LexerGenerator::new();
//! lexer.skip_whitespace(true);
//! lexer.add("num", r"\d+").unwrap();
//! lexer.add("plus", r"\+").unwrap();
//! let lexer = lexer.build().unwrap();
//!
//! let mut gen: ParserGenerator<i64> = ParserGenerator::new(GeneratorSettings::default());
//! gen.terminal("num").unwrap();
//! gen.terminal("plus").unwrap();
//! gen.production(
//!     "E",
//!     &["E", "plus", "E"],
//!     Box::new(|_s, mut v| {
//!         let rhs = v.pop().unwrap().into_node();
//!         v.pop();
//!         let lhs = v.pop().unwrap().into_node();
//!         lhs + rhs
//!     }),
//!     None,
//! )
//! .unwrap();
//! gen.production(
//!     "E",
//!     &["num"],
//!     Box::new(|_s, mut v| v.pop().unwrap().into_token().value.parse().unwrap()),
//!     None,
//! )
//! .unwrap();
//! gen.start("E").unwrap();
//! let (parser, _warnings) = gen.build().unwrap();
//!
//! let result = parsegen::parse_str(&parser, &lexer, &mut (), "1 + 2 + 3").unwrap();
//! assert_eq!(result, 6);
//! ```

mod cache;
pub mod error;
pub mod grammar;
pub mod index;
mod lalr;
pub mod lexer;
mod lr0;
pub mod parser;
pub mod settings;
mod table;

pub use error::{Error, GeneratorError, GeneratorResult, LexingError, ParsingError, Warning};
pub use grammar::{Assoc, Grammar, NonTerminal, Precedence, Production, Terminal};
pub use lexer::{Lexer, LexerGenerator, SourcePos, Token};
pub use parser::{parse_str, Parser, ParserGenerator, Value};
pub use settings::GeneratorSettings;
pub use table::{Action, LrTable};
