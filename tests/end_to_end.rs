//! Integration tests driving the public API end to end: lexer plus parser
//! plus generator, covering the boundary cases and concrete scenarios a unit
//! test living inside a single module can't exercise as naturally (pipe
//! alternatives, epsilon productions, right-associative unary operators,
//! precise error positions).

use parsegen::{Assoc, GeneratorSettings, LexerGenerator, ParserGenerator, Value};

fn lex_and_parse<V: 'static>(
    lexer: &parsegen::Lexer,
    parser: &parsegen::Parser<V, ()>,
    input: &str,
) -> Result<V, parsegen::Error> {
    parsegen::parse_str(parser, lexer, &mut (), input)
}

#[test]
fn epsilon_only_start_production_parses_empty_input() {
    let mut gen: ParserGenerator<i64> = ParserGenerator::new(GeneratorSettings::default());
    gen.production("main", &[], Box::new(|_s, _v| 42), None).unwrap();
    gen.start("main").unwrap();
    let (parser, warnings) = gen.build().unwrap();
    assert!(warnings.is_empty());

    let lexer = LexerGenerator::new().build().unwrap();
    let result = parser.parse(&mut (), lexer.lex("")).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn pipe_style_alternatives_share_a_production_list() {
    // "values : none | VALUE | values SPACE VALUE" expressed as three
    // separate add_production calls sharing one nonterminal name.
    let mut lexer = LexerGenerator::new();
    lexer.skip_whitespace(true);
    lexer.add("VALUE", "[a-z]+").unwrap();
    lexer.add("SPACE", " ").unwrap();
    let lexer = lexer.build().unwrap();

    let mut gen: ParserGenerator<Vec<String>> = ParserGenerator::new(GeneratorSettings::default());
    gen.terminal("VALUE").unwrap();
    gen.terminal("SPACE").unwrap();
    gen.production("none", &[], Box::new(|_s, _v| Vec::new()), None).unwrap();
    gen.production(
        "values",
        &["none"],
        Box::new(|_s, mut v| v.pop().unwrap().into_node()),
        None,
    )
    .unwrap();
    gen.production(
        "values",
        &["VALUE"],
        Box::new(|_s, mut v| vec![v.pop().unwrap().into_token().value]),
        None,
    )
    .unwrap();
    gen.production(
        "values",
        &["values", "SPACE", "VALUE"],
        Box::new(|_s, mut v| {
            let last = v.pop().unwrap().into_token().value;
            v.pop();
            let mut rest = v.pop().unwrap().into_node();
            rest.push(last);
            rest
        }),
        None,
    )
    .unwrap();
    gen.start("values").unwrap();
    let (parser, _warnings) = gen.build().unwrap();

    let empty: Vec<String> = lex_and_parse(&lexer, &parser, "").unwrap();
    assert!(empty.is_empty());

    let two = lex_and_parse(&lexer, &parser, "a b").unwrap();
    assert_eq!(two, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn right_associative_unary_minus_binds_tighter_than_binary_minus() {
    let mut lexer = LexerGenerator::new();
    lexer.skip_whitespace(true);
    lexer.add("NUMBER", r"\d+").unwrap();
    lexer.add("MINUS", "-").unwrap();
    let lexer = lexer.build().unwrap();

    let mut gen: ParserGenerator<i64> = ParserGenerator::new(GeneratorSettings::default());
    gen.terminal("NUMBER").unwrap();
    gen.terminal("MINUS").unwrap();
    gen.precedence("MINUS", Assoc::Left, 1).unwrap();
    // UMINUS has no lexer rule of its own; it exists purely as a
    // higher-precedence marker terminal for the unary production to cite.
    gen.terminal("UMINUS").unwrap();
    gen.precedence("UMINUS", Assoc::Right, 2).unwrap();
    gen.production(
        "expr",
        &["MINUS", "expr"],
        Box::new(|_s, mut v| {
            let inner = v.pop().unwrap().into_node();
            v.pop();
            -inner
        }),
        Some("UMINUS"),
    )
    .unwrap();
    gen.production(
        "expr",
        &["expr", "MINUS", "expr"],
        Box::new(|_s, mut v| {
            let rhs = v.pop().unwrap().into_node();
            v.pop();
            let lhs = v.pop().unwrap().into_node();
            lhs - rhs
        }),
        Some("MINUS"),
    )
    .unwrap();
    gen.production(
        "expr",
        &["NUMBER"],
        Box::new(|_s, mut v| v.pop().unwrap().into_token().value.parse::<i64>().unwrap()),
        None,
    )
    .unwrap();
    gen.start("expr").unwrap();
    let (parser, _warnings) = gen.build().unwrap();

    // -4 - 5 == (-4) - 5 == -9
    let result = lex_and_parse(&lexer, &parser, "- 4 - 5").unwrap();
    assert_eq!(result, -9);
}

#[test]
fn missing_handler_error_reports_the_offending_tokens_position() {
    let mut lexer = LexerGenerator::new();
    lexer.skip_whitespace(true);
    lexer.add("VALUE", "[a-z]+").unwrap();
    let lexer = lexer.build().unwrap();

    let mut gen: ParserGenerator<String> = ParserGenerator::new(GeneratorSettings::default());
    gen.terminal("VALUE").unwrap();
    gen.production(
        "main",
        &["VALUE"],
        Box::new(|_s, mut v| v.pop().unwrap().into_token().value),
        None,
    )
    .unwrap();
    gen.start("main").unwrap();
    let (parser, _warnings) = gen.build().unwrap();

    let err = lex_and_parse(&lexer, &parser, "a b").unwrap_err();
    match err {
        parsegen::Error::Parsing(e) => {
            assert_eq!(e.pos.colno, 3);
            assert_eq!(e.token_name, "VALUE");
            assert_eq!(e.token_value, "b");
        }
        other => panic!("expected a parsing error, got {other:?}"),
    }
}

#[test]
fn value_token_accessor_returns_the_lexed_terminal_unmodified() {
    let mut lexer = LexerGenerator::new();
    lexer.add("VALUE", "[a-z]+").unwrap();
    let lexer = lexer.build().unwrap();

    let mut gen: ParserGenerator<String> = ParserGenerator::new(GeneratorSettings::default());
    gen.terminal("VALUE").unwrap();
    gen.production(
        "main",
        &["VALUE"],
        Box::new(|_s, mut v| v.pop().unwrap().into_token().value),
        None,
    )
    .unwrap();
    gen.start("main").unwrap();
    let (parser, _) = gen.build().unwrap();

    let result: String = lex_and_parse(&lexer, &parser, "abc").unwrap();
    assert_eq!(result, "abc");
}

#[test]
fn value_into_node_panics_on_a_raw_token() {
    let token = parsegen::Token {
        name: "X".to_string(),
        value: "x".to_string(),
        pos: parsegen::SourcePos { idx: 0, lineno: 1, colno: 1 },
    };
    let value: Value<i64> = Value::Token(token);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| value.into_node()));
    assert!(result.is_err());
}
