//! LogQL tokenizer built with nom.
//!
//! Whitespace and `#` comments are skipped. Characters that start no token
//! become [`TokenKind::Unknown`] so the parser can wrap them in error nodes.

use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag, tag_no_case, take_while, take_while1},
    character::complete::{anychar, char, digit1, one_of},
    combinator::{map, opt, recognize, value},
    multi::many1,
    sequence::{pair, preceded, tuple},
    IResult,
};

/// Lexical token class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident,
    /// Double-quoted or backtick string, possibly unterminated.
    String,
    /// Integer or decimal literal
    Number,
    /// `5m`, `1h30m`
    Duration,
    /// `10KB`, `1.5MiB`
    Bytes,
    /// `--strict`, `--keep-empty`
    Flag,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `=~`
    Re,
    /// `!~`
    Nre,
    /// `==`
    Eql,
    /// `>`
    Gtr,
    /// `>=`
    Gte,
    /// `<`
    Lss,
    /// `<=`
    Lte,
    /// `|`
    Pipe,
    /// `|=`
    PipeExact,
    /// `|~`
    PipeMatch,
    /// `|>`
    PipePattern,
    /// `!>`
    NotPipePattern,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// Anything the lexer does not recognize
    Unknown,
}

/// A token with its byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token class
    pub kind: TokenKind,
    /// Start byte offset
    pub from: usize,
    /// End byte offset, exclusive
    pub to: usize,
}

impl Token {
    /// Source text of the token.
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        src.get(self.from..self.to).unwrap_or("")
    }
}

/// Splits `src` into tokens. Never fails.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = src;

    loop {
        rest = skip_trivia(rest);
        if rest.is_empty() {
            break;
        }

        let from = src.len() - rest.len();
        let (remaining, kind) = match token(rest) {
            Ok(ok) => ok,
            Err(_) => {
                // anychar cannot fail on non-empty input; this only guards the loop
                let width = rest.chars().next().map_or(1, char::len_utf8);
                (&rest[width..], TokenKind::Unknown)
            },
        };
        let to = src.len() - remaining.len();
        tokens.push(Token { kind, from, to });
        rest = remaining;
    }

    tokens
}

/// Whether a string token has its closing quote.
pub fn is_terminated_string(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(quote) = chars.next() else {
        return false;
    };
    if text.len() < 2 || !text.ends_with(quote) {
        return false;
    }
    if quote == '`' {
        return true;
    }
    let body = &text[1..text.len() - 1];
    let trailing_backslashes = body.chars().rev().take_while(|&c| c == '\\').count();
    trailing_backslashes % 2 == 0
}

fn skip_trivia(mut input: &str) -> &str {
    loop {
        let trimmed = input.trim_start();
        if let Some(comment) = trimmed.strip_prefix('#') {
            input = comment.find('\n').map_or("", |i| &comment[i..]);
        } else {
            return trimmed;
        }
    }
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        literal,
        value(TokenKind::Ident, identifier),
        string_token,
        flag,
        operator,
        value(TokenKind::Unknown, anychar),
    ))(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_char),
    ))(input)
}

fn string_token(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::String,
        alt((double_quoted, backtick_quoted)),
    )(input)
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('"'),
        opt(escaped(is_not("\"\\"), '\\', anychar)),
        opt(char('"')),
    )))(input)
}

fn backtick_quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((char('`'), take_while(|c| c != '`'), opt(char('`')))))(input)
}

fn flag(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::Flag,
        recognize(preceded(
            tag("--"),
            pair(
                take_while1(|c: char| c.is_ascii_alphabetic()),
                take_while(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            ),
        )),
    )(input)
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        alt((
            value(TokenKind::PipeExact, tag("|=")),
            value(TokenKind::PipeMatch, tag("|~")),
            value(TokenKind::PipePattern, tag("|>")),
            value(TokenKind::Pipe, tag("|")),
            value(TokenKind::Neq, tag("!=")),
            value(TokenKind::Nre, tag("!~")),
            value(TokenKind::NotPipePattern, tag("!>")),
            value(TokenKind::Eql, tag("==")),
            value(TokenKind::Re, tag("=~")),
            value(TokenKind::Eq, tag("=")),
            value(TokenKind::Gte, tag(">=")),
            value(TokenKind::Gtr, tag(">")),
            value(TokenKind::Lte, tag("<=")),
            value(TokenKind::Lss, tag("<")),
        )),
        alt((
            value(TokenKind::LBrace, char('{')),
            value(TokenKind::RBrace, char('}')),
            value(TokenKind::LParen, char('(')),
            value(TokenKind::RParen, char(')')),
            value(TokenKind::LBracket, char('[')),
            value(TokenKind::RBracket, char(']')),
            value(TokenKind::Comma, char(',')),
            value(TokenKind::Add, char('+')),
            value(TokenKind::Sub, char('-')),
            value(TokenKind::Mul, char('*')),
            value(TokenKind::Div, char('/')),
            value(TokenKind::Mod, char('%')),
            value(TokenKind::Pow, char('^')),
        )),
    ))(input)
}

fn decimal(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        decimal,
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input)
}

fn duration_unit(input: &str) -> IResult<&str, &str> {
    alt((
        tag("ns"),
        tag("us"),
        tag("µs"),
        tag("ms"),
        tag("s"),
        tag("m"),
        tag("h"),
        tag("d"),
        tag("w"),
        tag("y"),
    ))(input)
}

fn duration(input: &str) -> IResult<&str, &str> {
    recognize(many1(pair(decimal, duration_unit)))(input)
}

fn bytes_unit(input: &str) -> IResult<&str, &str> {
    alt((
        tag_no_case("kib"),
        tag_no_case("kb"),
        tag_no_case("mib"),
        tag_no_case("mb"),
        tag_no_case("gib"),
        tag_no_case("gb"),
        tag_no_case("tib"),
        tag_no_case("tb"),
        tag_no_case("pib"),
        tag_no_case("pb"),
        tag_no_case("eib"),
        tag_no_case("eb"),
        tag_no_case("b"),
    ))(input)
}

fn bytes(input: &str) -> IResult<&str, &str> {
    recognize(pair(decimal, bytes_unit))(input)
}

fn at_boundary(rest: &str) -> bool {
    !rest.starts_with(is_ident_char)
}

/// Numbers, durations and byte sizes. The longest unit-suffixed match that
/// ends on a word boundary wins; otherwise the bare number is taken.
fn literal(input: &str) -> IResult<&str, TokenKind> {
    let candidates = [
        (TokenKind::Duration, duration(input)),
        (TokenKind::Bytes, bytes(input)),
    ];

    let best = candidates
        .into_iter()
        .filter_map(|(kind, res)| res.ok().map(|(rest, _)| (kind, rest)))
        .filter(|(_, rest)| at_boundary(rest))
        .min_by_key(|(_, rest)| rest.len());

    if let Some((kind, rest)) = best {
        return Ok((rest, kind));
    }

    map(number, |_| TokenKind::Number)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src).into_iter().map(|t| t.text(src)).collect()
    }

    #[test]
    fn test_selector_tokens() {
        assert_eq!(
            kinds(r#"{job="mysql", app=~"a.*"}"#),
            vec![
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Re,
                TokenKind::String,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_line_filter_operators() {
        assert_eq!(
            kinds(r#"|= "a" != "b" |~ "c" !~ "d" |> "e" !> "f" |"#),
            vec![
                TokenKind::PipeExact,
                TokenKind::String,
                TokenKind::Neq,
                TokenKind::String,
                TokenKind::PipeMatch,
                TokenKind::String,
                TokenKind::Nre,
                TokenKind::String,
                TokenKind::PipePattern,
                TokenKind::String,
                TokenKind::NotPipePattern,
                TokenKind::String,
                TokenKind::Pipe,
            ]
        );
    }

    #[test]
    fn test_durations_and_bytes() {
        assert_eq!(kinds("5m"), vec![TokenKind::Duration]);
        assert_eq!(kinds("1h30m"), vec![TokenKind::Duration]);
        assert_eq!(kinds("250ms"), vec![TokenKind::Duration]);
        assert_eq!(kinds("10µs"), vec![TokenKind::Duration]);
        assert_eq!(kinds("20MB"), vec![TokenKind::Bytes]);
        assert_eq!(kinds("1kib"), vec![TokenKind::Bytes]);
        assert_eq!(kinds("2.5"), vec![TokenKind::Number]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Number]);
        assert_eq!(kinds("5min"), vec![TokenKind::Number, TokenKind::Ident]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(texts(r#""a \"quoted\" value""#), vec![r#""a \"quoted\" value""#]);
        assert_eq!(texts("`raw \\ string`"), vec!["`raw \\ string`"]);
        assert_eq!(texts(r#""unterminated"#), vec![r#""unterminated"#]);
        assert!(is_terminated_string(r#""ok""#));
        assert!(is_terminated_string("``"));
        assert!(!is_terminated_string(r#"""#));
        assert!(!is_terminated_string(r#""open \""#));
        assert!(is_terminated_string(r#""slash \\""#));
    }

    #[test]
    fn test_flags_comments_and_unknown() {
        assert_eq!(
            kinds("logfmt --strict --keep-empty # trailing comment"),
            vec![TokenKind::Ident, TokenKind::Flag, TokenKind::Flag]
        );
        assert_eq!(kinds("$__interval"), vec![TokenKind::Unknown, TokenKind::Ident]);
        assert_eq!(kinds("5 - -3"), vec![
            TokenKind::Number,
            TokenKind::Sub,
            TokenKind::Sub,
            TokenKind::Number
        ]);
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = tokenize("  {a=\"µ\"}");
        assert_eq!(tokens[0].from, 2);
        assert_eq!(tokens[3].from, 5);
        assert_eq!(tokens[3].to, 9);
        assert_eq!(tokens[4].from, 9);
    }
}
