use crate::location::{Location, SourceFile};
use crate::strings::{self, EscapeError};
use regex::Regex;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Quote,
    Symbol(String),
    Atom(String),
    Numeral(String),
    StringLiteral(String),
    Terminator,
    EndOfInput,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

#[derive(Debug)]
pub enum TokenizerError {
    UnterminatedString,
    BadEscape(EscapeError),
    UnclosedParen,
    UnexpectedCloseParen,
    NoCapture(char),
}

#[derive(Debug)]
pub struct Error {
    pub kind: TokenizerError,
    pub location: Location,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenizerError::UnterminatedString => write!(
                f,
                "unexpected EOF while reading string, please check that you closed your quote"
            ),
            TokenizerError::BadEscape(e) => write!(f, "{}", e),
            TokenizerError::UnclosedParen => write!(
                f,
                "unbalanced parentheses: this `(' is never closed"
            ),
            TokenizerError::UnexpectedCloseParen => write!(
                f,
                "unbalanced parentheses: this `)' has nothing to close"
            ),
            TokenizerError::NoCapture(c) => write!(f, "no token starts with {:?}", c),
        }
    }
}

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(
        r#"(?x)                              # ignore whitespace in this pattern & allow comments
            \A(?:
                (?P<newline>\n)
                |(?P<space>[^\S\n]+)         # other whitespace, ignored
                |(?P<comment>;[^\n]*)        # comments run to the end of the line
                |(?P<open>\()
                |(?P<close>\))
                |(?P<quote>')
                |(?P<string>"(?:             # string literal. its contents, not captured, include:
                    \\(?s:.)                 #    escapes
                    |[^\\"]                  #    anything which isn't a backslash or a quote
                  )*
                  "?)                        #    possibly missing a closing quote
                |(?P<plain>[^\s()'";][^\s()";]*)
            )
        "#
    )
    .unwrap();
}

fn classify_plain(text: &str) -> TokenKind {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(':'), Some(_)) => TokenKind::Atom(text.into()),
        (Some(c), _) if c.is_ascii_digit() => TokenKind::Numeral(text.into()),
        (Some('+'), Some(d)) | (Some('-'), Some(d)) if d.is_ascii_digit() => {
            TokenKind::Numeral(text.into())
        }
        _ => TokenKind::Symbol(text.into()),
    }
}

fn string_literal(captured: &str, location: &Location) -> Result<TokenKind, Error> {
    let fail = |kind| Error {
        kind,
        location: location.clone(),
    };
    let bytes = captured.as_bytes();
    if bytes.len() == 1 || bytes[bytes.len() - 1] != b'"' {
        return Err(fail(TokenizerError::UnterminatedString));
    }
    let trailing_backslashes = bytes
        .iter()
        .rev()
        .skip(1)
        .take_while(|&&byte| byte == b'\\')
        .count();
    if trailing_backslashes % 2 == 1 {
        return Err(fail(TokenizerError::UnterminatedString));
    }
    // Both quotes are ASCII, so slicing them off is safe on any UTF-8 payload.
    strings::unescape(&captured[1..captured.len() - 1])
        .map(TokenKind::StringLiteral)
        .map_err(|e| fail(TokenizerError::BadEscape(e)))
}

/// Splits a whole file into tokens, ending with `EndOfInput`. Parentheses are checked for balance
/// here, so the parser never sees a stray `)` or an unclosed list.
pub fn tokenize(source: &Rc<SourceFile>) -> Result<Vec<Token>, Error> {
    let mut input = source.text.as_str();
    let (mut line, mut column) = (1, 1);
    let mut tokens = Vec::new();
    let mut open_parens: Vec<Location> = Vec::new();

    while !input.is_empty() {
        let caps = TOKEN_RE.captures(input).ok_or_else(|| Error {
            kind: TokenizerError::NoCapture(input.chars().next().unwrap_or('\0')),
            location: Location::new(source, line, column, 1),
        })?;
        let matched = caps.get(0).map_or("", |m| m.as_str());
        let span = matched.chars().count();
        let location = Location::new(source, line, column, span);

        let kind = if caps.name("newline").is_some() {
            Some(TokenKind::Terminator)
        } else if caps.name("space").is_some() || caps.name("comment").is_some() {
            None
        } else if caps.name("open").is_some() {
            open_parens.push(location.clone());
            Some(TokenKind::OpenParen)
        } else if caps.name("close").is_some() {
            if open_parens.pop().is_none() {
                return Err(Error {
                    kind: TokenizerError::UnexpectedCloseParen,
                    location,
                });
            }
            Some(TokenKind::CloseParen)
        } else if caps.name("quote").is_some() {
            Some(TokenKind::Quote)
        } else if let Some(m) = caps.name("string") {
            Some(string_literal(m.as_str(), &location)?)
        } else if let Some(m) = caps.name("plain") {
            Some(classify_plain(m.as_str()))
        } else {
            return Err(Error {
                kind: TokenizerError::NoCapture(input.chars().next().unwrap_or('\0')),
                location,
            });
        };
        if let Some(kind) = kind {
            tokens.push(Token { kind, location });
        }

        match matched.rfind('\n') {
            Some(last) => {
                line += matched.matches('\n').count();
                column = matched[last + 1..].chars().count() + 1;
            }
            None => column += span,
        }
        input = &input[matched.len()..];
    }

    if let Some(unclosed) = open_parens.pop() {
        return Err(Error {
            kind: TokenizerError::UnclosedParen,
            location: unclosed,
        });
    }
    tokens.push(Token {
        kind: TokenKind::EndOfInput,
        location: Location::new(source, line, column, 1),
    });
    Ok(tokens)
}
