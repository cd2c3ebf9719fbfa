// String literals understand exactly the escapes \n, \t, \" and \\. Escapes are processed once,
// by the tokenizer; printing in readable mode puts them back.

use bimap::BiMap;
use std::fmt;
use std::str::Chars;

lazy_static! {
    static ref ESCAPES: BiMap<char, char> = {
        let mut m = BiMap::new();
        m.insert('\\', '\\');
        m.insert('"', '"');
        m.insert('n', '\n');
        m.insert('t', '\t');
        m
    };
}

struct Unescaper<'a> {
    chars: Chars<'a>,
}

#[derive(Debug, PartialEq)]
pub enum EscapeError {
    UnknownEscape(char),
    TrailingBackslash,
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeError::UnknownEscape(c) => write!(f, "unknown escape sequence `\\{}'", c),
            EscapeError::TrailingBackslash => write!(f, "string ends with a lone backslash"),
        }
    }
}

impl Iterator for Unescaper<'_> {
    type Item = Result<char, EscapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.chars.next()? {
            '\\' => match self.chars.next() {
                None => Err(EscapeError::TrailingBackslash),
                Some(c) => ESCAPES
                    .get_by_left(&c)
                    .copied()
                    .ok_or(EscapeError::UnknownEscape(c)),
            },
            c => Ok(c),
        };
        Some(result)
    }
}

/// The contents of a literal, quotes already stripped, with escapes resolved.
pub(crate) fn unescape(src: &str) -> Result<String, EscapeError> {
    Unescaper { chars: src.chars() }.collect()
}

/// Inverse of `unescape`, with the quotes put back.
pub(crate) fn string_repr(src: &str) -> String {
    let mut output = String::with_capacity(src.len() + 2);
    output.push('"');
    for c in src.chars() {
        match ESCAPES.get_by_right(&c) {
            Some(&escaped) => {
                output.push('\\');
                output.push(escaped);
            }
            None => output.push(c),
        }
    }
    output.push('"');
    output
}
