//! Tokenizer shared by the schema and query parsers.

use std::fmt;

use tempora_core::query::CompareOp;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
  /// An identifier or keyword, exactly as written.
  Word(String),
  /// An integer or decimal numeral, including a leading `-`.
  Number(String),
  /// A single-quoted string with `''` already collapsed.
  String(String),
  Param,
  Comma,
  LParen,
  RParen,
  Semicolon,
  Star,
  Op(CompareOp),
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Word(w) => write!(f, "{w:?}"),
      Self::Number(n) => write!(f, "number {n}"),
      Self::String(s) => write!(f, "string '{s}'"),
      Self::Param => f.write_str("'?'"),
      Self::Comma => f.write_str("','"),
      Self::LParen => f.write_str("'('"),
      Self::RParen => f.write_str("')'"),
      Self::Semicolon => f.write_str("';'"),
      Self::Star => f.write_str("'*'"),
      Self::Op(op) => write!(f, "'{}'", op.symbol()),
    }
  }
}

/// A token and the 1-based line it starts on.
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
  pub token: Token,
  pub line:  usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
  let mut tokens = Vec::new();
  let mut chars = input.chars().peekable();
  let mut line = 1usize;

  while let Some(&c) = chars.peek() {
    let start_line = line;
    let token = match c {
      '\n' => {
        line += 1;
        chars.next();
        continue;
      }
      c if c.is_whitespace() => {
        chars.next();
        continue;
      }
      '-' => {
        chars.next();
        match chars.peek().copied() {
          Some('-') => {
            // Line comment; the newline itself is handled above.
            while chars.peek().is_some_and(|&c| c != '\n') {
              chars.next();
            }
            continue;
          }
          Some(d) if d.is_ascii_digit() || d == '.' => {
            let mut n = String::from("-");
            take_number(&mut chars, &mut n);
            Token::Number(n)
          }
          _ => return Err(Error::UnexpectedChar { line, ch: '-' }),
        }
      }
      c if c.is_ascii_digit() => {
        let mut n = String::new();
        take_number(&mut chars, &mut n);
        Token::Number(n)
      }
      c if c.is_alphabetic() || c == '_' => {
        let mut w = String::new();
        while let Some(&c) = chars.peek() {
          if !(c.is_alphanumeric() || c == '_') {
            break;
          }
          w.push(c);
          chars.next();
        }
        Token::Word(w)
      }
      '\'' => {
        chars.next();
        let mut s = String::new();
        loop {
          match chars.next() {
            None => return Err(Error::UnterminatedString { line: start_line }),
            Some('\'') if chars.peek() == Some(&'\'') => {
              chars.next();
              s.push('\'');
            }
            Some('\'') => break,
            Some(c) => {
              if c == '\n' {
                line += 1;
              }
              s.push(c);
            }
          }
        }
        Token::String(s)
      }
      _ => {
        chars.next();
        match c {
          '?' => Token::Param,
          ',' => Token::Comma,
          '(' => Token::LParen,
          ')' => Token::RParen,
          ';' => Token::Semicolon,
          '*' => Token::Star,
          '=' => Token::Op(CompareOp::Eq),
          '<' => match chars.peek().copied() {
            Some('=') => {
              chars.next();
              Token::Op(CompareOp::LtEq)
            }
            Some('>') => {
              chars.next();
              Token::Op(CompareOp::NotEq)
            }
            _ => Token::Op(CompareOp::Lt),
          },
          '>' => {
            if chars.peek() == Some(&'=') {
              chars.next();
              Token::Op(CompareOp::GtEq)
            } else {
              Token::Op(CompareOp::Gt)
            }
          }
          '!' if chars.peek() == Some(&'=') => {
            chars.next();
            Token::Op(CompareOp::NotEq)
          }
          other => return Err(Error::UnexpectedChar { line, ch: other }),
        }
      }
    };
    tokens.push(Spanned {
      token,
      line: start_line,
    });
  }

  Ok(tokens)
}

fn take_number(
  chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
  out: &mut String,
) {
  while let Some(&c) = chars.peek() {
    if !(c.is_ascii_digit() || c == '.') {
      break;
    }
    out.push(c);
    chars.next();
  }
}
