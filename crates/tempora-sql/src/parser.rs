//! Token cursor shared by the schema and query grammars.

use tempora_core::query::{CompareOp, Expr, Literal};

use crate::{
  error::{Error, Result},
  lexer::{Spanned, Token, tokenize},
};

#[derive(Debug)]
pub(crate) struct Parser {
  toks: Vec<Spanned>,
  /// Index of the token to process next.
  idx:  usize,
  /// Number of `?` placeholders seen so far.
  params: usize,
}

impl Parser {
  pub fn new(input: &str) -> Result<Self> {
    Ok(Self {
      toks:   tokenize(input)?,
      idx:    0,
      params: 0,
    })
  }

  pub fn is_at_end(&self) -> bool { self.idx >= self.toks.len() }

  /// Line of the next token, or of the last token at end of input.
  pub fn line(&self) -> usize {
    self
      .toks
      .get(self.idx)
      .or_else(|| self.toks.last())
      .map_or(1, |t| t.line)
  }

  pub fn peek(&self) -> Option<&Token> { self.toks.get(self.idx).map(|t| &t.token) }

  pub fn next_token(&mut self) -> Option<Token> {
    let tok = self.toks.get(self.idx).map(|t| t.token.clone());
    if tok.is_some() {
      self.idx += 1;
    }
    tok
  }

  pub fn unexpected<T>(&self, expected: &str) -> Result<T> {
    Err(Error::Unexpected {
      line:     self.line(),
      expected: expected.to_owned(),
      found:    self
        .peek()
        .map_or_else(|| "end of input".to_owned(), ToString::to_string),
    })
  }

  pub fn invalid<T>(&self, message: impl Into<String>) -> Result<T> {
    Err(Error::Invalid {
      line:    self.line(),
      message: message.into(),
    })
  }

  /// Consume `keyword` (case-insensitive) if it is next.
  pub fn parse_keyword(&mut self, keyword: &str) -> bool {
    match self.peek() {
      Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => {
        self.idx += 1;
        true
      }
      _ => false,
    }
  }

  /// Consume an exact keyword sequence, or nothing at all.
  pub fn parse_keyword_sequence(&mut self, keywords: &[&str]) -> bool {
    let idx = self.idx;
    for keyword in keywords {
      if !self.parse_keyword(keyword) {
        self.idx = idx;
        return false;
      }
    }
    true
  }

  pub fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
    if self.parse_keyword(keyword) {
      Ok(())
    } else {
      self.unexpected(keyword)
    }
  }

  /// Consume `token` if it is next.
  pub fn consume(&mut self, token: &Token) -> bool {
    if self.peek() == Some(token) {
      self.idx += 1;
      true
    } else {
      false
    }
  }

  pub fn expect(&mut self, token: &Token) -> Result<()> {
    if self.consume(token) {
      Ok(())
    } else {
      self.unexpected(&token.to_string())
    }
  }

  pub fn parse_identifier(&mut self) -> Result<String> {
    match self.peek() {
      Some(Token::Word(w)) => {
        let w = w.clone();
        self.idx += 1;
        Ok(w)
      }
      _ => self.unexpected("identifier"),
    }
  }

  /// `ident [, ident ...]`
  pub fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
    let mut idents = vec![self.parse_identifier()?];
    while self.consume(&Token::Comma) {
      idents.push(self.parse_identifier()?);
    }
    Ok(idents)
  }

  /// `( ident [, ident ...] )`
  pub fn parse_parenthesized_identifiers(&mut self) -> Result<Vec<String>> {
    self.expect(&Token::LParen)?;
    let idents = self.parse_identifier_list()?;
    self.expect(&Token::RParen)?;
    Ok(idents)
  }

  pub fn parse_unsigned(&mut self) -> Result<u32> {
    if let Some(Token::Number(n)) = self.peek()
      && let Ok(v) = n.parse::<u32>()
    {
      self.idx += 1;
      return Ok(v);
    }
    self.unexpected("unsigned integer")
  }

  /// `?`, a numeral, or a quoted string.
  pub fn parse_expr(&mut self) -> Result<Expr> {
    if self.consume(&Token::Param) {
      let index = self.params;
      self.params += 1;
      return Ok(Expr::Param(index));
    }
    let literal = match self.peek() {
      Some(Token::Number(n)) => Literal::Number(n.clone()),
      Some(Token::String(s)) => Literal::String(s.clone()),
      _ => return self.unexpected("'?' or a literal"),
    };
    self.idx += 1;
    Ok(Expr::Literal(literal))
  }

  pub fn parse_compare_op(&mut self) -> Result<CompareOp> {
    match self.peek() {
      Some(Token::Op(op)) => {
        let op = *op;
        self.idx += 1;
        Ok(op)
      }
      _ => self.unexpected("comparison operator"),
    }
  }

  /// Accept an optional `;` and require end of input after it.
  pub fn expect_end(&mut self) -> Result<()> {
    self.consume(&Token::Semicolon);
    if self.is_at_end() {
      Ok(())
    } else {
      self.unexpected("end of statement")
    }
  }
}
