//! Statement grammar.
//!
//! ```text
//! query   := [ EXPLAIN ] ( insert | update | delete | select ) [ ';' ]
//! insert  := INSERT INTO name [ '(' name { ',' name } ')' ]
//!            VALUES '(' expr { ',' expr } ')'
//! update  := UPDATE name SET name '=' expr { ',' name '=' expr } [ where ]
//! delete  := DELETE FROM name [ where ]
//! select  := SELECT ( '*' | name { ',' name } ) FROM name
//!            [ FOR SYSTEM_TIME AS OF expr ] [ where ]
//! where   := WHERE name op expr { AND name op expr }
//! ```

use tempora_core::query::{
  Assignment, CompareOp, Comparison, Projection, Query, Statement,
};

use crate::{error::Result, lexer::Token, parser::Parser};

pub(crate) fn parse(input: &str) -> Result<Query> {
  let mut p = Parser::new(input)?;
  let explain = p.parse_keyword("EXPLAIN");

  let statement = if p.parse_keyword("INSERT") {
    parse_insert(&mut p)?
  } else if p.parse_keyword("UPDATE") {
    parse_update(&mut p)?
  } else if p.parse_keyword("DELETE") {
    parse_delete(&mut p)?
  } else if p.parse_keyword("SELECT") {
    parse_select(&mut p)?
  } else {
    return p.unexpected("INSERT, UPDATE, DELETE or SELECT");
  };

  p.expect_end()?;
  Ok(Query { statement, explain })
}

fn parse_insert(p: &mut Parser) -> Result<Statement> {
  p.expect_keyword("INTO")?;
  let table = p.parse_identifier()?;
  let columns = if p.peek() == Some(&Token::LParen) {
    Some(p.parse_parenthesized_identifiers()?)
  } else {
    None
  };

  p.expect_keyword("VALUES")?;
  p.expect(&Token::LParen)?;
  let mut values = vec![p.parse_expr()?];
  while p.consume(&Token::Comma) {
    values.push(p.parse_expr()?);
  }
  p.expect(&Token::RParen)?;

  if let Some(cols) = &columns
    && cols.len() != values.len()
  {
    return p.invalid(format!(
      "INSERT names {} columns but supplies {} values",
      cols.len(),
      values.len()
    ));
  }

  Ok(Statement::Insert {
    table,
    columns,
    values,
  })
}

fn parse_update(p: &mut Parser) -> Result<Statement> {
  let table = p.parse_identifier()?;
  p.expect_keyword("SET")?;

  let mut assignments = Vec::new();
  loop {
    let column = p.parse_identifier()?;
    p.expect(&Token::Op(CompareOp::Eq))?;
    let value = p.parse_expr()?;
    assignments.push(Assignment { column, value });
    if !p.consume(&Token::Comma) {
      break;
    }
  }

  let predicate = parse_where(p)?;
  Ok(Statement::Update {
    table,
    assignments,
    predicate,
  })
}

fn parse_delete(p: &mut Parser) -> Result<Statement> {
  p.expect_keyword("FROM")?;
  let table = p.parse_identifier()?;
  let predicate = parse_where(p)?;
  Ok(Statement::Delete { table, predicate })
}

fn parse_select(p: &mut Parser) -> Result<Statement> {
  let projection = if p.consume(&Token::Star) {
    Projection::All
  } else {
    Projection::Columns(p.parse_identifier_list()?)
  };

  p.expect_keyword("FROM")?;
  let table = p.parse_identifier()?;

  let as_of = if p.parse_keyword_sequence(&["FOR", "SYSTEM_TIME", "AS", "OF"]) {
    Some(p.parse_expr()?)
  } else {
    None
  };

  let predicate = parse_where(p)?;
  Ok(Statement::Select {
    table,
    projection,
    as_of,
    predicate,
  })
}

fn parse_where(p: &mut Parser) -> Result<Vec<Comparison>> {
  if !p.parse_keyword("WHERE") {
    return Ok(Vec::new());
  }
  let mut predicate = Vec::new();
  loop {
    let column = p.parse_identifier()?;
    let op = p.parse_compare_op()?;
    let value = p.parse_expr()?;
    predicate.push(Comparison { column, op, value });
    if !p.parse_keyword("AND") {
      break;
    }
  }
  Ok(predicate)
}
