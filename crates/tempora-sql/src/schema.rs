//! Schema grammar.
//!
//! ```text
//! schema   := { create ';' }
//! create   := CREATE TABLE name '(' element { ',' element } ')'
//!             [ WITH SYSTEM VERSIONING ]
//! element  := column | PRIMARY KEY '(' name { ',' name } ')'
//! column   := name type [ '(' n [ ',' m ] ')' ] { NOT NULL | NULL | PRIMARY KEY }
//! ```

use tempora_core::{
  schema::{Column, Relation, Schema},
  types::ScalarType,
};

use crate::{error::Result, lexer::Token, parser::Parser};

pub(crate) fn parse(input: &str) -> Result<Schema> {
  let mut p = Parser::new(input)?;
  let mut schema = Schema::default();

  while !p.is_at_end() {
    if p.consume(&Token::Semicolon) {
      continue;
    }
    let line = p.line();
    let relation = parse_create_table(&mut p)?;
    if schema.relation(&relation.name).is_some() {
      return Err(crate::Error::Invalid {
        line,
        message: format!("duplicate relation {:?}", relation.name),
      });
    }
    schema.relations.push(relation);

    if !p.is_at_end() {
      p.expect(&Token::Semicolon)?;
    }
  }

  Ok(schema)
}

fn parse_create_table(p: &mut Parser) -> Result<Relation> {
  p.expect_keyword("CREATE")?;
  p.expect_keyword("TABLE")?;
  let name = p.parse_identifier()?;
  p.expect(&Token::LParen)?;

  let mut columns: Vec<Column> = Vec::new();
  let mut key_names: Option<Vec<String>> = None;

  loop {
    if p.parse_keyword_sequence(&["PRIMARY", "KEY"]) {
      if key_names.is_some() {
        return p.invalid(format!("relation {name:?} has more than one primary key"));
      }
      key_names = Some(p.parse_parenthesized_identifiers()?);
    } else {
      let (column, inline_key) = parse_column(p)?;
      if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
        return p.invalid(format!("duplicate column {:?} in {name:?}", column.name));
      }
      if inline_key {
        if key_names.is_some() {
          return p.invalid(format!("relation {name:?} has more than one primary key"));
        }
        key_names = Some(vec![column.name.clone()]);
      }
      columns.push(column);
    }

    if p.consume(&Token::Comma) {
      continue;
    }
    p.expect(&Token::RParen)?;
    break;
  }

  let temporal = p.parse_keyword_sequence(&["WITH", "SYSTEM", "VERSIONING"]);

  let Some(key_names) = key_names else {
    return p.invalid(format!("relation {name:?} has no primary key"));
  };
  let mut primary_key = Vec::with_capacity(key_names.len());
  for key in &key_names {
    let Some(idx) = columns.iter().position(|c| c.name.eq_ignore_ascii_case(key)) else {
      return p.invalid(format!("primary key column {key:?} is not a column of {name:?}"));
    };
    if primary_key.contains(&idx) {
      return p.invalid(format!("primary key column {key:?} listed twice"));
    }
    columns[idx].not_null = true;
    primary_key.push(idx);
  }

  Ok(Relation {
    name,
    columns,
    primary_key,
    temporal,
  })
}

/// Returns the column and whether it carried an inline `PRIMARY KEY`.
fn parse_column(p: &mut Parser) -> Result<(Column, bool)> {
  let name = p.parse_identifier()?;
  let type_line = p.line();
  let type_name = p.parse_identifier()?;

  let mut args = Vec::new();
  if p.consume(&Token::LParen) {
    args.push(p.parse_unsigned()?);
    while p.consume(&Token::Comma) {
      args.push(p.parse_unsigned()?);
    }
    p.expect(&Token::RParen)?;
  }
  let ty = ScalarType::from_parts(&type_name, &args).map_err(|e| {
    crate::Error::Invalid {
      line:    type_line,
      message: e.to_string(),
    }
  })?;

  let mut not_null = false;
  let mut primary_key = false;
  loop {
    if p.parse_keyword_sequence(&["NOT", "NULL"]) {
      not_null = true;
    } else if p.parse_keyword("NULL") {
      not_null = false;
    } else if p.parse_keyword_sequence(&["PRIMARY", "KEY"]) {
      primary_key = true;
    } else {
      break;
    }
  }

  Ok((Column { name, ty, not_null }, primary_key))
}
