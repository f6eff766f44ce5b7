//! Listing assembler: generated source text → [`CompiledUnit`].
//!
//! This is the in-process build step. It only checks that a listing is well
//! formed; whether the referenced columns exist in a database is checked when
//! the unit runs.

use std::str::FromStr;

use tempora_core::{
  query::CompareOp,
  schema::{Column, Relation, Schema},
  types::ScalarType,
};

use crate::{
  Error, Result,
  program::{
    ABI_VERSION, Access, Body, CompiledUnit, DefinitionProgram, Filter, Operand,
    Operation, Program, QueryProgram,
  },
};

/// Assemble a listing into a unit object.
pub fn assemble(listing: &str) -> Result<CompiledUnit> {
  let mut lines = Lines::new(listing)?;

  let mut header = lines.expect_line("unit header")?;
  header.keyword("unit")?;
  let kind = header.word()?;
  header.finish()?;

  let mut exports = Vec::new();
  while lines.peek_keyword() == Some("export") {
    let mut line = lines.expect_line("export")?;
    line.keyword("export")?;
    exports.push(line.word()?);
    line.finish()?;
  }

  let program = match kind.as_str() {
    "definition" => Program::Definition(definition(&mut lines)?),
    "query" => Program::Query(query(&mut lines)?),
    other => return Err(header.error(format!("unknown unit kind {other:?}"))),
  };

  if let Some(line) = lines.next() {
    return Err(line.error("content after end of unit"));
  }

  Ok(CompiledUnit {
    abi: ABI_VERSION,
    exports,
    program,
  })
}

// ─── Definition units ────────────────────────────────────────────────────────

fn definition(lines: &mut Lines) -> Result<DefinitionProgram> {
  let mut schema = Schema::default();

  while lines.peek_keyword().is_some() {
    let mut head = lines.expect_line("relation")?;
    head.keyword("relation")?;
    let name = head.quoted()?;
    let temporal = match head.word()?.as_str() {
      "temporal" => true,
      "plain" => false,
      other => return Err(head.error(format!("expected temporal or plain, found {other:?}"))),
    };
    head.finish()?;

    let mut columns = Vec::new();
    while lines.peek_keyword() == Some("column") {
      let mut line = lines.expect_line("column")?;
      line.keyword("column")?;
      let name = line.quoted()?;
      let ty = line.scalar_type()?;
      let not_null = line.optional("notnull");
      line.finish()?;
      columns.push(Column { name, ty, not_null });
    }

    let mut key_line = lines.expect_line("key")?;
    key_line.keyword("key")?;
    let mut primary_key = Vec::new();
    while !key_line.is_done() {
      let column = key_line.quoted()?;
      let Some(idx) = columns.iter().position(|c| c.name == column) else {
        return Err(key_line.error(format!("key column {column:?} is not declared")));
      };
      primary_key.push(idx);
    }
    if primary_key.is_empty() {
      return Err(key_line.error("empty key"));
    }

    let mut end = lines.expect_line("end")?;
    end.keyword("end")?;
    end.finish()?;

    schema.relations.push(Relation {
      name,
      columns,
      primary_key,
      temporal,
    });
  }

  Ok(DefinitionProgram { schema })
}

// ─── Query units ─────────────────────────────────────────────────────────────

fn query(lines: &mut Lines) -> Result<QueryProgram> {
  let mut line = lines.expect_line("params")?;
  line.keyword("params")?;
  let params = line.index()?;
  line.finish()?;

  let mut line = lines.expect_line("table")?;
  line.keyword("table")?;
  let table = line.quoted()?;
  line.finish()?;

  let mut op_line = lines.expect_line("operation")?;
  let op = op_line.word()?;
  if op == "explain" {
    let text = op_line.quoted()?;
    op_line.finish()?;
    return Ok(QueryProgram {
      params,
      table,
      body: Body::Explain(text),
    });
  }
  op_line.finish()?;

  let mut c = Clauses::default();
  loop {
    let mut line = lines.expect_line("clause or end")?;
    let clause = line.word()?;
    match clause.as_str() {
      "end" => {
        line.finish()?;
        break;
      }
      "set" => {
        let column = line.index()?;
        c.sets.push((column, line.operand()?));
      }
      "seek" => {
        if c.seek.is_some() {
          return Err(line.error("second seek"));
        }
        let mut key = Vec::new();
        while !line.is_done() {
          key.push(line.operand()?);
        }
        if key.is_empty() {
          return Err(line.error("seek without key values"));
        }
        c.seek = Some(key);
      }
      "filter" => {
        let column = line.index()?;
        let op = line.compare_op()?;
        let operand = line.operand()?;
        c.filters.push(Filter {
          column,
          op,
          operand,
        });
      }
      "project" => {
        let mut columns = Vec::new();
        while !line.is_done() {
          columns.push(line.index()?);
        }
        c.projection = Some(columns);
      }
      "asof" => c.as_of = Some(line.operand()?),
      other => return Err(line.error(format!("unknown clause {other:?}"))),
    }
    line.finish()?;
    c.seen.push((clause, line.number));
  }

  let operation = c.into_operation(&op, op_line.number)?;
  Ok(QueryProgram {
    params,
    table,
    body: Body::Execute(operation),
  })
}

#[derive(Default)]
struct Clauses {
  sets:       Vec<(usize, Operand)>,
  seek:       Option<Vec<Operand>>,
  filters:    Vec<Filter>,
  projection: Option<Vec<usize>>,
  as_of:      Option<Operand>,
  seen:       Vec<(String, usize)>,
}

impl Clauses {
  fn into_operation(self, op: &str, line: usize) -> Result<Operation> {
    let allowed: &[&str] = match op {
      "insert" => &["set"],
      "update" => &["set", "seek", "filter"],
      "delete" => &["seek", "filter"],
      "select" => &["project", "asof", "seek", "filter"],
      other => {
        return Err(Error::Assemble {
          line,
          message: format!("unknown operation {other:?}"),
        });
      }
    };
    if let Some((clause, at)) = self.seen.iter().find(|(c, _)| !allowed.contains(&c.as_str())) {
      return Err(Error::Assemble {
        line:    *at,
        message: format!("{clause} is not valid in {op}"),
      });
    }

    let access = Access {
      seek:    self.seek,
      filters: self.filters,
    };
    Ok(match op {
      "insert" => Operation::Insert { values: self.sets },
      "update" => {
        if self.sets.is_empty() {
          return Err(Error::Assemble {
            line,
            message: "update without set".into(),
          });
        }
        Operation::Update {
          assignments: self.sets,
          access,
        }
      }
      "delete" => Operation::Delete { access },
      _ => {
        let Some(projection) = self.projection else {
          return Err(Error::Assemble {
            line,
            message: "select without project".into(),
          });
        };
        Operation::Select {
          projection,
          as_of: self.as_of,
          access,
        }
      }
    })
  }
}

// ─── Line tokenizer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
  Word(String),
  Quoted(String),
}

/// Split one listing line into bare words and quoted strings.
fn split_line(text: &str, number: usize) -> Result<Vec<Tok>> {
  let error = |message: String| Error::Assemble {
    line: number,
    message,
  };
  let mut toks = Vec::new();
  let mut chars = text.chars().peekable();

  while let Some(c) = chars.peek().copied() {
    if c.is_whitespace() {
      chars.next();
    } else if c == '"' {
      chars.next();
      let mut s = String::new();
      loop {
        match chars.next() {
          Some('"') => break,
          Some('\\') => match chars.next() {
            Some('n') => s.push('\n'),
            Some('\\') => s.push('\\'),
            Some('"') => s.push('"'),
            other => return Err(error(format!("invalid escape {other:?}"))),
          },
          Some(ch) => s.push(ch),
          None => return Err(error("unterminated string".into())),
        }
      }
      toks.push(Tok::Quoted(s));
    } else {
      let mut s = String::new();
      while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() || ch == '"' {
          break;
        }
        s.push(ch);
        chars.next();
      }
      toks.push(Tok::Word(s));
    }
  }
  Ok(toks)
}

/// Non-blank, non-comment lines of a listing.
struct Lines {
  lines: std::vec::IntoIter<Line>,
  peek:  Option<Line>,
  last:  usize,
}

impl Lines {
  fn new(listing: &str) -> Result<Self> {
    let mut lines = Vec::new();
    let mut last = 0;
    for (i, raw) in listing.lines().enumerate() {
      last = i + 1;
      let trimmed = raw.trim();
      if trimmed.is_empty() || trimmed.starts_with(';') {
        continue;
      }
      lines.push(Line {
        number: i + 1,
        toks:   split_line(trimmed, i + 1)?,
        idx:    0,
      });
    }
    let mut lines = lines.into_iter();
    let peek = lines.next();
    Ok(Self { lines, peek, last })
  }

  fn next(&mut self) -> Option<Line> {
    let line = self.peek.take();
    self.peek = self.lines.next();
    line
  }

  fn expect_line(&mut self, expected: &str) -> Result<Line> {
    self.next().ok_or_else(|| Error::Assemble {
      line:    self.last,
      message: format!("unexpected end of listing, expected {expected}"),
    })
  }

  fn peek_keyword(&self) -> Option<&str> {
    match self.peek.as_ref()?.toks.first()? {
      Tok::Word(w) => Some(w),
      Tok::Quoted(_) => None,
    }
  }
}

struct Line {
  number: usize,
  toks:   Vec<Tok>,
  idx:    usize,
}

impl Line {
  fn error(&self, message: impl Into<String>) -> Error {
    Error::Assemble {
      line:    self.number,
      message: message.into(),
    }
  }

  fn is_done(&self) -> bool { self.idx >= self.toks.len() }

  fn take(&mut self) -> Option<Tok> {
    let tok = self.toks.get(self.idx).cloned();
    if tok.is_some() {
      self.idx += 1;
    }
    tok
  }

  fn word(&mut self) -> Result<String> {
    match self.take() {
      Some(Tok::Word(w)) => Ok(w),
      Some(Tok::Quoted(q)) => Err(self.error(format!("expected a word, found string {q:?}"))),
      None => Err(self.error("expected a word, found end of line")),
    }
  }

  fn quoted(&mut self) -> Result<String> {
    match self.take() {
      Some(Tok::Quoted(q)) => Ok(q),
      Some(Tok::Word(w)) => Err(self.error(format!("expected a string, found {w:?}"))),
      None => Err(self.error("expected a string, found end of line")),
    }
  }

  fn keyword(&mut self, keyword: &str) -> Result<()> {
    let word = self.word()?;
    if word != keyword {
      return Err(self.error(format!("expected {keyword}, found {word:?}")));
    }
    Ok(())
  }

  fn optional(&mut self, keyword: &str) -> bool {
    if self.toks.get(self.idx) == Some(&Tok::Word(keyword.to_owned())) {
      self.idx += 1;
      return true;
    }
    false
  }

  fn finish(&self) -> Result<()> {
    match self.toks.get(self.idx) {
      None => Ok(()),
      Some(tok) => Err(self.error(format!("unexpected trailing {tok:?}"))),
    }
  }

  fn index(&mut self) -> Result<usize> {
    let word = self.word()?;
    word
      .parse()
      .map_err(|_| self.error(format!("expected a number, found {word:?}")))
  }

  fn scalar_type(&mut self) -> Result<ScalarType> {
    let word = self.word()?;
    ScalarType::from_str(&word).map_err(|e| self.error(e.to_string()))
  }

  fn compare_op(&mut self) -> Result<CompareOp> {
    let word = self.word()?;
    Ok(match word.as_str() {
      "=" => CompareOp::Eq,
      "<>" | "!=" => CompareOp::NotEq,
      "<" => CompareOp::Lt,
      "<=" => CompareOp::LtEq,
      ">" => CompareOp::Gt,
      ">=" => CompareOp::GtEq,
      _ => return Err(self.error(format!("unknown comparison {word:?}"))),
    })
  }

  /// `param <i> <type>` or `const <type> "<text>"`.
  fn operand(&mut self) -> Result<Operand> {
    match self.word()?.as_str() {
      "param" => {
        let index = self.index()?;
        let ty = self.scalar_type()?;
        Ok(Operand::Param { index, ty })
      }
      "const" => {
        let ty = self.scalar_type()?;
        let text = self.quoted()?;
        let value = ty.parse_value(&text).map_err(|e| self.error(e.to_string()))?;
        Ok(Operand::Const { ty, value })
      }
      other => Err(self.error(format!("expected param or const, found {other:?}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use tempora_core::types::Value;

  use super::*;
  use crate::{
    emit::{definition_source, quote, query_source},
    program::{GET_SIZE, MAKE_DATABASE, QUERY},
  };

  fn schema() -> Schema {
    tempora_sql::parse_schema(
      "CREATE TABLE warehouse (w_id integer PRIMARY KEY, w_city varchar(20))
         WITH SYSTEM VERSIONING;
       CREATE TABLE warehouseold (w_id integer PRIMARY KEY, w_city varchar(20));",
    )
    .unwrap()
  }

  #[test]
  fn definition_assembles_back_to_schema() {
    let unit = assemble(&definition_source(&schema()).text).unwrap();
    assert_eq!(unit.abi, ABI_VERSION);
    assert!(unit.exports(MAKE_DATABASE));
    assert!(unit.exports(GET_SIZE));
    assert!(!unit.exports(QUERY));
    let Program::Definition(def) = unit.program else {
      panic!("expected definition");
    };
    assert_eq!(def.schema, schema());
  }

  #[test]
  fn query_listing_assembles() {
    let query =
      tempora_sql::parse_query("SELECT w_city FROM warehouse WHERE w_id = ? AND w_city <> 'x'")
        .unwrap();
    let unit = assemble(&query_source(&query, &schema()).unwrap().text).unwrap();
    assert_eq!(unit.exports, vec![QUERY.to_owned()]);
    let Program::Query(q) = unit.program else {
      panic!("expected query");
    };
    assert_eq!(q.params, 1);
    assert_eq!(q.table, "warehouse");
    assert_eq!(
      q.body,
      Body::Execute(Operation::Select {
        projection: vec![1],
        as_of:      None,
        access:     Access {
          seek:    Some(vec![Operand::Param {
            index: 0,
            ty:    ScalarType::Integer,
          }]),
          filters: vec![Filter {
            column:  1,
            op:      CompareOp::NotEq,
            operand: Operand::Const {
              ty:    ScalarType::Varchar { len: 20 },
              value: Value::Text("x".into()),
            },
          }],
        },
      })
    );
  }

  #[test]
  fn explain_text_is_unescaped() {
    let listing = format!(
      "unit query\nexport query\nparams 0\ntable \"t\"\nexplain {}\n",
      quote("delete\nfilter 0 = const varchar(5) \"a\\\"b\"\nend\n")
    );
    let unit = assemble(&listing).unwrap();
    let Program::Query(q) = unit.program else {
      panic!("expected query");
    };
    assert_eq!(
      q.body,
      Body::Explain("delete\nfilter 0 = const varchar(5) \"a\\\"b\"\nend\n".into())
    );
  }

  #[test]
  fn errors_name_the_line() {
    let cases = [
      ("unit query\nexport query\nparams x\n", 3),
      ("unit query\nparams 0\ntable \"t\"\nselect\nset 0 param 0 integer\nproject 0\nend\n", 5),
      ("unit query\nparams 0\ntable \"t\"\ndelete\nfilter 0 ~ param 0 integer\nend\n", 5),
      ("unit query\nparams 0\ntable \"t\"\ndelete\n", 4),
      ("; header\nunit blob\n", 2),
      ("unit definition\nrelation \"t\" plain\ncolumn \"a\" blob\n", 3),
      ("unit definition\nrelation \"t\" plain\ncolumn \"a\" integer\nkey \"b\"\nend\n", 4),
      ("unit query\nparams 0\ntable \"t\"\ndelete\nend\nend\n", 6),
      ("unit query\nparams 0\ntable \"t\nend\n", 3),
    ];
    for (listing, line) in cases {
      match assemble(listing) {
        Err(Error::Assemble { line: l, .. }) => assert_eq!(l, line, "{listing:?}"),
        other => panic!("{listing:?}: {other:?}"),
      }
    }
  }
}
