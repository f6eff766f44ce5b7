//! Generated units executed against a live database.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempora_core::types::Value;
use tempora_storage::{Database, ManualClock};

use crate::{
  Error, Program, QueryOutput, ResultSet, assemble, definition_source,
  exec::{get_size, make_database, run_query},
  program::QueryProgram,
  query_source,
};

const SCHEMA: &str = "
CREATE TABLE warehouse (
  w_id   integer NOT NULL,
  w_city varchar(20),
  PRIMARY KEY (w_id)
) WITH SYSTEM VERSIONING;
CREATE TABLE warehouseold (
  w_id   integer PRIMARY KEY,
  w_city varchar(20)
);
";

fn t(secs: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

struct Fixture {
  db:    Database,
  clock: Arc<ManualClock>,
  _dir:  tempfile::TempDir,
}

fn fixture() -> Fixture {
  let schema = tempora_sql::parse_schema(SCHEMA).unwrap();
  let unit = assemble(&definition_source(&schema).text).unwrap();
  let Program::Definition(def) = unit.program else {
    panic!("expected definition");
  };
  let dir = tempfile::TempDir::new().unwrap();
  let clock = Arc::new(ManualClock::new(t(0)));
  let db = make_database(&def, dir.path(), clock.clone()).unwrap();
  Fixture {
    db,
    clock,
    _dir: dir,
  }
}

fn compile(sql: &str) -> QueryProgram {
  let schema = tempora_sql::parse_schema(SCHEMA).unwrap();
  let query = tempora_sql::parse_query(sql).unwrap();
  let unit = assemble(&query_source(&query, &schema).unwrap().text).unwrap();
  // The stored form must survive a round trip through its encoding.
  let unit = crate::CompiledUnit::from_json(&unit.to_json().unwrap()).unwrap();
  match unit.program {
    Program::Query(q) => q,
    Program::Definition(_) => panic!("expected query"),
  }
}

fn run(f: &mut Fixture, sql: &str, params: &[&str]) -> QueryOutput {
  let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
  run_query(&compile(sql), &mut f.db, &params, false).unwrap()
}

fn rows(output: QueryOutput) -> Vec<Vec<Value>> {
  match output {
    QueryOutput::Rows(ResultSet { rows, .. }) => rows,
    other => panic!("expected rows, got {other:?}"),
  }
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn insert_then_update_keeps_both_versions() {
  let mut f = fixture();
  let insert = "INSERT INTO warehouse (w_id, w_city) VALUES (?,?)";
  assert_eq!(run(&mut f, insert, &["1", "Paris"]), QueryOutput::Affected(1));

  f.clock.advance(TimeDelta::seconds(5));
  let update = "UPDATE warehouse SET w_city=? WHERE w_id=?";
  assert_eq!(run(&mut f, update, &["Lyon", "1"]), QueryOutput::Affected(1));

  let table = f.db.table("warehouse").unwrap();
  let history = table.history(&[Value::Integer(1)]).unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].row[1], Value::Text("Paris".into()));
  assert_eq!(history[0].valid.to, Some(t(5)));
  assert_eq!(history[1].row[1], Value::Text("Lyon".into()));
  assert!(history[1].valid.is_open());
  assert_eq!(get_size(&f.db, "warehouse").unwrap(), 2);
}

#[test]
fn select_as_of_reads_past_versions() {
  let mut f = fixture();
  run(&mut f, "INSERT INTO warehouse VALUES (?, ?)", &["1", "Paris"]);
  f.clock.set(t(10));
  run(&mut f, "UPDATE warehouse SET w_city = ? WHERE w_id = ?", &["Lyon", "1"]);
  f.clock.set(t(20));
  run(&mut f, "UPDATE warehouse SET w_city = ? WHERE w_id = ?", &["Nice", "1"]);

  let sql = "SELECT w_city FROM warehouse FOR SYSTEM_TIME AS OF ? WHERE w_id = ?";
  let at = |ts: DateTime<Utc>| ts.to_rfc3339();
  for (ts, expected) in [(t(10), "Lyon"), (t(0), "Paris"), (t(25), "Nice")] {
    let got = rows(run(&mut f, sql, &[at(ts).as_str(), "1"]));
    assert_eq!(got, vec![vec![Value::Text(expected.into())]]);
  }
  assert!(rows(run(&mut f, sql, &[at(t(-1)).as_str(), "1"])).is_empty());
}

#[test]
fn select_returns_rows_in_key_order() {
  let mut f = fixture();
  for (id, city) in [("3", "c"), ("1", "a"), ("2", "b")] {
    run(&mut f, "INSERT INTO warehouseold VALUES (?, ?)", &[id, city]);
  }
  let got = rows(run(&mut f, "SELECT * FROM warehouseold WHERE w_id >= 2", &[]));
  assert_eq!(got, vec![
    vec![Value::Integer(2), Value::Text("b".into())],
    vec![Value::Integer(3), Value::Text("c".into())],
  ]);
}

#[test]
fn conventional_table_ignores_as_of() {
  let mut f = fixture();
  run(&mut f, "INSERT INTO warehouseold VALUES (1, 'Paris')", &[]);
  f.clock.set(t(10));
  run(&mut f, "UPDATE warehouseold SET w_city = 'Lyon' WHERE w_id = 1", &[]);

  let got = rows(run(
    &mut f,
    "SELECT w_city FROM warehouseold FOR SYSTEM_TIME AS OF ?",
    &[t(1).to_rfc3339().as_str()],
  ));
  assert_eq!(got, vec![vec![Value::Text("Lyon".into())]]);
  assert_eq!(get_size(&f.db, "warehouseold").unwrap(), 1);
}

#[test]
fn mutations_without_match_affect_nothing() {
  let mut f = fixture();
  let update = "UPDATE warehouse SET w_city = ? WHERE w_id = ?";
  assert_eq!(run(&mut f, update, &["Lyon", "9"]), QueryOutput::Affected(0));
  let delete = "DELETE FROM warehouseold WHERE w_id = ?";
  assert_eq!(run(&mut f, delete, &["9"]), QueryOutput::Affected(0));
  assert_eq!(get_size(&f.db, "warehouse").unwrap(), 0);
}

#[test]
fn delete_by_scan_closes_every_match() {
  let mut f = fixture();
  for id in ["1", "2", "3"] {
    run(&mut f, "INSERT INTO warehouse VALUES (?, 'x')", &[id]);
  }
  f.clock.set(t(1));
  assert_eq!(
    run(&mut f, "DELETE FROM warehouse WHERE w_id <> 2", &[]),
    QueryOutput::Affected(2)
  );
  assert_eq!(f.db.table("warehouse").unwrap().len(), 1);
  assert_eq!(get_size(&f.db, "warehouse").unwrap(), 3);
}

#[test]
fn explain_prints_instead_of_executing() {
  let mut f = fixture();
  let out = run(&mut f, "EXPLAIN INSERT INTO warehouse VALUES (?, ?)", &[]);
  let QueryOutput::Explained(text) = out else {
    panic!("expected explain output");
  };
  assert!(text.starts_with("insert\nset 0 param 0 integer\n"));
  assert_eq!(get_size(&f.db, "warehouse").unwrap(), 0);

  // The explain flag on invocation does the same for an ordinary unit.
  let program = compile("DELETE FROM warehouse");
  let out = run_query(&program, &mut f.db, &[], true).unwrap();
  assert_eq!(out, QueryOutput::Explained("delete\nend\n".into()));
}

#[test]
fn parameter_errors() {
  let mut f = fixture();
  let program = compile("INSERT INTO warehouse VALUES (?, ?)");

  let err = run_query(&program, &mut f.db, &["1".into()], false).unwrap_err();
  assert!(matches!(err, Error::MissingParam { index: 1, supplied: 1 }));

  let err = run_query(&program, &mut f.db, &["one".into(), "x".into()], false)
    .unwrap_err();
  assert!(matches!(err, Error::Param { index: 0, .. }));

  run_query(&program, &mut f.db, &["1".into(), "x".into()], false).unwrap();
  let err = run_query(&program, &mut f.db, &["1".into(), "y".into()], false)
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Storage(tempora_storage::Error::DuplicateKey { .. })
  ));
}

#[test]
fn result_set_renders_pipe_separated() {
  let rs = ResultSet {
    columns: vec!["w_id".into(), "w_city".into()],
    rows:    vec![vec![Value::Integer(1), Value::Text("Paris".into())]],
  };
  assert_eq!(rs.to_string(), "w_id|w_city\n1|Paris\n");
  assert_eq!(QueryOutput::Affected(0).to_string(), "0 row(s) affected\n");
}
