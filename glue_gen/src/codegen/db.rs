/* Persisted tables of DB-flagged records.

   A record's fields flatten into columns: nested record fields become
   `_<fieldId>_<fieldId>` columns, a nullable nested record adds a boolean
   presence column, a variant stores its ordinal in an INTEGER column and
   each case payload below `_<fieldId>_<ordinal>`. Containers and opaque
   values go to JSONB. Every table also carries the version, timestamp and
   archivedAt bookkeeping columns maintained by triggers. */

use super::emitter::Emitter;
use super::typescript::Scope;
use crate::error::{BuildError, BuildResult};
use crate::index::ResolvedSchema;
use crate::wire::ZERO_ID;
use glue_types::{Schema, Type, TypeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
  Uuid,
  Boolean,
  Text,
  Integer,
  Jsonb,
  TimestampTz,
}

impl SqlType {
  pub fn as_sql(self) -> &'static str {
    match self {
      SqlType::Uuid => "UUID",
      SqlType::Boolean => "BOOLEAN",
      SqlType::Text => "TEXT",
      SqlType::Integer => "INTEGER",
      SqlType::Jsonb => "JSONB",
      SqlType::TimestampTz => "TIMESTAMPTZ",
    }
  }

  fn ts_type(self) -> &'static str {
    match self {
      SqlType::Uuid | SqlType::Text => "string",
      SqlType::Boolean => "boolean",
      SqlType::Integer => "number",
      SqlType::Jsonb => "unknown",
      SqlType::TimestampTz => "Date",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
  pub name: String,
  pub sql: SqlType,
  pub nullable: bool,
  /// SQL default; non-nullable data columns always carry one so they can be
  /// added to populated tables
  pub default: Option<String>,
}

/// Column name as written in SQL. Postgres folds unquoted identifiers to
/// lower case, so mixed-case names are quoted.
pub fn sql_ident(name: &str) -> String {
  if name.chars().any(|c| c.is_ascii_uppercase()) {
    format!("\"{}\"", name)
  } else {
    name.to_string()
  }
}

impl Column {
  pub fn definition(&self) -> String {
    let mut def = format!("{} {}", sql_ident(&self.name), self.sql.as_sql());
    if !self.nullable {
      def.push_str(" NOT NULL");
    }
    if let Some(default) = &self.default {
      def.push_str(" DEFAULT ");
      def.push_str(default);
    }
    def
  }
}

/// Mapping from a wire value to its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnNode {
  Scalar(String),
  Json(String),
  Record {
    presence: Option<String>,
    len: usize,
    fields: Vec<(u16, ColumnNode)>,
  },
  Variant {
    column: String,
    nullable: bool,
    cases: Vec<(u16, Option<ColumnNode>)>,
  },
}

#[derive(Debug, Clone)]
pub struct TableSchema {
  pub name: String,
  pub key: TypeKey,
  /// Data columns in flattening order
  pub columns: Vec<Column>,
  pub primary_key: Vec<String>,
  pub indexes: Vec<Vec<String>>,
  pub root: ColumnNode,
}

pub const VERSION_COLUMN: &str = "version";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const ARCHIVED_COLUMN: &str = "archivedAt";

pub fn bookkeeping_columns() -> [Column; 3] {
  [
    Column {
      name: VERSION_COLUMN.to_string(),
      sql: SqlType::Integer,
      nullable: false,
      default: Some("0".to_string()),
    },
    Column {
      name: TIMESTAMP_COLUMN.to_string(),
      sql: SqlType::TimestampTz,
      nullable: false,
      default: Some("now()".to_string()),
    },
    Column {
      name: ARCHIVED_COLUMN.to_string(),
      sql: SqlType::TimestampTz,
      nullable: true,
      default: None,
    },
  ]
}

pub fn table_name(key: TypeKey) -> String {
  format!("codegen_db_{}_{}", key.namespace, key.type_id)
}

fn column_name(path: &[u16]) -> String {
  path.iter().map(|id| format!("_{}", id)).collect()
}

struct Flattener<'a> {
  schema: &'a Schema,
  columns: Vec<Column>,
  /* Definitions being flattened; revisiting one falls back to JSONB */
  stack: Vec<TypeKey>,
}

impl<'a> Flattener<'a> {
  fn push(&mut self, name: &str, sql: SqlType, nullable: bool, default: Option<String>) {
    self.columns.push(Column {
      name: name.to_string(),
      sql,
      nullable,
      default: if nullable { None } else { default },
    });
  }

  fn scalar(&mut self, name: String, sql: SqlType, nullable: bool, default: &str) -> ColumnNode {
    self.push(&name, sql, nullable, Some(default.to_string()));
    ColumnNode::Scalar(name)
  }

  fn json(&mut self, name: String, nullable: bool, default: &str) -> ColumnNode {
    self.push(&name, SqlType::Jsonb, nullable, Some(default.to_string()));
    ColumnNode::Json(name)
  }

  fn flatten(&mut self, ty: &Type, path: &mut Vec<u16>, nullable: bool) -> BuildResult<ColumnNode> {
    let name = column_name(path);
    Ok(match ty {
      Type::Bool => self.scalar(name, SqlType::Boolean, nullable, "false"),
      Type::Str => self.scalar(name, SqlType::Text, nullable, "''"),
      Type::Int32 => self.scalar(name, SqlType::Integer, nullable, "0"),
      Type::Id(_) => self.scalar(name, SqlType::Uuid, nullable, &format!("'{}'", ZERO_ID)),
      Type::Array(_) => self.json(name, nullable, "'[]'"),
      Type::Dict(_) | Type::Empty => self.json(name, nullable, "'{}'"),
      Type::Raw => self.json(name, nullable, "'\"{}\"'"),
      Type::Any => self.json(name, true, "'null'"),
      Type::Nullable(inner) => match inner.as_ref() {
        Type::Record(key) if !self.stack.contains(key) => {
          self.push(&name, SqlType::Boolean, nullable, Some("false".to_string()));
          self.record(*key, path, true, Some(name))?
        }
        other => self.flatten(other, path, true)?,
      },
      Type::Record(key) | Type::Variant(key) if self.stack.contains(key) => {
        self.json(name, true, "'null'")
      }
      Type::Record(key) => self.record(*key, path, nullable, None)?,
      Type::Variant(key) => self.variant(*key, path, nullable)?,
      Type::Named(name) => {
        return Err(BuildError::Internal(format!(
          "named reference '{}' survived resolution",
          name
        )));
      }
    })
  }

  fn record(
    &mut self,
    key: TypeKey,
    path: &mut Vec<u16>,
    nullable: bool,
    presence: Option<String>,
  ) -> BuildResult<ColumnNode> {
    let schema = self.schema;
    let record = schema
      .record(key)
      .ok_or_else(|| BuildError::Internal(format!("no record at {}", key)))?;
    self.stack.push(key);
    let mut fields = Vec::with_capacity(record.fields.len());
    for field in record.fields.values() {
      path.push(field.id);
      let node = self.flatten(&field.ty, path, nullable);
      path.pop();
      fields.push((field.id, node?));
    }
    self.stack.pop();
    Ok(ColumnNode::Record {
      presence,
      len: record.wire_len(),
      fields,
    })
  }

  fn variant(&mut self, key: TypeKey, path: &mut Vec<u16>, nullable: bool) -> BuildResult<ColumnNode> {
    let schema = self.schema;
    let variant = schema
      .variant(key)
      .ok_or_else(|| BuildError::Internal(format!("no variant at {}", key)))?;
    let column = column_name(path);
    let default = variant.default_value().map(|v| v.ordinal.to_string());
    let nullable = nullable || default.is_none();
    self.push(&column, SqlType::Integer, nullable, default);

    self.stack.push(key);
    let mut cases = Vec::with_capacity(variant.values.len());
    for value in variant.values.values() {
      let payload = match &value.payload {
        Some(payload) => {
          path.push(value.ordinal);
          let node = self.flatten(payload, path, true);
          path.pop();
          Some(node?)
        }
        None => None,
      };
      cases.push((value.ordinal, payload));
    }
    self.stack.pop();
    Ok(ColumnNode::Variant {
      column,
      nullable,
      cases,
    })
  }
}

/// Table layout of the DB-flagged record at `key`.
pub fn table_schema(resolved: &ResolvedSchema, key: TypeKey) -> BuildResult<TableSchema> {
  let schema = resolved.schema();
  let record = schema
    .record(key)
    .ok_or_else(|| BuildError::Internal(format!("no record at {}", key)))?;
  let db = record
    .db
    .as_ref()
    .ok_or_else(|| BuildError::Internal(format!("record at {} is not db-flagged", key)))?;
  let name = schema
    .qualified_type_name(key)
    .unwrap_or_else(|| key.to_string());
  let primary = db.primary.ok_or(BuildError::MissingPrimaryKey {
    record: name.clone(),
  })?;
  let shard = db.shard.ok_or(BuildError::MissingShardKey { record: name })?;

  let mut flattener = Flattener {
    schema,
    columns: Vec::new(),
    stack: Vec::new(),
  };
  let root = flattener.record(key, &mut Vec::new(), false, None)?;

  let mut primary_key = vec![column_name(&[primary])];
  if shard != primary {
    primary_key.push(column_name(&[shard]));
  }
  let indexes = db
    .indexes
    .iter()
    .map(|tuple| tuple.iter().map(|id| column_name(&[*id])).collect())
    .collect();

  Ok(TableSchema {
    name: table_name(key),
    key,
    columns: flattener.columns,
    primary_key,
    indexes,
    root,
  })
}

impl TableSchema {
  pub fn is_key(&self, column: &str) -> bool {
    self.primary_key.iter().any(|k| k == column)
  }

  fn key_columns(&self) -> impl Iterator<Item = &Column> {
    self
      .primary_key
      .iter()
      .filter_map(|key| self.columns.iter().find(|c| &c.name == key))
  }

  fn value_columns(&self) -> impl Iterator<Item = &Column> {
    self.columns.iter().filter(|c| !self.is_key(&c.name))
  }

  fn key_predicate(&self, first_param: usize) -> String {
    self
      .primary_key
      .iter()
      .enumerate()
      .map(|(i, key)| format!("{} = ${}", key, first_param + i))
      .collect::<Vec<_>>()
      .join(" AND ")
  }

  /// Idempotent DDL statements, in execution order.
  pub fn ddl(&self) -> Vec<String> {
    let t = &self.name;
    let mut statements = Vec::new();

    let keys: Vec<String> = self.key_columns().map(Column::definition).collect();
    statements.push(format!(
      "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
      t,
      keys.join(", "),
      self.primary_key.join(", ")
    ));

    for column in self.value_columns().cloned().chain(bookkeeping_columns()) {
      statements.push(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        t,
        column.definition()
      ));
    }

    statements.push(format!(
      "CREATE OR REPLACE FUNCTION {t}_on_insert() RETURNS TRIGGER AS $$\nBEGIN\n  NEW.{v} := 1;\n  NEW.{ts} := now();\n  RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql",
      t = t,
      v = VERSION_COLUMN,
      ts = TIMESTAMP_COLUMN
    ));
    statements.push(format!("DROP TRIGGER IF EXISTS {t}_insert ON {t}", t = t));
    statements.push(format!(
      "CREATE TRIGGER {t}_insert BEFORE INSERT ON {t} FOR EACH ROW EXECUTE FUNCTION {t}_on_insert()",
      t = t
    ));

    statements.push(format!(
      "CREATE OR REPLACE FUNCTION {t}_on_update() RETURNS TRIGGER AS $$\nBEGIN\n  NEW.{v} := OLD.{v} + 1;\n  NEW.{ts} := now();\n  RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql",
      t = t,
      v = VERSION_COLUMN,
      ts = TIMESTAMP_COLUMN
    ));
    statements.push(format!("DROP TRIGGER IF EXISTS {t}_update ON {t}", t = t));
    statements.push(format!(
      "CREATE TRIGGER {t}_update BEFORE UPDATE ON {t} FOR EACH ROW EXECUTE FUNCTION {t}_on_update()",
      t = t
    ));

    for (i, index) in self.indexes.iter().enumerate() {
      statements.push(format!(
        "CREATE INDEX IF NOT EXISTS {}_idx_{} ON {} ({})",
        t,
        i,
        t,
        index.join(", ")
      ));
    }
    statements
  }

  pub fn insert_sql(&self) -> String {
    let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
    let params: Vec<String> = (1..=names.len()).map(|i| format!("${}", i)).collect();
    format!(
      "INSERT INTO {} ({}) VALUES ({})",
      self.name,
      names.join(", "),
      params.join(", ")
    )
  }

  pub fn select_sql(&self) -> String {
    let names: Vec<String> = self
      .columns
      .iter()
      .map(|c| c.name.as_str())
      .chain([VERSION_COLUMN, TIMESTAMP_COLUMN, ARCHIVED_COLUMN])
      .map(sql_ident)
      .collect();
    format!(
      "SELECT {} FROM {} WHERE {} AND {} IS NULL",
      names.join(", "),
      self.name,
      self.key_predicate(1),
      sql_ident(ARCHIVED_COLUMN)
    )
  }

  /// Update guarded by the caller's expected version. Parameters are the
  /// non-key columns, then the key columns, then the expected version.
  pub fn update_sql(&self) -> String {
    let values: Vec<String> = self
      .value_columns()
      .enumerate()
      .map(|(i, c)| format!("{} = ${}", c.name, i + 1))
      .collect();
    let assignments = if values.is_empty() {
      format!("{} = now()", TIMESTAMP_COLUMN)
    } else {
      values.join(", ")
    };
    let first_key = values.len() + 1;
    format!(
      "UPDATE {} SET {} WHERE {} AND {} = ${}",
      self.name,
      assignments,
      self.key_predicate(first_key),
      VERSION_COLUMN,
      first_key + self.primary_key.len()
    )
  }

  pub fn archive_sql(&self) -> String {
    let archived = sql_ident(ARCHIVED_COLUMN);
    format!(
      "UPDATE {} SET {} = now() WHERE {} AND {} IS NULL",
      self.name,
      archived,
      self.key_predicate(1),
      archived
    )
  }
}

/* Row property expressions reading the wire value `expr` */
fn to_row(node: &ColumnNode, expr: &str, out: &mut Vec<(String, String)>) {
  match node {
    ColumnNode::Scalar(column) => out.push((column.clone(), format!("{} ?? null", expr))),
    ColumnNode::Json(column) => out.push((column.clone(), format!("JSON.stringify({} ?? null)", expr))),
    ColumnNode::Record { presence, fields, .. } => {
      if let Some(presence) = presence {
        out.push((presence.clone(), format!("{} != null", expr)));
      }
      for (id, child) in fields {
        to_row(child, &format!("{}?.[{}]", expr, id), out);
      }
    }
    ColumnNode::Variant { column, cases, .. } => {
      out.push((column.clone(), format!("{}?.[0] ?? null", expr)));
      for (ordinal, payload) in cases {
        if let Some(payload) = payload {
          let case_expr = format!("({}?.[0] === {} ? {}?.[1] : null)", expr, ordinal, expr);
          to_row(payload, &case_expr, out);
        }
      }
    }
  }
}

/* Wire value rebuilt from a row */
fn from_row(node: &ColumnNode) -> String {
  match node {
    ColumnNode::Scalar(column) | ColumnNode::Json(column) => format!("row.{}", column),
    ColumnNode::Record {
      presence,
      len,
      fields,
    } => {
      let mut slots = vec!["null".to_string(); *len];
      for (id, child) in fields {
        if let Some(slot) = slots.get_mut(usize::from(*id)) {
          *slot = from_row(child);
        }
      }
      let value = format!("[{}]", slots.join(", "));
      match presence {
        Some(presence) => format!("(row.{} ? {} : null)", presence, value),
        None => value,
      }
    }
    ColumnNode::Variant {
      column,
      nullable,
      cases,
    } => {
      let mut out = String::from("(");
      for (ordinal, payload) in cases {
        let value = match payload {
          Some(payload) => format!("[{}, {}]", ordinal, from_row(payload)),
          None => format!("[{}]", ordinal),
        };
        out.push_str(&format!("row.{} === {} ? {} : ", column, ordinal, value));
      }
      if *nullable {
        out.push_str("null)");
      } else {
        out.push_str(&format!("[row.{}])", column));
      }
      out
    }
  }
}

fn js_string(text: &str) -> BuildResult<String> {
  serde_json::to_string(text).map_err(|e| BuildError::Internal(format!("cannot quote SQL: {}", e)))
}

/// Accessor class of one table. `wrapper` is the module alias of the
/// namespace providing `DbWrapper`.
pub fn emit_table(e: &mut Emitter, scope: &Scope, table: &TableSchema, wrapper: &str) -> BuildResult<()> {
  let model = scope.type_ref(table.key)?;
  let base = scope.def_name(table.key)?;
  let class = format!("{}Table", base);
  let row_type = format!("{}Row", base);

  e.open(format!("export interface {} {{", row_type));
  for column in table.columns.iter().cloned().chain(bookkeeping_columns()) {
    let nullable = if column.nullable { " | null" } else { "" };
    e.line(format!("{}: {}{}", column.name, column.sql.ts_type(), nullable));
  }
  e.close("}").blank();

  e.open(format!("export class {} {{", class));
  e.line(format!("static readonly TABLE = {}", js_string(&table.name)?));
  e.open("static readonly SCHEMA: readonly string[] = [");
  for statement in table.ddl() {
    e.line(format!("{},", js_string(&statement)?));
  }
  e.close("]");
  e.line(format!("static readonly INSERT = {}", js_string(&table.insert_sql())?));
  e.line(format!("static readonly SELECT = {}", js_string(&table.select_sql())?));
  e.line(format!("static readonly UPDATE = {}", js_string(&table.update_sql())?));
  e.line(format!("static readonly ARCHIVE = {}", js_string(&table.archive_sql())?));
  e.blank();

  e.line(format!("constructor(readonly db: {}.DbWrapper) {{}}", wrapper));
  e.blank();

  e.open("async schemaCreate(): Promise<void> {")
    .open(format!("for (const statement of {}.SCHEMA) {{", class))
    .line("await this.db.query(statement, [])")
    .close("}")
    .close("}")
    .blank();

  let mut row = Vec::new();
  to_row(&table.root, "f", &mut row);
  e.open(format!("static toRow(o: {}): Record<string, unknown> {{", model));
  e.line("const f: any = o._f");
  e.open("return {");
  for (column, expr) in &row {
    e.line(format!("{}: {},", column, expr));
  }
  e.close("}");
  e.close("}").blank();

  e.open(format!("static fromRow(row: {}): {} {{", row_type, model))
    .line(format!("return new {}({})", model, from_row(&table.root)))
    .close("}")
    .blank();

  let key_params: Vec<String> = table
    .key_columns()
    .zip(["primary", "shard"])
    .map(|(column, name)| format!("{}: {}", name, column.sql.ts_type()))
    .collect();
  let key_args: Vec<&str> = ["primary", "shard"]
    .into_iter()
    .take(table.primary_key.len())
    .collect();
  let row_args = |columns: Vec<&Column>| -> String {
    columns
      .iter()
      .map(|c| format!("row.{}", c.name))
      .collect::<Vec<_>>()
      .join(", ")
  };

  e.open(format!("async insert(o: {}): Promise<void> {{", model))
    .line(format!("const row = {}.toRow(o)", class))
    .line(format!(
      "await this.db.query({}.INSERT, [{}])",
      class,
      row_args(table.columns.iter().collect())
    ))
    .close("}")
    .blank();

  e.open(format!(
    "async get({}): Promise<{} | null> {{",
    key_params.join(", "),
    model
  ))
  .line(format!(
    "const result = await this.db.query({}.SELECT, [{}])",
    class,
    key_args.join(", ")
  ))
  .line(format!(
    "return result.rows.length > 0 ? {}.fromRow(result.rows[0] as {}) : null",
    class, row_type
  ))
  .close("}")
  .blank();

  let mut update_args: Vec<&Column> = table.value_columns().collect();
  update_args.extend(table.key_columns());
  e.line("/* Applies only while the stored version still equals expectedVersion */");
  e.open(format!(
    "async update(o: {}, expectedVersion: number): Promise<boolean> {{",
    model
  ))
  .line(format!("const row = {}.toRow(o)", class))
  .line(format!(
    "const result = await this.db.query({}.UPDATE, [{}, expectedVersion])",
    class,
    row_args(update_args)
  ))
  .line("return result.rowCount === 1")
  .close("}")
  .blank();

  e.open(format!("async archive({}): Promise<boolean> {{", key_params.join(", ")))
    .line(format!(
      "const result = await this.db.query({}.ARCHIVE, [{}])",
      class,
      key_args.join(", ")
    ))
    .line("return result.rowCount === 1")
    .close("}");
  e.close("}").blank();
  Ok(())
}
