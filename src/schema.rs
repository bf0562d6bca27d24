//! Schema model built from a backend catalog snapshot.
//!
//! Follows the measurement / field / tag model: a backend lists its
//! table-like entities (measurements) with typed data columns (fields) and
//! indexed label columns (tags). [`build_schema`] turns that snapshot into an
//! immutable [`Schema`] that the generator reads for the rest of a round.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Error building a schema from a catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("backend reported no tables")]
    Empty,
    #[error("unknown type '{type_name}' for column {table}.{column}")]
    UnknownType {
        table: String,
        column: String,
        type_name: String,
    },
    #[error("duplicate column {table}.{column}")]
    DuplicateColumn { table: String, column: String },
}

/// Primitive data kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum DataKind {
    Int,
    Float,
    String,
    Boolean,
    Timestamp,
    Null,
}

/// A primitive kind plus its storage width.
///
/// INT widths are 1, 2, 4 or 8 bytes, FLOAT widths 4 or 8. Every other kind
/// has width 0. Two types are equal only if kind and width agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeType {
    kind: DataKind,
    size: u8,
}

impl CompositeType {
    pub const INT_SIZES: [u8; 4] = [1, 2, 4, 8];
    pub const FLOAT_SIZES: [u8; 2] = [4, 8];

    pub fn int(size: u8) -> Self {
        debug_assert!(Self::INT_SIZES.contains(&size));
        Self {
            kind: DataKind::Int,
            size,
        }
    }

    pub fn float(size: u8) -> Self {
        debug_assert!(Self::FLOAT_SIZES.contains(&size));
        Self {
            kind: DataKind::Float,
            size,
        }
    }

    pub const fn string() -> Self {
        Self {
            kind: DataKind::String,
            size: 0,
        }
    }

    pub const fn boolean() -> Self {
        Self {
            kind: DataKind::Boolean,
            size: 0,
        }
    }

    pub const fn timestamp() -> Self {
        Self {
            kind: DataKind::Timestamp,
            size: 0,
        }
    }

    pub const fn null() -> Self {
        Self {
            kind: DataKind::Null,
            size: 0,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Kinds that participate in arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            DataKind::Int | DataKind::Float | DataKind::Boolean | DataKind::Timestamp
        )
    }

    pub fn is_null(&self) -> bool {
        self.kind == DataKind::Null
    }

    /// Draw a random non-NULL column type.
    pub fn random(ctx: &mut Context) -> Self {
        match ctx.gen_range(5) {
            0 => Self::int(Self::INT_SIZES[ctx.gen_range(Self::INT_SIZES.len())]),
            1 => Self::float(Self::FLOAT_SIZES[ctx.gen_range(Self::FLOAT_SIZES.len())]),
            2 => Self::string(),
            3 => Self::boolean(),
            _ => Self::timestamp(),
        }
    }

    /// Parse a catalog type name.
    pub fn parse(type_name: &str) -> Option<Self> {
        let ty = match type_name.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => Self::int(4),
            "BIGINT" => Self::int(8),
            "SMALLINT" => Self::int(2),
            "TINYINT" => Self::int(1),
            "FLOAT" | "FLOAT4" | "REAL" => Self::float(4),
            "DOUBLE" | "FLOAT8" => Self::float(8),
            "BOOLEAN" | "BOOL" => Self::boolean(),
            "STRING" | "VARCHAR" | "TEXT" => Self::string(),
            "TIMESTAMP" => Self::timestamp(),
            "NULL" | "\"NULL\"" => Self::null(),
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for CompositeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.kind, self.size) {
            (DataKind::Int, 1) => "TINYINT",
            (DataKind::Int, 2) => "SMALLINT",
            (DataKind::Int, 8) => "BIGINT",
            (DataKind::Int, _) => "INT",
            (DataKind::Float, 8) => "DOUBLE",
            (DataKind::Float, _) => "FLOAT",
            (DataKind::String, _) => "VARCHAR",
            (DataKind::Boolean, _) => "BOOLEAN",
            (DataKind::Timestamp, _) => "TIMESTAMP",
            (DataKind::Null, _) => "NULL",
        };
        f.write_str(name)
    }
}

/// Whether a column holds data values or indexed labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Field,
    Tag,
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: CompositeType,
    pub nullable: bool,
    pub role: ColumnRole,
    /// Name of the owning table.
    table: String,
}

impl Column {
    /// Create a nullable field column. The owning table is set by [`Table::new`].
    pub fn new(name: impl Into<String>, ty: CompositeType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            role: ColumnRole::Field,
            table: String::new(),
        }
    }

    /// Create a tag column: an indexed label that is always a string.
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            role: ColumnRole::Tag,
            ..Self::new(name, CompositeType::string())
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Name of the table this column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// A table or view.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    pub is_view: bool,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let columns = columns
            .into_iter()
            .map(|mut c| {
                c.table = name.clone();
                c
            })
            .collect();
        Self {
            name,
            columns,
            indexes: Vec::new(),
            is_view: false,
        }
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn has_indexes(&self) -> bool {
        !self.indexes.is_empty()
    }
}

/// Immutable schema of one generated database.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    tables: Vec<Table>,
    /// Catalog names owned by objects that are not tables here.
    reserved: Vec<String>,
}

impl Schema {
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    /// Base tables only, views excluded.
    pub fn base_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| !t.is_view)
    }

    pub fn views(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|t| t.is_view)
    }

    /// A uniformly drawn non-empty subset of the tables.
    pub fn random_non_empty_tables(&self, ctx: &mut Context) -> Vec<&Table> {
        ctx.non_empty_subset(&self.tables)
    }

    /// Names of all tables, views and indexes, used to pick fresh names.
    pub fn object_names(&self) -> HashSet<&str> {
        self.tables
            .iter()
            .flat_map(|t| {
                std::iter::once(t.name.as_str()).chain(t.indexes.iter().map(|i| i.name.as_str()))
            })
            .chain(self.reserved.iter().map(String::as_str))
            .collect()
    }
}

/// Builder for constructing schemas directly.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<Table>,
    reserved: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Keep `name` out of the fresh names handed to generators.
    pub fn reserve(mut self, name: impl Into<String>) -> Self {
        self.reserved.push(name.into());
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            tables: self.tables,
            reserved: self.reserved,
        }
    }
}

/// Raw catalog contents reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub measurements: Vec<MeasurementSnapshot>,
    /// Catalog objects the backend could not describe, such as views over a
    /// dropped table. Their names are still taken.
    #[serde(default)]
    pub unresolved: Vec<String>,
}

/// One table-like entity of a catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub name: String,
    pub is_view: bool,
    pub fields: Vec<FieldSnapshot>,
    pub tags: Vec<String>,
    pub indexes: Vec<IndexSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub columns: Vec<String>,
}

/// Build the schema model from a catalog snapshot.
///
/// Measurements without any column are skipped. Fails with
/// [`SchemaError::Empty`] if nothing is left.
pub fn build_schema(snapshot: &SchemaSnapshot) -> Result<Schema, SchemaError> {
    let mut builder = snapshot
        .unresolved
        .iter()
        .fold(SchemaBuilder::new(), |b, name| b.reserve(name));

    for m in &snapshot.measurements {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(m.fields.len() + m.tags.len());

        for field in &m.fields {
            let ty =
                CompositeType::parse(&field.type_name).ok_or_else(|| SchemaError::UnknownType {
                    table: m.name.clone(),
                    column: field.name.clone(),
                    type_name: field.type_name.clone(),
                })?;
            let mut column = Column::new(&field.name, ty);
            if field.not_null {
                column = column.not_null();
            }
            columns.push(column);
        }
        columns.extend(m.tags.iter().map(Column::tag));

        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: m.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        if columns.is_empty() {
            tracing::debug!("skipping measurement {} without columns", m.name);
            builder = builder.reserve(&m.name);
            continue;
        }

        let mut table = Table::new(&m.name, columns);
        table.is_view = m.is_view;
        for index in &m.indexes {
            table = table.with_index(Index::new(&index.name, index.columns.clone()));
        }
        builder = builder.table(table);
    }

    let schema = builder.build();
    if !schema.has_tables() {
        return Err(SchemaError::Empty);
    }
    Ok(schema)
}
