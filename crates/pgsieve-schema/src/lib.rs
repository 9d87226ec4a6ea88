//! Database schema types for pgsieve.
//!
//! These types describe a Postgres database at the granularity the differ
//! works with: a [`Realm`] holds [`Schema`]s, which hold [`Table`]s. The same
//! types are produced by the declarative schema loader (desired state) and by
//! catalog introspection (current state), so the two can be compared directly.

use indexmap::IndexMap;
use pgsieve_sql::quote_ident;
use std::fmt;


/// Postgres column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC, optionally with (precision, scale)
    Numeric(Option<(u32, u32)>),
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// VARCHAR, optionally with a length limit
    Varchar(Option<u32>),
    /// CHAR, optionally with a length
    Char(Option<u32>),
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// TIME
    Time,
    /// UUID
    Uuid,
    /// JSON
    Json,
    /// JSONB
    Jsonb,
    /// One-dimensional array of another type
    Array(Box<PgType>),
    /// A type pgsieve doesn't model (enums, domains, extensions). Compared verbatim.
    Other(String),
}

impl PgType {
    /// Parse a type name as written in a schema file or reported by
    /// `format_type()`. Returns `None` for names that aren't recognized.
    pub fn parse(name: &str) -> Option<PgType> {
        let name = name.trim();
        if let Some(inner) = name.strip_suffix("[]") {
            return PgType::parse(inner).map(|t| PgType::Array(Box::new(t)));
        }

        let lower = name.to_ascii_lowercase();
        let (base, args) = match lower.find('(') {
            Some(idx) if lower.ends_with(')') => {
                let args: Vec<&str> = lower[idx + 1..lower.len() - 1]
                    .split(',')
                    .map(str::trim)
                    .collect();
                (lower[..idx].trim(), Some(args))
            }
            _ => (lower.as_str(), None),
        };

        let single_arg = |args: &Option<Vec<&str>>| -> Option<Option<u32>> {
            match args {
                None => Some(None),
                Some(a) if a.len() == 1 => a[0].parse().ok().map(Some),
                Some(_) => None,
            }
        };

        let ty = match base {
            "smallint" | "int2" => PgType::SmallInt,
            "integer" | "int" | "int4" => PgType::Integer,
            "bigint" | "int8" => PgType::BigInt,
            "real" | "float4" => PgType::Real,
            "double precision" | "float8" => PgType::DoublePrecision,
            "numeric" | "decimal" => match &args {
                None => PgType::Numeric(None),
                Some(a) if a.len() == 1 => PgType::Numeric(Some((a[0].parse().ok()?, 0))),
                Some(a) if a.len() == 2 => {
                    PgType::Numeric(Some((a[0].parse().ok()?, a[1].parse().ok()?)))
                }
                Some(_) => return None,
            },
            "boolean" | "bool" => PgType::Boolean,
            "text" => PgType::Text,
            "varchar" | "character varying" => PgType::Varchar(single_arg(&args)?),
            "char" | "character" | "bpchar" => PgType::Char(single_arg(&args)?),
            "bytea" => PgType::Bytea,
            "timestamp" | "timestamp without time zone" => PgType::Timestamp,
            "timestamptz" | "timestamp with time zone" => PgType::Timestamptz,
            "date" => PgType::Date,
            "time" | "time without time zone" => PgType::Time,
            "uuid" => PgType::Uuid,
            "json" => PgType::Json,
            "jsonb" => PgType::Jsonb,
            _ => return None,
        };

        // Only the parameterized types accept arguments.
        if args.is_some()
            && !matches!(
                ty,
                PgType::Numeric(_) | PgType::Varchar(_) | PgType::Char(_)
            )
        {
            return None;
        }

        Some(ty)
    }

    /// Parse a type as reported by the catalog, keeping unknown names as
    /// [`PgType::Other`].
    pub fn from_catalog(name: &str) -> PgType {
        PgType::parse(name).unwrap_or_else(|| PgType::Other(name.trim().to_string()))
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::Real => write!(f, "REAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Numeric(None) => write!(f, "NUMERIC"),
            PgType::Numeric(Some((p, s))) => write!(f, "NUMERIC({}, {})", p, s),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::Varchar(None) => write!(f, "VARCHAR"),
            PgType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            PgType::Char(None) => write!(f, "CHAR"),
            PgType::Char(Some(n)) => write!(f, "CHAR({})", n),
            PgType::Bytea => write!(f, "BYTEA"),
            PgType::Timestamp => write!(f, "TIMESTAMP"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Date => write!(f, "DATE"),
            PgType::Time => write!(f, "TIME"),
            PgType::Uuid => write!(f, "UUID"),
            PgType::Json => write!(f, "JSON"),
            PgType::Jsonb => write!(f, "JSONB"),
            PgType::Array(inner) => write!(f, "{}[]", inner),
            PgType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Postgres type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether this has a single-column unique constraint
    pub unique: bool,
    /// Name of that constraint as found in the database. `None` for declared
    /// columns, whose constraint gets the conventional `{table}_{column}_key`.
    pub unique_constraint: Option<String>,
}

impl Column {
    /// A NOT NULL column without default or unique constraint.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            nullable: false,
            default: None,
            unique: false,
            unique_constraint: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A table's primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    /// Constraint name
    pub name: String,
    /// Key columns, in key order
    pub columns: Vec<String>,
}

/// What happens to referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Parse the spelling used in schema files (`cascade`, `set-null`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "no action" => Some(Self::NoAction),
            "restrict" => Some(Self::Restrict),
            "cascade" => Some(Self::Cascade),
            "set null" => Some(Self::SetNull),
            "set default" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// Decode `pg_constraint.confdeltype` / `confupdtype`.
    pub fn from_catalog_code(code: &str) -> Self {
        match code {
            "r" => Self::Restrict,
            "c" => Self::Cascade,
            "n" => Self::SetNull,
            "d" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Schema of the referenced table
    pub references_schema: String,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Whether two foreign keys enforce the same constraint, ignoring names.
    pub fn same_definition(&self, other: &ForeignKey) -> bool {
        self.columns == other.columns
            && self.references_schema == other.references_schema
            && self.references_table == other.references_table
            && self.references_columns == other.references_columns
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

/// A parsed foreign key target such as `users.id`, `users(id)` or
/// `auth.users(id, tenant_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkReference<'a> {
    pub schema: Option<&'a str>,
    pub table: &'a str,
    pub columns: Vec<&'a str>,
}

/// Parse a foreign key reference.
///
/// Accepted formats:
/// - `table.column`
/// - `table(column[, column...])`
/// - `schema.table(column[, column...])`
pub fn parse_fk_reference(fk_ref: &str) -> Option<FkReference<'_>> {
    let fk_ref = fk_ref.trim();

    if let Some(paren_idx) = fk_ref.find('(')
        && fk_ref.ends_with(')')
    {
        let target = &fk_ref[..paren_idx];
        let columns: Vec<&str> = fk_ref[paren_idx + 1..fk_ref.len() - 1]
            .split(',')
            .map(str::trim)
            .collect();
        if columns.iter().any(|c| c.is_empty()) {
            return None;
        }
        let (schema, table) = match target.split_once('.') {
            Some((schema, table)) if !schema.is_empty() => (Some(schema), table),
            Some(_) => return None,
            None => (None, target),
        };
        if table.is_empty() {
            return None;
        }
        return Some(FkReference {
            schema,
            table,
            columns,
        });
    }

    if let Some((table, col)) = fk_ref.split_once('.')
        && !table.is_empty()
        && !col.is_empty()
        && !col.contains('.')
    {
        return Some(FkReference {
            schema: None,
            table,
            columns: vec![col],
        });
    }

    None
}

/// Sort order for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending order (default)
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword for this sort order, or empty string for ASC (default).
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "",
            SortOrder::Desc => " DESC",
        }
    }
}

/// Nulls ordering for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsOrder {
    /// Use database default (NULLS LAST for ASC, NULLS FIRST for DESC)
    #[default]
    Default,
    /// Sort nulls before non-null values
    First,
    /// Sort nulls after non-null values
    Last,
}

impl NullsOrder {
    /// Returns the SQL clause for this nulls ordering, or empty string for default.
    pub fn to_sql(&self) -> &'static str {
        match self {
            NullsOrder::Default => "",
            NullsOrder::First => " NULLS FIRST",
            NullsOrder::Last => " NULLS LAST",
        }
    }

    /// Collapse explicit orderings that match what Postgres does anyway, so
    /// `DESC NULLS FIRST` compares equal to plain `DESC`.
    fn effective(self, order: SortOrder) -> NullsOrder {
        match (order, self) {
            (SortOrder::Asc, NullsOrder::Last) | (SortOrder::Desc, NullsOrder::First) => {
                NullsOrder::Default
            }
            (_, nulls) => nulls,
        }
    }
}

/// A column in an index with optional sort order and nulls ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column name
    pub name: String,
    /// Sort order (ASC or DESC)
    pub order: SortOrder,
    /// Nulls ordering (NULLS FIRST, NULLS LAST, or default)
    pub nulls: NullsOrder,
}

impl IndexColumn {
    /// Create a new index column with default (ASC) ordering and default nulls.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Asc,
            nulls: NullsOrder::Default,
        }
    }

    /// Create a new index column with DESC ordering and default nulls.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Desc,
            nulls: NullsOrder::Default,
        }
    }

    /// Returns the SQL fragment for this column (name + order + nulls).
    pub fn to_sql(&self) -> String {
        format!(
            "{}{}{}",
            quote_ident(&self.name),
            self.order.to_sql(),
            self.nulls.to_sql()
        )
    }

    /// Parse a column specification like "col_name", "col_name DESC", or "col_name DESC NULLS FIRST".
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let upper = spec.to_uppercase();

        // Nulls ordering comes last, so peel it off first
        let (spec_without_nulls, nulls) = if upper.ends_with(" NULLS FIRST") {
            (&spec[..spec.len() - 12], NullsOrder::First)
        } else if upper.ends_with(" NULLS LAST") {
            (&spec[..spec.len() - 11], NullsOrder::Last)
        } else {
            (spec, NullsOrder::Default)
        };

        let trimmed = spec_without_nulls.trim();
        let upper_trimmed = trimmed.to_uppercase();

        let (name, order) = if upper_trimmed.ends_with(" DESC") {
            (trimmed[..trimmed.len() - 5].trim(), SortOrder::Desc)
        } else if upper_trimmed.ends_with(" ASC") {
            (trimmed[..trimmed.len() - 4].trim(), SortOrder::Asc)
        } else {
            (trimmed, SortOrder::Asc)
        };

        Self {
            name: unquote_ident(name),
            order,
            nulls,
        }
    }

    /// Compare ignoring spellings that Postgres treats as identical.
    pub fn equivalent(&self, other: &IndexColumn) -> bool {
        self.name == other.name
            && self.order == other.order
            && self.nulls.effective(self.order) == other.nulls.effective(other.order)
    }
}

fn unquote_ident(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return s[1..s.len() - 1].replace("\"\"", "\"");
    }
    s.to_string()
}

/// A database index (not backing a primary key or unique constraint).
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Column(s) in the index with sort order
    pub columns: Vec<IndexColumn>,
    /// Whether this is a unique index
    pub unique: bool,
    /// Optional WHERE clause for partial indexes
    pub where_clause: Option<String>,
}

impl Index {
    /// Whether two indexes are interchangeable, ignoring names.
    pub fn same_definition(&self, other: &Index) -> bool {
        self.unique == other.unique
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.equivalent(b))
            && match (&self.where_clause, &other.where_clause) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    pgsieve_sql::expr_fingerprint(a) == pgsieve_sql::expr_fingerprint(b)
                }
                _ => false,
            }
    }
}

/// A table CHECK constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub expr: String,
}

/// A schema-object attribute that carries no data of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr {
    /// `COMMENT ON TABLE`
    Comment(String),
}

impl Attr {
    /// Attributes with the same key replace each other.
    pub fn key(&self) -> &'static str {
        match self {
            Attr::Comment(_) => "comment",
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Comment(text) => write!(f, "comment {:?}", text),
        }
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
    /// Primary key, if any
    pub primary_key: Option<PrimaryKey>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes
    pub indexes: Vec<Index>,
    /// CHECK constraints
    pub checks: Vec<Check>,
    /// Attributes (comments)
    pub attrs: Vec<Attr>,
}

impl Table {
    /// An empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
            attrs: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key, using the Postgres default constraint name.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKey {
            name: pgsieve_sql::primary_key_name(&self.name),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The table comment, if set.
    pub fn comment(&self) -> Option<&str> {
        self.attrs.iter().find_map(|a| match a {
            Attr::Comment(text) => Some(text.as_str()),
        })
    }
}

/// A named Postgres schema (namespace).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Schema name
    pub name: String,
    /// Tables in the schema, indexed by name
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

/// Every schema of one database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Realm {
    /// Schemas, indexed by name
    pub schemas: IndexMap<String, Schema>,
}

impl Realm {
    /// Create a new empty realm.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    /// Get a schema by name.
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Iterate over `(schema, table)` pairs.
    pub fn iter_tables(&self) -> impl Iterator<Item = (&Schema, &Table)> {
        self.schemas
            .values()
            .flat_map(|s| s.tables.values().map(move |t| (s, t)))
    }

    /// Total number of tables across all schemas.
    pub fn table_count(&self) -> usize {
        self.schemas.values().map(|s| s.tables.len()).sum()
    }
}
