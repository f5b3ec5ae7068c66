use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column metadata as delivered by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub data_type: String,
    #[serde(default)]
    pub is_mandatory: bool,
}

/// One table of a schema snapshot.
///
/// On the wire the columns sit next to a synthetic `recordCount` entry:
/// `{"id": {"dataType": "int", "isMandatory": true}, "recordCount": 3}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Row count, used by UI affordances only.
    #[serde(
        rename = "recordCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub record_count: Option<i64>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, ColumnMeta>,
}

impl TableSchema {
    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.insert(
            name.into(),
            ColumnMeta {
                data_type: data_type.into(),
                is_mandatory: false,
            },
        );
        self
    }

    pub fn record_count(mut self, count: i64) -> Self {
        self.record_count = Some(count);
        self
    }
}

/// A point-in-time mapping of table → column → metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: impl Into<String>, table: TableSchema) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Convenience builder: a table whose columns are all `text`.
    pub fn with_table<I, S>(self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = columns
            .into_iter()
            .fold(TableSchema::default(), |t, c| t.column(c, "text"));
        self.table(name, table)
    }

    /// Return a copy with every table and column key lowercased.
    ///
    /// Metadata and `recordCount` are carried over unchanged. Keys that collide
    /// once lowercased are merged; later entries win.
    pub fn normalize(&self) -> Schema {
        let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();
        for (table_name, table) in &self.tables {
            let entry = tables.entry(table_name.to_lowercase()).or_default();
            if table.record_count.is_some() {
                entry.record_count = table.record_count;
            }
            for (column_name, meta) in &table.columns {
                entry.columns.insert(column_name.to_lowercase(), meta.clone());
            }
        }
        Schema { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A schema whose keys are known to be lowercase.
///
/// Every probe lowercases its argument, so names pulled out of SQL can be
/// passed as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSchema {
    inner: Schema,
}

impl NormalizedSchema {
    pub fn new(schema: &Schema) -> Self {
        Self {
            inner: schema.normalize(),
        }
    }

    pub fn as_schema(&self) -> &Schema {
        &self.inner
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.inner.tables.contains_key(&table.to_lowercase())
    }

    pub fn table_has_column(&self, table: &str, column: &str) -> bool {
        self.inner
            .tables
            .get(&table.to_lowercase())
            .is_some_and(|t| t.columns.contains_key(&column.to_lowercase()))
    }

    /// True if any table of the schema has `column`.
    pub fn any_table_has_column(&self, column: &str) -> bool {
        let column = column.to_lowercase();
        self.inner
            .tables
            .values()
            .any(|t| t.columns.contains_key(&column))
    }

    pub fn columns_of(&self, table: &str) -> impl Iterator<Item = &str> {
        self.inner
            .tables
            .get(&table.to_lowercase())
            .into_iter()
            .flat_map(|t| t.columns.keys().map(String::as_str))
    }
}

impl From<Schema> for NormalizedSchema {
    fn from(schema: Schema) -> Self {
        Self::new(&schema)
    }
}
