//! Declarative SQLite schema with version tracking.
//!
//! Tables are declared as consts, grouped into [`VersionedSchema`] entries.
//! A fresh database is created at the latest version; an existing one is
//! validated against the declared structure and migrated forward through the
//! per-version migration functions. The schema version is tracked in
//! `PRAGMA user_version`, offset by [`BASE_DB_VERSION`] so a database from
//! an unrelated application is rejected instead of "migrated".

use anyhow::{bail, Result};
use rusqlite::Connection;

/// Offset applied to `PRAGMA user_version` so our versions are recognizable.
pub const BASE_DB_VERSION: usize = 70000;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // unused_mut fires when the macro is called with no optional
            // field assignments
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            _ => None,
        }
    }
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<&'static str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// (index name, indexed column expression) pairs.
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut sql = format!("CREATE TABLE {} (", self.name);
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(column.sql_type.as_sql());
            if column.is_primary_key {
                sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }
        sql.push_str(");");
        conn.execute(&sql, [])?;

        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                [],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_parentheses(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(s)
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    /// Check an opened database against this schema's declared structure.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            struct ActualColumn {
                name: String,
                sql_type: Option<SqlType>,
                non_null: bool,
                default_value: Option<String>,
                is_primary_key: bool,
            }

            let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
            let actual: Vec<ActualColumn> = stmt
                .query_map([], |row| {
                    Ok(ActualColumn {
                        name: row.get(1)?,
                        sql_type: SqlType::parse(&row.get::<_, String>(2)?),
                        non_null: row.get::<_, i32>(3)? == 1,
                        default_value: row.get(4)?,
                        is_primary_key: row.get::<_, i32>(5)? == 1,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            if actual.len() != table.columns.len() {
                bail!(
                    "Table {} has {} columns, expected {} ({})",
                    table.name,
                    actual.len(),
                    table.columns.len(),
                    table
                        .columns
                        .iter()
                        .map(|c| c.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }

            for (got, want) in actual.iter().zip(table.columns.iter()) {
                if got.name != want.name {
                    bail!(
                        "Table {} column name mismatch: expected {}, got {}",
                        table.name,
                        want.name,
                        got.name
                    );
                }
                if got.sql_type != Some(want.sql_type) {
                    bail!(
                        "Table {} column {} type mismatch: expected {:?}",
                        table.name,
                        want.name,
                        want.sql_type
                    );
                }
                if got.non_null != want.non_null {
                    bail!(
                        "Table {} column {} non-null mismatch: expected {}",
                        table.name,
                        want.name,
                        want.non_null
                    );
                }
                if got.is_primary_key != want.is_primary_key {
                    bail!(
                        "Table {} column {} primary key mismatch: expected {}",
                        table.name,
                        want.name,
                        want.is_primary_key
                    );
                }
                if got.default_value.as_deref().map(strip_parentheses)
                    != want.default_value.map(strip_parentheses)
                {
                    bail!(
                        "Table {} column {} default mismatch: expected {:?}, got {:?}",
                        table.name,
                        want.name,
                        want.default_value,
                        got.default_value
                    );
                }
            }

            for (index_name, _) in table.indices {
                let exists: bool = conn
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                        rusqlite::params![index_name, table.name],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if !exists {
                    bail!("Table {} is missing index '{}'", table.name, index_name);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "test_table",
        columns: &[
            sqlite_column!("id", SqlType::Integer, is_primary_key = true),
            sqlite_column!("name", SqlType::Text, non_null = true),
            sqlite_column!("score", SqlType::Real),
        ],
        indices: &[("idx_test_name", "name")],
    };

    #[test]
    fn test_create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = VersionedSchema {
            version: 1,
            tables: &[TEST_TABLE],
            migration: None,
        };
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION as i64 + 1);
    }

    #[test]
    fn test_validate_detects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_test_name ON test_table(name)", [])
            .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[TEST_TABLE],
            migration: None,
        };
        let err = schema.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("columns"));
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL)",
            [],
        )
        .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[TEST_TABLE],
            migration: None,
        };
        let err = schema.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_test_name"));
    }

    #[test]
    fn test_validate_detects_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY, name INTEGER NOT NULL, score REAL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_test_name ON test_table(name)", [])
            .unwrap();

        let schema = VersionedSchema {
            version: 1,
            tables: &[TEST_TABLE],
            migration: None,
        };
        let err = schema.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("type mismatch"));
    }
}
