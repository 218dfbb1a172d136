//! Schema readiness checks shared by repository constructors.

use crate::db::migrations::latest_version;
use rusqlite::Connection;

/// Why a connection cannot back a repository.
#[derive(Debug)]
pub(crate) enum SchemaProblem {
    Db(rusqlite::Error),
    VersionMismatch { expected: u32, actual: u32 },
    MissingTable(&'static str),
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl From<rusqlite::Error> for SchemaProblem {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}

/// Verifies the migrated version and the presence of every listed column.
pub(crate) fn check_schema(
    conn: &Connection,
    tables: &[(&'static str, &[&'static str])],
) -> Result<(), SchemaProblem> {
    let expected = latest_version();
    let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual != expected {
        return Err(SchemaProblem::VersionMismatch { expected, actual });
    }

    for &(table, columns) in tables {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(SchemaProblem::MissingTable(table));
        }
        for &column in columns {
            if !present.iter().any(|name| name.as_str() == column) {
                return Err(SchemaProblem::MissingColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get(1)?);
    }
    Ok(columns)
}
