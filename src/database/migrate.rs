use std::collections::HashSet;

use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::manager::{DatabaseError, DatabaseManager};
use super::model::ModelDescriptor;

/// Create the table if missing and add any columns it lacks.
///
/// Existing columns are never altered or dropped, so running this repeatedly
/// is safe.
pub async fn auto_migrate(pool: &SqlitePool, model: &ModelDescriptor) -> Result<(), DatabaseError> {
    let table = DatabaseManager::quote_identifier(model.table())?;

    let mut definitions = vec![format!(
        "{} INTEGER PRIMARY KEY AUTOINCREMENT",
        DatabaseManager::quote_identifier(ModelDescriptor::PRIMARY_KEY)?
    )];
    for column in model.columns() {
        definitions.push(format!(
            "{} {}",
            DatabaseManager::quote_identifier(&column.name)?,
            column.column_type.sql_type()
        ));
    }

    let create = format!("CREATE TABLE IF NOT EXISTS {} ({})", table, definitions.join(", "));
    sqlx::query(&create).execute(pool).await?;

    let existing: HashSet<String> = sqlx::query("SELECT name FROM pragma_table_info(?1)")
        .bind(model.table())
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()?;

    for column in model.columns() {
        if existing.contains(&column.name) {
            continue;
        }
        let alter = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table,
            DatabaseManager::quote_identifier(&column.name)?,
            column.column_type.sql_type()
        );
        sqlx::query(&alter).execute(pool).await?;
        info!("Added column {}.{}", model.table(), column.name);
    }

    debug!("Migrated table: {}", model.table());
    Ok(())
}

/// Delete every row of the model's table
pub async fn truncate(pool: &SqlitePool, model: &ModelDescriptor) -> Result<u64, DatabaseError> {
    let sql = format!("DELETE FROM {}", DatabaseManager::quote_identifier(model.table())?);
    let result = sqlx::query(&sql).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn has_table(pool: &SqlitePool, name: &str) -> Result<bool, DatabaseError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}
