use sqlx::SqlitePool;

pub const SQLITE_SCHEMA_SQL: &str = include_str!("../../sql/sqlite_schema.sql");
pub const SCHEMA_VERSION: &str = "1";

/// Splits a SQL script on `;` outside of quoted sections.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if !in_single_quote && !in_double_quote && line.trim_start().starts_with("--") {
            continue;
        }

        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let metadata_exists: Option<String> = sqlx::query_scalar(
        r#"SELECT "name" FROM "sqlite_master" WHERE "type" = 'table' AND "name" = '_db_metadata'"#,
    )
    .fetch_optional(pool)
    .await?;

    if metadata_exists.is_some() {
        let version: Option<String> =
            sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
                .fetch_optional(pool)
                .await?;
        if version.as_deref() == Some(SCHEMA_VERSION) {
            return Ok(());
        }
    }

    tracing::info!(version = SCHEMA_VERSION, "applying database schema");

    let mut tx = pool.begin().await?;
    for stmt in split_sql_statements(SQLITE_SCHEMA_SQL) {
        sqlx::query(&stmt).execute(&mut *tx).await?;
    }
    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}
