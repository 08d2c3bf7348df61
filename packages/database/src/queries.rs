//! Read-side queries and maintenance for the company tables.

use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::DbError;
use crate::db::Dialect;
use crate::schema::CHILD_TABLES;

/// Row counts of every company table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub companies: u64,
    pub financial_facts: u64,
    pub activities: u64,
    pub trading_areas: u64,
    pub industry_mix: u64,
}

/// Scalar columns of one stored company.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanySummary {
    pub company_id: String,
    pub name: String,
    pub status: String,
    pub score: f64,
}

async fn count_rows(db: &dyn Database, table: &str) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .await?;

    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: format!("COUNT on {table} returned no rows"),
    })?;
    let n: i64 = row.to_value("n").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse {table} count: {e}"),
    })?;

    u64::try_from(n).map_err(|e| DbError::Conversion {
        message: format!("Negative {table} count: {e}"),
    })
}

/// Counts the rows in every company table.
///
/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub async fn table_counts(db: &dyn Database) -> Result<TableCounts, DbError> {
    Ok(TableCounts {
        companies: count_rows(db, "companies").await?,
        financial_facts: count_rows(db, "financial_facts").await?,
        activities: count_rows(db, "activities").await?,
        trading_areas: count_rows(db, "trading_areas").await?,
        industry_mix: count_rows(db, "industry_mix").await?,
    })
}

/// Loads the scalar columns of one company.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a column cannot be converted.
pub async fn find_company(
    db: &dyn Database,
    dialect: Dialect,
    company_id: &str,
) -> Result<Option<CompanySummary>, DbError> {
    let rows = db
        .query_raw_params(
            &dialect.sql(
                "SELECT company_id, company_name, status, score FROM companies
                 WHERE company_id = ?",
            ),
            &[DatabaseValue::String(company_id.to_string())],
        )
        .await?;

    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let conversion = |e: &dyn std::fmt::Display| DbError::Conversion {
        message: format!("Failed to read company '{company_id}': {e}"),
    };

    Ok(Some(CompanySummary {
        company_id: row.to_value("company_id").map_err(|e| conversion(&e))?,
        name: row.to_value("company_name").map_err(|e| conversion(&e))?,
        status: row.to_value("status").map_err(|e| conversion(&e))?,
        score: row.to_value("score").map_err(|e| conversion(&e))?,
    }))
}

/// Deletes every company row, child tables first.
///
/// Returns the number of companies removed.
///
/// # Errors
///
/// Returns [`DbError`] if a delete fails.
pub async fn reset_companies(db: &dyn Database) -> Result<u64, DbError> {
    for table in CHILD_TABLES {
        let removed = db.exec_raw_params(&format!("DELETE FROM {table}"), &[]).await?;
        log::debug!("Deleted {removed} rows from {table}");
    }

    let removed = db.exec_raw_params("DELETE FROM companies", &[]).await?;
    log::info!("Deleted {removed} companies");
    Ok(removed)
}
