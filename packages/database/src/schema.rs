//! Company table DDL.
//!
//! The same statements run on Postgres and `SQLite`. Child tables reference
//! `companies` with `ON DELETE CASCADE`, and each carries a natural-key
//! `UNIQUE` constraint so re-inserting the same row is a no-op.

use switchy_database::Database;

use crate::DbError;
use crate::db::Dialect;

/// Child tables, in the order they must be cleared before `companies`.
pub const CHILD_TABLES: &[&str] = &[
    "financial_facts",
    "activities",
    "trading_areas",
    "industry_mix",
];

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS companies (
        company_id TEXT PRIMARY KEY,
        company_name TEXT NOT NULL DEFAULT '',
        score DOUBLE PRECISION NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT '',
        liq_status TEXT NOT NULL DEFAULT '',
        industry_code TEXT NOT NULL DEFAULT '',
        industry_name TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        incorporated_date TEXT,
        country TEXT NOT NULL DEFAULT '',
        watch_list_titles TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS financial_facts (
        company_id TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
        fact_type TEXT NOT NULL,
        provenance TEXT NOT NULL,
        value DOUBLE PRECISION NOT NULL,
        UNIQUE (company_id, fact_type, provenance, value)
    )",
    "CREATE TABLE IF NOT EXISTS activities (
        company_id TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        provenance TEXT NOT NULL,
        UNIQUE (company_id, description, provenance)
    )",
    "CREATE TABLE IF NOT EXISTS trading_areas (
        company_id TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
        area TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        post_code_short TEXT NOT NULL DEFAULT '',
        region_id TEXT NOT NULL DEFAULT '',
        region TEXT NOT NULL DEFAULT '',
        post_code TEXT NOT NULL DEFAULT '',
        district_id TEXT NOT NULL DEFAULT '',
        district TEXT NOT NULL DEFAULT '',
        location TEXT NOT NULL DEFAULT '',
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION,
        UNIQUE (company_id, area, address, post_code)
    )",
    "CREATE TABLE IF NOT EXISTS industry_mix (
        company_id TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
        sic_code TEXT NOT NULL DEFAULT '',
        sic_description TEXT NOT NULL DEFAULT '',
        sic_group TEXT NOT NULL DEFAULT '',
        weight DOUBLE PRECISION NOT NULL DEFAULT 0,
        UNIQUE (company_id, sic_code, sic_description)
    )",
    "CREATE INDEX IF NOT EXISTS idx_companies_status ON companies (status)",
];

/// Creates all tables if they don't already exist.
///
/// Statements are executed one at a time since `SQLite` rejects
/// multi-statement strings.
///
/// # Errors
///
/// Returns [`DbError`] if any DDL statement fails.
pub async fn ensure_schema(db: &dyn Database, dialect: Dialect) -> Result<(), DbError> {
    if dialect == Dialect::Sqlite {
        db.exec_raw("PRAGMA foreign_keys = ON").await?;
    }

    for statement in DDL {
        db.exec_raw(statement).await?;
    }

    log::info!("Company schema is up to date");
    Ok(())
}
