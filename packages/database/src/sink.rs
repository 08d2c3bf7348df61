//! Transactional company upserts.
//!
//! [`DatabaseSink::apply`] writes one [`CompanyRecord`] per transaction.
//! The scalar row is inserted or overwritten; every child row is inserted
//! under its own savepoint with `ON CONFLICT DO NOTHING`. A failing child
//! row is rolled back to its savepoint and logged, leaving the company and
//! its other child rows intact. Only a failed scalar write (or commit)
//! rolls back the whole company.

use async_trait::async_trait;
use company_etl_company_models::CompanyRecord;
use switchy_database::{Database, DatabaseError, DatabaseValue};

use crate::db::{Dialect, Store};

/// Errors that abort a single company's transaction.
#[derive(Debug, thiserror::Error)]
pub enum UpsertError {
    /// The scalar row could not be written; nothing was kept.
    #[error("Failed to write company '{company_id}': {message}")]
    ScalarWrite { company_id: String, message: String },

    /// The transaction could not be opened or committed.
    #[error("Transaction failed for company '{company_id}': {message}")]
    Transaction { company_id: String, message: String },
}

/// Result of a successful [`CompanySink::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReceipt {
    pub company_id: String,
    /// Child rows written or already present.
    pub sub_rows_written: usize,
    /// Child rows that failed and were skipped.
    pub sub_rows_failed: usize,
}

/// Destination for normalized companies.
#[async_trait]
pub trait CompanySink: Send + Sync {
    /// Applies one company and its child rows.
    ///
    /// # Errors
    ///
    /// Returns [`UpsertError`] if the company row itself could not be
    /// stored.
    async fn apply(&self, record: &CompanyRecord) -> Result<UpsertReceipt, UpsertError>;
}

const UPSERT_COMPANY: &str = "INSERT INTO companies (
        company_id, company_name, score, status, liq_status, industry_code,
        industry_name, address, location, incorporated_date, country,
        watch_list_titles
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (company_id) DO UPDATE SET
        company_name = EXCLUDED.company_name,
        score = EXCLUDED.score,
        status = EXCLUDED.status,
        liq_status = EXCLUDED.liq_status,
        industry_code = EXCLUDED.industry_code,
        industry_name = EXCLUDED.industry_name,
        address = EXCLUDED.address,
        location = EXCLUDED.location,
        incorporated_date = EXCLUDED.incorporated_date,
        country = EXCLUDED.country,
        watch_list_titles = EXCLUDED.watch_list_titles";

const INSERT_FACT: &str = "INSERT INTO financial_facts (company_id, fact_type, provenance, value)
    VALUES (?, ?, ?, ?)
    ON CONFLICT DO NOTHING";

const INSERT_ACTIVITY: &str = "INSERT INTO activities (company_id, description, provenance)
    VALUES (?, ?, ?)
    ON CONFLICT DO NOTHING";

const INSERT_TRADING_AREA: &str = "INSERT INTO trading_areas (
        company_id, area, address, post_code_short, region_id, region,
        post_code, district_id, district, location, latitude, longitude
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT DO NOTHING";

const INSERT_INDUSTRY_MIX: &str = "INSERT INTO industry_mix (
        company_id, sic_code, sic_description, sic_group, weight
    ) VALUES (?, ?, ?, ?, ?)
    ON CONFLICT DO NOTHING";

/// [`CompanySink`] backed by a `switchy_database` connection.
pub struct DatabaseSink {
    db: Box<dyn Database>,
    dialect: Dialect,
}

impl DatabaseSink {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            db: store.db,
            dialect: store.dialect,
        }
    }

    /// The underlying connection, for read-side queries.
    #[must_use]
    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }
}

#[async_trait]
impl CompanySink for DatabaseSink {
    async fn apply(&self, record: &CompanyRecord) -> Result<UpsertReceipt, UpsertError> {
        let company_id = record.company_id.clone();

        let tx = self
            .db
            .begin_transaction()
            .await
            .map_err(|e| UpsertError::Transaction {
                company_id: company_id.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = tx
            .exec_raw_params(&self.dialect.sql(UPSERT_COMPANY), &scalar_params(record))
            .await
        {
            let message = e.to_string();
            if let Err(e) = tx.rollback().await {
                log::warn!("Rollback failed for company '{company_id}': {e}");
            }
            return Err(UpsertError::ScalarWrite {
                company_id,
                message,
            });
        }

        let mut receipt = UpsertReceipt {
            company_id: company_id.clone(),
            ..UpsertReceipt::default()
        };

        for (table, statement, params) in sub_rows(record) {
            match write_sub_row(&*tx, &self.dialect.sql(statement), &params).await {
                Ok(()) => receipt.sub_rows_written += 1,
                Err(e) => {
                    log::warn!("Skipping {table} row for company '{company_id}': {e}");
                    receipt.sub_rows_failed += 1;
                }
            }
        }

        tx.commit().await.map_err(|e| UpsertError::Transaction {
            company_id,
            message: e.to_string(),
        })?;

        Ok(receipt)
    }
}

/// Inserts one child row inside a savepoint so its failure leaves the
/// surrounding transaction usable.
async fn write_sub_row<D: Database + Sync + ?Sized>(
    tx: &D,
    statement: &str,
    params: &[DatabaseValue],
) -> Result<(), DatabaseError> {
    tx.exec_raw("SAVEPOINT sub_row").await?;

    match tx.exec_raw_params(statement, params).await {
        Ok(_) => {
            tx.exec_raw("RELEASE SAVEPOINT sub_row").await?;
            Ok(())
        }
        Err(e) => {
            tx.exec_raw("ROLLBACK TO SAVEPOINT sub_row").await?;
            tx.exec_raw("RELEASE SAVEPOINT sub_row").await?;
            Err(e)
        }
    }
}

fn text(value: &str) -> DatabaseValue {
    DatabaseValue::String(value.to_string())
}

fn opt_real(value: Option<f64>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, DatabaseValue::Real64)
}

fn scalar_params(record: &CompanyRecord) -> Vec<DatabaseValue> {
    vec![
        text(&record.company_id),
        text(&record.name),
        DatabaseValue::Real64(record.score),
        text(&record.status),
        text(&record.liquidation_status),
        text(&record.industry_code),
        text(&record.industry_name),
        text(&record.address),
        text(&record.location),
        record
            .incorporated_date
            .as_deref()
            .map_or(DatabaseValue::Null, text),
        text(&record.country),
        text(&record.watch_list_titles),
    ]
}

type SubRow = (&'static str, &'static str, Vec<DatabaseValue>);

/// Every child row of `record`, tagged with its table name.
fn sub_rows(record: &CompanyRecord) -> Vec<SubRow> {
    let id = || text(&record.company_id);
    let mut rows = Vec::with_capacity(record.sub_row_count());

    for fact in &record.financial_facts {
        rows.push((
            "financial_facts",
            INSERT_FACT,
            vec![
                id(),
                text(fact.kind.as_ref()),
                text(&fact.provenance),
                DatabaseValue::Real64(fact.value),
            ],
        ));
    }

    for activity in &record.activities {
        rows.push((
            "activities",
            INSERT_ACTIVITY,
            vec![id(), text(&activity.description), text(&activity.provenance)],
        ));
    }

    for area in &record.trading_areas {
        rows.push((
            "trading_areas",
            INSERT_TRADING_AREA,
            vec![
                id(),
                text(&area.area),
                text(&area.address),
                text(&area.post_code_short),
                text(&area.region_id),
                text(&area.region),
                text(&area.post_code),
                text(&area.district_id),
                text(&area.district),
                text(&area.location),
                opt_real(area.latitude),
                opt_real(area.longitude),
            ],
        ));
    }

    for mix in &record.industry_mix {
        rows.push((
            "industry_mix",
            INSERT_INDUSTRY_MIX,
            vec![
                id(),
                text(&mix.sic_code),
                text(&mix.description),
                text(&mix.group),
                DatabaseValue::Real64(mix.weight),
            ],
        ));
    }

    rows
}

#[cfg(test)]
mod tests {
    use company_etl_company_models::{
        Activity, FactKind, FinancialFact, IndustryMix, TradingArea,
    };

    use super::*;
    use crate::db::open_sqlite;
    use crate::queries::{find_company, table_counts};
    use crate::schema::ensure_schema;

    async fn sink(dir: &tempfile::TempDir) -> DatabaseSink {
        let store = open_sqlite(&dir.path().join("companies.db")).unwrap();
        ensure_schema(store.db.as_ref(), store.dialect).await.unwrap();
        DatabaseSink::new(store)
    }

    fn brewery(name: &str) -> CompanyRecord {
        let mut record = CompanyRecord::new("08315839");
        record.name = name.to_string();
        record.status = "live".to_string();
        record.financial_facts = vec![FinancialFact {
            kind: FactKind::Turnover,
            provenance: "filed".to_string(),
            value: 1_500_000.0,
        }];
        record.activities = vec![Activity {
            description: "Craft beer brewing".to_string(),
            provenance: "description".to_string(),
        }];
        record.trading_areas = vec![TradingArea {
            area: "SR".to_string(),
            post_code: "SR5 1AB".to_string(),
            latitude: Some(54.91),
            ..TradingArea::default()
        }];
        record.industry_mix = vec![IndustryMix {
            sic_code: "11050".to_string(),
            description: "Manufacture of beer".to_string(),
            group: String::new(),
            weight: 0.8,
        }];
        record
    }

    #[test]
    fn sub_rows_cover_every_collection() {
        let record = brewery("VAUX BREWERY LIMITED");
        let rows = sub_rows(&record);
        assert_eq!(rows.len(), record.sub_row_count());
        assert!(matches!(&rows[0].2[1], DatabaseValue::String(kind) if kind == "turnover"));
        assert_eq!(rows[2].2.len(), 12);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_last_scalars_win() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(&dir).await;

        let first = sink.apply(&brewery("VAUX BREWERY")).await.unwrap();
        assert_eq!(first.company_id, "08315839");
        assert_eq!(first.sub_rows_written, 4);

        let mut second = brewery("VAUX BREWERY LIMITED");
        second.status = "dissolved".to_string();
        sink.apply(&second).await.unwrap();

        let stored = find_company(sink.db(), sink.dialect(), "08315839")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "VAUX BREWERY LIMITED");
        assert_eq!(stored.status, "dissolved");

        let counts = table_counts(sink.db()).await.unwrap();
        assert_eq!(counts.companies, 1);
        assert_eq!(counts.financial_facts, 1);
        assert_eq!(counts.activities, 1);
        assert_eq!(counts.trading_areas, 1);
        assert_eq!(counts.industry_mix, 1);
    }

    #[tokio::test]
    async fn failing_child_row_keeps_company_and_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(&dir).await;
        sink.db().exec_raw("DROP TABLE activities").await.unwrap();

        let receipt = sink.apply(&brewery("VAUX BREWERY")).await.unwrap();
        assert_eq!(receipt.sub_rows_failed, 1);
        assert_eq!(receipt.sub_rows_written, 3);

        assert!(
            find_company(sink.db(), sink.dialect(), "08315839")
                .await
                .unwrap()
                .is_some()
        );
        let facts = sink
            .db()
            .query_raw_params("SELECT * FROM financial_facts", &[])
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn failing_scalar_write_keeps_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(&dir).await;
        sink.db().exec_raw("DROP TABLE companies").await.unwrap();

        let err = sink.apply(&brewery("VAUX BREWERY")).await.unwrap_err();
        assert!(matches!(err, UpsertError::ScalarWrite { .. }));
    }
}
