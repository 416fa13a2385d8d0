use std::collections::HashSet;

use diesel::connection::SimpleConnection;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError, PooledConnection};
use diesel::sqlite::SqliteConnection;

pub mod models;
pub mod schema;

use models::{
    Advisory, CpeMatch, ImpactRow, MonthlyCount, NewCpeMatch, Product, ProductHits,
    SeverityTrend, VendorCriticals,
};

/// Idempotent schema. Safe to run on every start; the two indexes back the
/// vendor/product lookups issued by the API.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS advisories (
    id TEXT PRIMARY KEY,
    summary TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    last_modified_at TEXT,
    severity_score DOUBLE,
    severity_vector TEXT,
    ingested_at TEXT NOT NULL,
    raw_payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS cpes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    advisory_id TEXT NOT NULL REFERENCES advisories(id),
    uri TEXT NOT NULL,
    part TEXT,
    vendor TEXT,
    product TEXT,
    version TEXT
);
CREATE INDEX IF NOT EXISTS idx_cpes_vendor ON cpes(vendor);
CREATE INDEX IF NOT EXISTS idx_cpes_product ON cpes(product);
";

#[derive(thiserror::Error, Debug)]
#[error("Database error.")]
pub struct DatabaseError {
    #[from]
    source: PoolError,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The storage itself is gone; callers should halt the run.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] PoolError),
    /// A statement failed inside one advisory's transaction. The transaction
    /// rolled back and the next record can proceed.
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub struct SqliteRepository {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl SqliteRepository {
    pub fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::new(manager)?;
        Ok(Self { pool })
    }

    /// A single-connection pool over `:memory:`, so every caller sees the
    /// same database.
    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("in-memory pool");
        let repository = Self { pool };
        repository.setup_database().expect("schema creation");
        repository
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        Ok(self.pool.get()?)
    }

    pub fn setup_database(&self) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        conn.batch_execute(SCHEMA_SQL)?;
        Ok(())
    }

    /// Replace-or-insert one advisory and its whole association set, as one
    /// transaction. Any prior associations for the same advisory id are
    /// gone afterwards; duplicate raw URIs collapse to one row each.
    pub fn upsert_advisory(&self, advisory: &Advisory, uris: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| -> QueryResult<()> {
            use schema::{advisories, cpes};

            diesel::replace_into(advisories::table)
                .values(advisory)
                .execute(conn)?;

            diesel::delete(cpes::table.filter(cpes::advisory_id.eq(&advisory.id)))
                .execute(conn)?;

            let mut seen = HashSet::new();
            for uri in uris {
                if !seen.insert(uri.as_str()) {
                    continue;
                }
                let row = NewCpeMatch::with(&advisory.id, cpe::CpeParts::from(uri.as_str()));
                diesel::insert_into(cpes::table).values(&row).execute(conn)?;
            }

            Ok(())
        })?;

        Ok(())
    }

    pub fn get_advisory(&self, the_id: &str) -> Result<Option<Advisory>, StoreError> {
        use schema::advisories::dsl::*;

        let mut conn = self.conn()?;

        match advisories.find(the_id).first::<Advisory>(&mut conn) {
            Ok(row) => Ok(Some(row)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_matches(&self, the_advisory: &str) -> Result<Vec<CpeMatch>, StoreError> {
        use schema::cpes::dsl::*;

        let mut conn = self.conn()?;

        Ok(cpes
            .filter(advisory_id.eq(the_advisory))
            .order(id.asc())
            .load::<CpeMatch>(&mut conn)?)
    }

    pub fn recent_advisories(&self, limit: i64) -> Result<Vec<Advisory>, StoreError> {
        use schema::advisories::dsl::*;

        let mut conn = self.conn()?;

        Ok(advisories
            .order(published_at.desc())
            .limit(limit)
            .load::<Advisory>(&mut conn)?)
    }

    /// Advisories reachable through the association table, by normalized
    /// vendor (exact) and/or product (substring).
    pub fn search_advisories(
        &self,
        by_vendor: Option<&str>,
        by_product: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Advisory>, StoreError> {
        use schema::{advisories, cpes};

        let mut conn = self.conn()?;

        let mut query = advisories::table
            .inner_join(cpes::table)
            .select(advisories::all_columns)
            .distinct()
            .limit(limit)
            .into_boxed::<diesel::sqlite::Sqlite>();

        if let Some(v) = by_vendor {
            query = query.filter(cpes::vendor.eq(v.to_lowercase()));
        }
        if let Some(p) = by_product {
            query = query.filter(cpes::product.like(format!("%{}%", p.to_lowercase())));
        }

        Ok(query.load::<Advisory>(&mut conn)?)
    }

    pub fn get_products(&self) -> Result<Vec<Product>, StoreError> {
        use schema::cpes::dsl::*;

        let mut conn = self.conn()?;

        let rows: Vec<(Option<String>, Option<String>)> = cpes
            .select((vendor, product))
            .distinct()
            .filter(vendor.is_not_null().and(product.is_not_null()))
            .order((vendor.asc(), product.asc()))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|(v, p)| match (v, p) {
                (Some(v), Some(p)) => Some(Product {
                    vendor: v,
                    product: p,
                }),
                _ => None,
            })
            .collect())
    }

    pub fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        use schema::cpes::dsl::*;

        let mut conn = self.conn()?;

        let rows: Vec<(Option<String>, Option<String>)> = cpes
            .select((vendor, product))
            .distinct()
            .filter(product.like(format!("%{}%", query.to_lowercase())))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|(v, p)| match (v, p) {
                (Some(v), Some(p)) => Some(Product {
                    vendor: v,
                    product: p,
                }),
                _ => None,
            })
            .collect())
    }

    /// Products ordered by how many associations reference them.
    pub fn top_products(&self, limit: i64) -> Result<Vec<ProductHits>, StoreError> {
        use schema::cpes::dsl::*;

        let mut conn = self.conn()?;

        let rows: Vec<(Option<String>, Option<String>, i64)> = cpes
            .filter(product.is_not_null())
            .group_by((vendor, product))
            .select((vendor, product, count_star()))
            .order(count_star().desc())
            .limit(limit)
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(v, p, hits)| ProductHits {
                vendor: v,
                product: p.unwrap_or_default(),
                hits,
            })
            .collect())
    }

    pub fn monthly_counts(&self) -> Result<Vec<MonthlyCount>, StoreError> {
        let mut conn = self.conn()?;

        Ok(diesel::sql_query(
            "SELECT substr(published_at, 1, 7) AS year_month, COUNT(*) AS total \
             FROM advisories WHERE published_at IS NOT NULL \
             GROUP BY year_month ORDER BY year_month",
        )
        .load(&mut conn)?)
    }

    pub fn severity_trend(&self) -> Result<Vec<SeverityTrend>, StoreError> {
        let mut conn = self.conn()?;

        Ok(diesel::sql_query(
            "SELECT substr(published_at, 1, 7) AS year_month, \
             CASE \
               WHEN severity_score IS NULL THEN 'unknown' \
               WHEN severity_score < 4.0 THEN 'low' \
               WHEN severity_score < 7.0 THEN 'medium' \
               WHEN severity_score < 9.0 THEN 'high' \
               ELSE 'critical' \
             END AS bucket, \
             COUNT(*) AS total \
             FROM advisories WHERE published_at IS NOT NULL \
             GROUP BY year_month, bucket ORDER BY year_month, bucket",
        )
        .load(&mut conn)?)
    }

    pub fn top_critical_vendors(&self, limit: i64) -> Result<Vec<VendorCriticals>, StoreError> {
        let mut conn = self.conn()?;

        Ok(diesel::sql_query(
            "SELECT cpes.vendor AS vendor, \
             COUNT(DISTINCT cpes.advisory_id) AS critical_advisories \
             FROM cpes JOIN advisories ON advisories.id = cpes.advisory_id \
             WHERE advisories.severity_score >= 9.0 AND cpes.vendor IS NOT NULL \
             GROUP BY cpes.vendor ORDER BY critical_advisories DESC LIMIT ?",
        )
        .bind::<diesel::sql_types::BigInt, _>(limit)
        .load(&mut conn)?)
    }

    pub fn export_impact(&self, limit: i64) -> Result<Vec<ImpactRow>, StoreError> {
        use schema::{advisories, cpes};

        let mut conn = self.conn()?;

        let rows: Vec<(
            String,
            Option<String>,
            Option<f64>,
            Option<String>,
            Option<String>,
            Option<String>,
        )> = cpes::table
            .inner_join(advisories::table)
            .select((
                cpes::advisory_id,
                advisories::published_at,
                advisories::severity_score,
                cpes::vendor,
                cpes::product,
                cpes::version,
            ))
            .order(advisories::published_at.desc())
            .limit(limit)
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(
                |(advisory, published, score, vendor, product, version)| ImpactRow {
                    advisory,
                    published,
                    score,
                    vendor,
                    product,
                    version,
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisory(the_id: &str, score: Option<f64>) -> Advisory {
        Advisory::with(
            the_id.to_owned(),
            "test advisory".to_owned(),
            Some("2024-03-01T10:00:00.000".to_owned()),
            None,
            score,
            None,
            "{}".to_owned(),
        )
    }

    fn uri(vendor: &str, product: &str, version: &str) -> String {
        format!("cpe:2.3:a:{}:{}:{}:*:*:*:*:*:*:*", vendor, product, version)
    }

    #[test]
    fn setup_database_is_idempotent() {
        let repository = SqliteRepository::in_memory();
        repository.setup_database().unwrap();
        repository.setup_database().unwrap();
    }

    #[test]
    fn missing_advisory_reads_as_none() {
        let repository = SqliteRepository::in_memory();
        assert!(repository.get_advisory("CVE-0000-0000").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_the_association_set() {
        let repository = SqliteRepository::in_memory();

        let uris = vec![uri("acme", "anvil", "1.0"), uri("acme", "rocket", "2.0")];
        repository
            .upsert_advisory(&advisory("CVE-2024-0001", Some(5.0)), &uris)
            .unwrap();
        assert_eq!(2, repository.get_matches("CVE-2024-0001").unwrap().len());

        let reduced = vec![uri("acme", "anvil", "1.0")];
        repository
            .upsert_advisory(&advisory("CVE-2024-0001", Some(6.1)), &reduced)
            .unwrap();

        let matches = repository.get_matches("CVE-2024-0001").unwrap();
        assert_eq!(1, matches.len());
        assert_eq!(Some("anvil".to_owned()), matches[0].product);

        let stored = repository.get_advisory("CVE-2024-0001").unwrap().unwrap();
        assert_eq!(Some(6.1), stored.severity_score);
    }

    #[test]
    fn duplicate_uris_collapse_to_one_row() {
        let repository = SqliteRepository::in_memory();

        let uris = vec![uri("acme", "anvil", "1.0"), uri("acme", "anvil", "1.0")];
        repository
            .upsert_advisory(&advisory("CVE-2024-0002", None), &uris)
            .unwrap();

        assert_eq!(1, repository.get_matches("CVE-2024-0002").unwrap().len());
    }

    #[test]
    fn products_are_queryable_through_the_indexes() {
        let repository = SqliteRepository::in_memory();

        repository
            .upsert_advisory(
                &advisory("CVE-2024-0003", Some(9.8)),
                &[uri("acme", "anvil", "1.0")],
            )
            .unwrap();
        repository
            .upsert_advisory(
                &advisory("CVE-2024-0004", Some(3.1)),
                &[uri("acme", "anvil", "2.0"), uri("initech", "printer", "1.1")],
            )
            .unwrap();

        let products = repository.get_products().unwrap();
        assert_eq!(2, products.len());

        let found = repository.search_products("anv").unwrap();
        assert_eq!(1, found.len());
        assert_eq!("anvil", found[0].product);

        let top = repository.top_products(5).unwrap();
        assert_eq!("anvil", top[0].product);
        assert_eq!(2, top[0].hits);

        let by_vendor = repository
            .search_advisories(Some("acme"), None, 50)
            .unwrap();
        assert_eq!(2, by_vendor.len());

        let by_product = repository
            .search_advisories(None, Some("print"), 50)
            .unwrap();
        assert_eq!(1, by_product.len());
        assert_eq!("CVE-2024-0004", by_product[0].id);
    }

    #[test]
    fn stats_reflect_stored_advisories() {
        let repository = SqliteRepository::in_memory();

        repository
            .upsert_advisory(
                &advisory("CVE-2024-0005", Some(9.8)),
                &[uri("acme", "anvil", "1.0")],
            )
            .unwrap();
        repository
            .upsert_advisory(&advisory("CVE-2024-0006", None), &[])
            .unwrap();

        let monthly = repository.monthly_counts().unwrap();
        assert_eq!(1, monthly.len());
        assert_eq!("2024-03", monthly[0].year_month);
        assert_eq!(2, monthly[0].total);

        let trend = repository.severity_trend().unwrap();
        let buckets: Vec<&str> = trend.iter().map(|t| t.bucket.as_str()).collect();
        assert!(buckets.contains(&"critical"));
        assert!(buckets.contains(&"unknown"));

        let critical = repository.top_critical_vendors(10).unwrap();
        assert_eq!(1, critical.len());
        assert_eq!("acme", critical[0].vendor);
        assert_eq!(1, critical[0].critical_advisories);

        let rows = repository.export_impact(10).unwrap();
        assert_eq!(1, rows.len());
        assert_eq!("CVE-2024-0005", rows[0].advisory);
    }
}
