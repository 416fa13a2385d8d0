use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use serde::Serialize;

use super::schema::{advisories, cpes};

/// One normalized advisory row. Re-ingestion replaces the whole row, so the
/// same struct serves both reads and writes.
#[derive(Queryable, Insertable, Debug, Clone, Serialize)]
#[diesel(table_name = advisories)]
pub struct Advisory {
    pub id: String,
    pub summary: String,
    pub published_at: Option<String>,
    pub last_modified_at: Option<String>,
    pub severity_score: Option<f64>,
    pub severity_vector: Option<String>,
    #[serde(skip_serializing)]
    pub ingested_at: String,
    #[serde(skip_serializing)]
    pub raw_payload: String,
}

impl Advisory {
    pub fn with(
        id: String,
        summary: String,
        published_at: Option<String>,
        last_modified_at: Option<String>,
        severity_score: Option<f64>,
        severity_vector: Option<String>,
        raw_payload: String,
    ) -> Self {
        Self {
            id,
            summary,
            published_at,
            last_modified_at,
            severity_score,
            severity_vector,
            ingested_at: Utc::now().to_rfc3339(),
            raw_payload,
        }
    }
}

#[derive(Queryable, Debug, Clone, Serialize)]
pub struct CpeMatch {
    #[serde(skip_serializing)]
    pub id: i32,
    #[serde(skip_serializing)]
    pub advisory_id: String,
    pub uri: String,
    pub part: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cpes)]
pub struct NewCpeMatch {
    pub advisory_id: String,
    pub uri: String,
    pub part: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl NewCpeMatch {
    pub fn with(advisory_id: &str, parts: cpe::CpeParts) -> Self {
        Self {
            advisory_id: advisory_id.to_owned(),
            uri: parts.raw,
            part: parts.part.map(|p| p.to_string()),
            vendor: parts.vendor,
            product: parts.product,
            version: parts.version,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Product {
    pub vendor: String,
    pub product: String,
}

#[derive(Debug, Serialize)]
pub struct ProductHits {
    pub vendor: Option<String>,
    pub product: String,
    pub hits: i64,
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct MonthlyCount {
    #[diesel(sql_type = Text)]
    pub year_month: String,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct SeverityTrend {
    #[diesel(sql_type = Text)]
    pub year_month: String,
    #[diesel(sql_type = Text)]
    pub bucket: String,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct VendorCriticals {
    #[diesel(sql_type = Text)]
    pub vendor: String,
    #[diesel(sql_type = BigInt)]
    pub critical_advisories: i64,
}

#[derive(Debug, Serialize)]
pub struct ImpactRow {
    pub advisory: String,
    pub published: Option<String>,
    pub score: Option<f64>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}
