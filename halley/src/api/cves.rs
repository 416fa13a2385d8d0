use std::{num::NonZeroUsize, sync::Mutex};

use actix_web::web::{self, Json};
use lazy_static::lazy_static;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use advisory_db::db::models::{Advisory, CpeMatch};

use super::{
    error::{handle_blocking_error, internal_server_error, ApplicationError},
    ApplicationContext,
};

lazy_static! {
    static ref CACHE: AdvisoryLruCache = AdvisoryLruCache::new(NonZeroUsize::new(4096).unwrap());
}

struct AdvisoryLruCache(Mutex<LruCache<String, AdvisoryDetails>>);

impl AdvisoryLruCache {
    fn new(cap: NonZeroUsize) -> Self {
        Self(Mutex::new(LruCache::new(cap)))
    }

    fn get(&self, id: &str) -> Option<AdvisoryDetails> {
        let mut inner = self.0.lock().unwrap();
        inner.get(id).cloned()
    }

    fn put(&self, id: String, details: AdvisoryDetails) -> Option<AdvisoryDetails> {
        self.0.lock().unwrap().put(id, details)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchEntry {
    pub uri: String,
    pub part: Option<String>,
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryDetails {
    pub id: String,
    pub summary: String,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    pub severity_score: Option<f64>,
    pub severity_vector: Option<String>,
    pub matches: Vec<MatchEntry>,
    pub raw: Value,
}

impl AdvisoryDetails {
    fn from_parts(advisory: Advisory, matches: Vec<CpeMatch>) -> Self {
        let raw = serde_json::from_str(&advisory.raw_payload).unwrap_or(Value::Null);

        Self {
            id: advisory.id,
            summary: advisory.summary,
            published: advisory.published_at,
            last_modified: advisory.last_modified_at,
            severity_score: advisory.severity_score,
            severity_vector: advisory.severity_vector,
            matches: matches
                .into_iter()
                .map(|m| MatchEntry {
                    uri: m.uri,
                    part: m.part,
                    vendor: m.vendor,
                    product: m.product,
                    version: m.version,
                })
                .collect(),
            raw,
        }
    }
}

pub async fn by_id(
    id: web::Path<String>,
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<AdvisoryDetails>, ApplicationError> {
    // Check the cache first
    if let Some(cached) = CACHE.get(&id) {
        log::debug!("cache hit");
        return Ok(Json(cached));
    } else {
        log::debug!("cache miss");
    }

    let details = {
        let advisory_id = (*id).clone();

        web::block(move || {
            let repository = ctx.get_repository();

            let advisory = repository
                .get_advisory(&advisory_id)
                .map_err(internal_server_error)?
                .ok_or(ApplicationError::NotFound)?;
            let matches = repository
                .get_matches(&advisory_id)
                .map_err(internal_server_error)?;

            Ok(AdvisoryDetails::from_parts(advisory, matches))
        })
        .await
        .map_err(handle_blocking_error)??
    };

    // Update the cache
    log::debug!("update cache");
    CACHE.put(id.into_inner(), details.clone());

    Ok(Json(details))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub vendor: Option<String>,
    pub product: Option<String>,
    pub limit: Option<i64>,
}

pub async fn search(
    params: web::Query<SearchParams>,
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<Vec<Advisory>>, ApplicationError> {
    let params = params.into_inner();

    if params.vendor.is_none() && params.product.is_none() {
        return Err(ApplicationError::BadRequest(
            "vendor or product is required".to_owned(),
        ));
    }

    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let advisories = web::block(move || {
        ctx.get_repository()
            .search_advisories(params.vendor.as_deref(), params.product.as_deref(), limit)
            .map_err(internal_server_error)
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(advisories))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<i64>,
}

pub async fn recent(
    params: web::Query<RecentParams>,
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<Vec<Advisory>>, ApplicationError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let advisories = web::block(move || {
        ctx.get_repository()
            .recent_advisories(limit)
            .map_err(internal_server_error)
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(advisories))
}
