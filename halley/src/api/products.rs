use actix_web::web::{self, Json};
use serde::Deserialize;

use advisory_db::db::models::{Product, ProductHits};

use super::{
    error::{bad_request_body, handle_blocking_error, internal_server_error, ApplicationError},
    ApplicationContext,
};

pub async fn all(
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<Vec<Product>>, ApplicationError> {
    let products = web::block(move || {
        ctx.get_repository()
            .get_products()
            .map_err(internal_server_error)
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(products))
}

pub async fn search(
    query: web::Path<String>,
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<Vec<Product>>, ApplicationError> {
    let products = web::block(move || {
        ctx.get_repository()
            .search_products(query.as_str())
            .map_err(bad_request_body)
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct TopParams {
    pub limit: Option<i64>,
}

pub async fn top(
    params: web::Query<TopParams>,
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<Vec<ProductHits>>, ApplicationError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 500);

    let products = web::block(move || {
        ctx.get_repository()
            .top_products(limit)
            .map_err(internal_server_error)
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(products))
}
