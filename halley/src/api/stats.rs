use std::borrow::Cow;

use actix_web::{
    web::{self, Json},
    HttpResponse,
};
use serde::{Deserialize, Serialize};

use advisory_db::db::models::{ImpactRow, MonthlyCount, SeverityTrend, VendorCriticals};

use super::{
    error::{handle_blocking_error, internal_server_error, ApplicationError},
    ApplicationContext,
};

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub monthly_counts: Vec<MonthlyCount>,
    pub severity_trend: Vec<SeverityTrend>,
    pub top_critical_vendors: Vec<VendorCriticals>,
}

pub async fn summary(
    ctx: web::Data<ApplicationContext>,
) -> Result<Json<StatsSummary>, ApplicationError> {
    let summary = web::block(move || {
        let repository = ctx.get_repository();

        Ok(StatsSummary {
            monthly_counts: repository.monthly_counts().map_err(internal_server_error)?,
            severity_trend: repository.severity_trend().map_err(internal_server_error)?,
            top_critical_vendors: repository
                .top_critical_vendors(10)
                .map_err(internal_server_error)?,
        })
    })
    .await
    .map_err(handle_blocking_error)??;

    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub limit: Option<i64>,
}

pub async fn export_impact(
    params: web::Query<ExportParams>,
    ctx: web::Data<ApplicationContext>,
) -> Result<HttpResponse, ApplicationError> {
    let limit = params.limit.unwrap_or(2000).clamp(1, 100_000);

    let rows = web::block(move || {
        ctx.get_repository()
            .export_impact(limit)
            .map_err(internal_server_error)
    })
    .await
    .map_err(handle_blocking_error)??;

    let mut body = String::from("advisory,published,score,vendor,product,version\n");
    for row in rows {
        body.push_str(&csv_line(&row));
    }

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .body(body))
}

fn csv_line(row: &ImpactRow) -> String {
    let score = row.score.map(|s| s.to_string()).unwrap_or_default();

    format!(
        "{},{},{},{},{},{}\n",
        csv_field(&row.advisory),
        csv_field(row.published.as_deref().unwrap_or_default()),
        score,
        csv_field(row.vendor.as_deref().unwrap_or_default()),
        csv_field(row.product.as_deref().unwrap_or_default()),
        csv_field(row.version.as_deref().unwrap_or_default()),
    )
}

/// Quote a field only when it would break the row.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::csv_field;

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!("acme", csv_field("acme"));
    }

    #[test]
    fn awkward_fields_are_quoted_and_escaped() {
        assert_eq!("\"1,2\"", csv_field("1,2"));
        assert_eq!("\"say \"\"hi\"\"\"", csv_field("say \"hi\""));
    }
}
