use crate::api::response;
use crate::auth::extractor::AdminUser;
use crate::db::analytics::clamp_months;
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

const DEFAULT_TOP_LIMIT: i64 = 10;
const MAX_TOP_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct MonthsQuery {
    pub months: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

fn top_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT)
}

pub async fn overview(_admin: AdminUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.platform_overview().await?))
}

pub async fn revenue(
    _admin: AdminUser,
    query: web::Query<MonthsQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.monthly_revenue(clamp_months(query.months)).await?))
}

pub async fn user_growth(
    _admin: AdminUser,
    query: web::Query<MonthsQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.user_growth(clamp_months(query.months)).await?))
}

pub async fn categories(_admin: AdminUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.category_breakdown().await?))
}

pub async fn top_properties(
    _admin: AdminUser,
    query: web::Query<LimitQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.top_properties(top_limit(query.limit)).await?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/analytics")
            .route("/overview", web::get().to(overview))
            .route("/revenue", web::get().to(revenue))
            .route("/user-growth", web::get().to(user_growth))
            .route("/categories", web::get().to(categories))
            .route("/top-properties", web::get().to(top_properties)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_limit() {
        assert_eq!(top_limit(None), DEFAULT_TOP_LIMIT);
        assert_eq!(top_limit(Some(0)), 1);
        assert_eq!(top_limit(Some(500)), MAX_TOP_LIMIT);
    }
}
