use crate::api::response;
use crate::auth::extractor::AuthenticatedUser;
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub scope: Option<String>,
}

impl StatsQuery {
    fn platform(&self) -> bool {
        self.scope.as_deref().map(str::trim) == Some("platform")
    }
}

pub async fn stats(
    user: AuthenticatedUser,
    query: web::Query<StatsQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if query.platform() {
        if !user.is_admin() {
            return Err(AuthError::Unauthorized.into());
        }
        return Ok(response::ok(state.db.platform_overview().await?));
    }

    Ok(response::ok(state.db.host_stats(user.id).await?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/dashboard").route("/stats", web::get().to(stats)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_scope() {
        assert!(StatsQuery { scope: Some("platform".into()) }.platform());
        assert!(!StatsQuery { scope: Some("host".into()) }.platform());
        assert!(!StatsQuery::default().platform());
    }
}
