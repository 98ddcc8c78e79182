//! REST endpoints, one module per resource. Each module exposes a
//! `configure` function that mounts its scope under `/api`.

pub mod admin;
pub mod analytics;
pub mod categories;
pub mod chat;
pub mod dashboard;
pub mod features;
pub mod notifications;
pub mod properties;
pub mod reservations;
pub mod response;
pub mod reviews;
pub mod stripe;
pub mod subscribers;
pub mod users;

use crate::db::search::Page;
use actix_web::web;
use serde::Deserialize;

/// `?page=&limit=` shared by every paginated list.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

/// Trims an optional text field, treating blank input as absent.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(crate::auth::handlers::configure)
            .configure(properties::configure)
            .configure(users::configure)
            .configure(reservations::configure)
            .configure(reviews::configure)
            .configure(categories::configure)
            .configure(features::configure)
            .configure(subscribers::configure)
            .configure(stripe::configure)
            .configure(chat::configure)
            .configure(notifications::configure)
            .configure(dashboard::configure)
            .configure(admin::configure)
            .configure(analytics::configure),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults() {
        let page = PageQuery::default().page();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
    }

    #[test]
    fn test_page_query_from_extreme_input() {
        let query = web::Query::<PageQuery>::from_query("page=9223372036854775807&limit=100").unwrap();
        let page = query.page();
        assert_eq!(page.page, crate::db::search::MAX_PAGE);
        assert_eq!(page.offset(), (crate::db::search::MAX_PAGE - 1) * 100);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Paris ")), Some("Paris"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
