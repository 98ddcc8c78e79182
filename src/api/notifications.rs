use crate::api::{response, PageQuery};
use crate::auth::extractor::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use uuid::Uuid;

pub async fn list_notifications(
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let (notifications, total, unread) = state
        .db
        .list_notifications(user.id, page.limit, page.offset())
        .await?;

    Ok(response::paginated(
        serde_json::json!({ "notifications": notifications, "unread": unread }),
        &page,
        total,
    ))
}

pub async fn mark_read(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let notification = state.db.mark_notification_read(path.into_inner(), user.id).await?;
    Ok(response::ok(notification))
}

pub async fn mark_all_read(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let updated = state.db.mark_all_notifications_read(user.id).await?;
    Ok(response::ok_with_message(
        serde_json::json!({ "updated": updated }),
        "All notifications marked as read",
    ))
}

pub async fn delete_notification(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if !state.db.delete_notification(path.into_inner(), user.id).await? {
        return Err(AppError::NotFound("Notification not found".into()));
    }
    Ok(response::message("Notification deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("/read-all", web::patch().to(mark_all_read))
            .route("/{id}/read", web::patch().to(mark_read))
            .route("/{id}", web::delete().to(delete_notification)),
    );
}
