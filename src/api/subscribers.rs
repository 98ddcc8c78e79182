use crate::api::{response, PageQuery};
use crate::auth::extractor::AdminUser;
use crate::auth::service::validate_email;
use crate::error::AppError;
use crate::mailer;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    validate_email(&email)?;
    Ok(email)
}

pub async fn subscribe(req: web::Json<SubscribeRequest>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let email = normalize_email(&req.email)?;
    if state.db.get_subscriber(&email).await?.is_some() {
        return Err(AppError::ValidationError("Email is already subscribed".into()));
    }

    let subscriber = state
        .db
        .create_subscriber(&email)
        .await
        .map_err(crate::api::categories::map_duplicate("Email is already subscribed"))?;
    mailer::send_in_background(state.mailer.clone(), mailer::welcome_email(&subscriber.email));

    info!("New subscriber {}", subscriber.email);
    Ok(response::created(subscriber, "Subscribed successfully"))
}

pub async fn unsubscribe(req: web::Json<SubscribeRequest>, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let email = normalize_email(&req.email)?;
    if !state.db.delete_subscriber(&email).await? {
        return Err(AppError::NotFound("Subscriber not found".into()));
    }
    Ok(response::message("Unsubscribed successfully"))
}

pub async fn list_subscribers(
    _admin: AdminUser,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let page = query.page();
    let (subscribers, total) = state.db.list_subscribers(page.limit, page.offset()).await?;
    Ok(response::paginated(subscribers, &page, total))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscribers")
            .route("", web::post().to(subscribe))
            .route("", web::delete().to(unsubscribe))
            .route("", web::get().to(list_subscribers)),
    );
}
