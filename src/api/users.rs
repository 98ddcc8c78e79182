use crate::api::response;
use crate::auth::extractor::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn get_profile(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.auth.current_user(user.id).await?))
}

pub async fn update_profile(
    user: AuthenticatedUser,
    req: web::Json<UpdateProfileRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let name = req.name.as_deref().map(str::trim);
    if name.map_or(false, str::is_empty) {
        return Err(AppError::ValidationError("Name cannot be empty".into()));
    }

    let updated = state
        .db
        .update_user_profile(
            user.id,
            name,
            req.phone.as_deref().map(str::trim),
            req.avatar.as_deref().map(str::trim),
        )
        .await?;

    info!("User {} updated their profile", user.id);
    Ok(response::ok_with_message(updated, "Profile updated"))
}

pub async fn change_password(
    user: AuthenticatedUser,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth
        .change_password(user.id, &req.current_password, &req.new_password)
        .await?;
    Ok(response::message("Password updated"))
}

pub async fn toggle_wishlist(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(path.into_inner()).await?;
    let in_wishlist = state.db.toggle_wishlist(user.id, property.id).await?;

    let message = if in_wishlist { "Added to wishlist" } else { "Removed from wishlist" };
    Ok(response::ok_with_message(
        serde_json::json!({ "property_id": property.id, "in_wishlist": in_wishlist }),
        message,
    ))
}

pub async fn list_wishlist(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.list_wishlist(user.id).await?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/profile", web::get().to(get_profile))
            .route("/profile", web::put().to(update_profile))
            .route("/password", web::put().to(change_password))
            .route("/wishlist", web::get().to(list_wishlist))
            .route("/wishlist/{property_id}", web::post().to(toggle_wishlist)),
    );
}
