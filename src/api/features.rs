use crate::api::categories::map_duplicate;
use crate::api::{non_blank, response};
use crate::auth::extractor::AdminUser;
use crate::error::AppError;
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub name: Option<String>,
    pub icon: Option<String>,
}

pub async fn list_features(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(state.db.list_features().await?))
}

pub async fn create_feature(
    admin: AdminUser,
    req: web::Json<FeatureRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let name = non_blank(req.name.as_deref())
        .ok_or_else(|| AppError::ValidationError("Feature name is required".into()))?;

    let feature = state
        .db
        .create_feature(name, non_blank(req.icon.as_deref()))
        .await
        .map_err(map_duplicate("Feature already exists"))?;

    info!("Admin {} created feature {}", admin.0.id, feature.name);
    Ok(response::created(feature, "Feature created"))
}

pub async fn update_feature(
    _admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<FeatureRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
        return Err(AppError::ValidationError("Feature name cannot be empty".into()));
    }

    let feature = state
        .db
        .update_feature(path.into_inner(), non_blank(req.name.as_deref()), req.icon.as_deref())
        .await
        .map_err(map_duplicate("Feature already exists"))?;
    Ok(response::ok_with_message(feature, "Feature updated"))
}

pub async fn delete_feature(
    _admin: AdminUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if !state.db.delete_feature(path.into_inner()).await? {
        return Err(AppError::NotFound("Feature not found".into()));
    }
    Ok(response::message("Feature deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/features")
            .route("", web::get().to(list_features))
            .route("", web::post().to(create_feature))
            .route("/{id}", web::put().to(update_feature))
            .route("/{id}", web::delete().to(delete_feature)),
    );
}
