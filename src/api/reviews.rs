use crate::api::{response, PageQuery};
use crate::auth::extractor::AuthenticatedUser;
use crate::error::{AppError, DatabaseError};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

const MAX_COMMENT_LENGTH: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub property_id: Uuid,
    pub rating: i16,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

fn validate_rating(rating: i16) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::ValidationError("Rating must be between 1 and 5".into()));
    }
    Ok(())
}

fn validate_comment(comment: &str) -> Result<&str, AppError> {
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(AppError::ValidationError("Comment is required".into()));
    }
    if comment.chars().count() > MAX_COMMENT_LENGTH {
        return Err(AppError::ValidationError(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(comment)
}

pub async fn create_review(
    user: AuthenticatedUser,
    req: web::Json<CreateReviewRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    validate_rating(req.rating)?;
    let comment = validate_comment(&req.comment)?;
    let property = state.db.require_property(req.property_id).await?;

    if !state.db.has_confirmed_reservation(user.id, property.id).await? {
        return Err(AppError::Forbidden(
            "You can only review properties you have reserved".into(),
        ));
    }
    if state.db.has_reviewed(user.id, property.id).await? {
        return Err(AppError::ValidationError("You have already reviewed this property".into()));
    }

    let review = state
        .db
        .create_review(property.id, user.id, req.rating, comment)
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent submit
            AppError::DatabaseError(DatabaseError::Duplicate) => {
                AppError::ValidationError("You have already reviewed this property".into())
            }
            other => other,
        })?;

    state
        .db
        .create_notification(
            property.owner_id,
            "review",
            "New review",
            &format!("\"{}\" received a {}-star review.", property.title, review.rating),
        )
        .await?;
    state
        .cache
        .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
        .await;

    info!("User {} reviewed property {}", user.id, property.id);
    Ok(response::created(review, "Review added"))
}

pub async fn property_reviews(
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let property = state.db.require_property(path.into_inner()).await?;
    let page = query.page();
    let (reviews, total, average_rating) = state
        .db
        .list_reviews_for_property(property.id, page.limit, page.offset())
        .await?;

    Ok(response::paginated(
        serde_json::json!({
            "reviews": reviews,
            "average_rating": average_rating,
        }),
        &page,
        total,
    ))
}

pub async fn update_review(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<UpdateReviewRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let review = state
        .db
        .get_review(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".into()))?;
    if review.user_id != user.id {
        return Err(AppError::Forbidden("You can only edit your own reviews".into()));
    }

    if let Some(rating) = req.rating {
        validate_rating(rating)?;
    }
    let comment = req.comment.as_deref().map(validate_comment).transpose()?;

    let updated = state.db.update_review(review.id, req.rating, comment).await?;
    state
        .cache
        .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
        .await;
    Ok(response::ok_with_message(updated, "Review updated"))
}

pub async fn delete_review(
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let review = state
        .db
        .get_review(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".into()))?;
    if review.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("You can only delete your own reviews".into()));
    }

    state.db.delete_review(review.id).await?;
    state
        .cache
        .invalidate_prefix(crate::api::properties::LISTING_CACHE_PREFIX)
        .await;

    info!("User {} deleted review {}", user.id, review.id);
    Ok(response::message("Review deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reviews")
            .route("", web::post().to(create_review))
            .route("/property/{id}", web::get().to(property_reviews))
            .route("/{id}", web::put().to(update_review))
            .route("/{id}", web::delete().to(delete_review)),
    );
}
