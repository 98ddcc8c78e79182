use crate::api::response;
use crate::auth::extractor::{AuthenticatedUser, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::auth::service::AuthSession;
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{http::header, web, HttpRequest, HttpResponse, HttpResponseBuilder};
use rand::distributions::{Alphanumeric, DistString};
use serde::Deserialize;
use tracing::{error, info, warn};

const OAUTH_STATE_COOKIE: &str = "oauthState";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn build_cookie(name: &'static str, value: String, max_age_secs: i64, production: bool) -> Cookie<'static> {
    // Cross-site frontends need SameSite=None, which browsers only accept with Secure
    let same_site = if production { SameSite::None } else { SameSite::Lax };
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(production)
        .same_site(same_site)
        .max_age(CookieDuration::seconds(max_age_secs))
        .finish()
}

fn removal_cookie(name: &'static str, production: bool) -> Cookie<'static> {
    let mut cookie = build_cookie(name, String::new(), 0, production);
    cookie.make_removal();
    cookie
}

fn set_session_cookies(builder: &mut HttpResponseBuilder, state: &AppState, session: &AuthSession) {
    let production = state.config.is_production();
    let keys = state.auth.keys();
    builder
        .cookie(build_cookie(
            ACCESS_COOKIE,
            session.access_token.clone(),
            keys.access_ttl().num_seconds(),
            production,
        ))
        .cookie(build_cookie(
            REFRESH_COOKIE,
            session.refresh_token.clone(),
            keys.refresh_ttl().num_seconds(),
            production,
        ));
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);
    let session = match state.auth.register(&req.name, &req.email, &req.password).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Registration failed for email: {}: {}", req.email, e);
            return Err(e);
        }
    };

    let mut builder = HttpResponse::Created();
    set_session_cookies(&mut builder, &state, &session);
    Ok(builder.json(response::ApiResponse::with_message(&session.user, "Registration successful")))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    let session = match state.auth.login(&req.email, &req.password).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Login failed for email: {}: {}", req.email, e);
            return Err(e);
        }
    };

    let mut builder = HttpResponse::Ok();
    set_session_cookies(&mut builder, &state, &session);
    Ok(builder.json(response::ApiResponse::with_message(&session.user, "Login successful")))
}

pub async fn refresh(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let (user, access_token) = state.auth.refresh(&token).await?;
    info!("Access token refreshed for user {}", user.id);

    Ok(HttpResponse::Ok()
        .cookie(build_cookie(
            ACCESS_COOKIE,
            access_token,
            state.auth.keys().access_ttl().num_seconds(),
            state.config.is_production(),
        ))
        .json(response::ApiResponse::with_message(&user, "Token refreshed")))
}

pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let token = req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string());
    if let Err(e) = state.auth.logout(token.as_deref()).await {
        // Cookies are cleared regardless
        error!("Failed to revoke refresh token: {}", e);
    }

    let production = state.config.is_production();
    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_COOKIE, production))
        .cookie(removal_cookie(REFRESH_COOKIE, production))
        .json(response::ApiResponse::<()> {
            success: true,
            data: None,
            message: Some("Logged out".into()),
            pagination: None,
        }))
}

pub async fn me(user: AuthenticatedUser, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let user = state.auth.current_user(user.id).await?;
    Ok(response::ok(user))
}

pub async fn google_login(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let oauth_state = Alphanumeric.sample_string(&mut rand::thread_rng(), 32);
    let url = state.auth.google_authorize_url(&oauth_state)?;

    Ok(HttpResponse::Found()
        .cookie(build_cookie(
            OAUTH_STATE_COOKIE,
            oauth_state,
            600,
            state.config.is_production(),
        ))
        .insert_header((header::LOCATION, url))
        .finish())
}

pub async fn google_callback(
    req: HttpRequest,
    query: web::Query<GoogleCallbackQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if let Some(err) = &query.error {
        warn!("Google sign-in was declined: {}", err);
        return Err(AppError::ValidationError("Google sign-in was cancelled".into()));
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::ValidationError("Missing authorization code".into()))?;

    let expected = req.cookie(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    if expected.is_none() || expected != query.state {
        warn!("Google callback state mismatch");
        return Err(AuthError::InvalidToken.into());
    }

    let session = state.auth.google_login(code).await?;
    info!("Google sign-in for user {}", session.user.id);

    let mut builder = HttpResponse::Found();
    set_session_cookies(&mut builder, &state, &session);
    Ok(builder
        .cookie(removal_cookie(OAUTH_STATE_COOKIE, state.config.is_production()))
        .insert_header((header::LOCATION, state.config.server.frontend_url.clone()))
        .finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/logout", web::post().to(logout))
            .route("/me", web::get().to(me))
            .route("/google", web::get().to(google_login))
            .route("/google/callback", web::get().to(google_callback)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = build_cookie(ACCESS_COOKIE, "abc".into(), 900, false);
        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(900)));
        assert_ne!(cookie.secure(), Some(true));

        let cookie = build_cookie(REFRESH_COOKIE, "abc".into(), 900, true);
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_removal_cookie_expires() {
        let cookie = removal_cookie(ACCESS_COOKIE, false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }
}
