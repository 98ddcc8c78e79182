use crate::db::models::ROLE_ADMIN;
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use uuid::Uuid;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Reads the access token from the cookie, falling back to a bearer header.
pub fn access_token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Caller identity taken from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Owner-or-admin guard used by the update and delete endpoints.
    pub fn ensure_owner_or_admin(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::Unauthorized.into())
        }
    }

    fn from_http(req: &HttpRequest) -> Result<Self, AppError> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or_else(|| AppError::InternalError("Application state is not configured".into()))?;
        let token = access_token_from_request(req).ok_or(AuthError::MissingToken)?;
        let claims = state.auth.verify_access(&token)?;

        Ok(Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}

/// Same as [`AuthenticatedUser`] but rejects non-admins with 403.
///
/// The token's role claim is only a first filter: the account is reloaded
/// so a demoted or deactivated admin loses access before the token expires.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl AdminUser {
    async fn confirm(state: web::Data<AppState>, claimed: AuthenticatedUser) -> Result<Self, AppError> {
        let user = state
            .db
            .get_user_by_id(claimed.id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }
        if user.role != ROLE_ADMIN {
            return Err(AuthError::Unauthorized.into());
        }
        Ok(AdminUser(AuthenticatedUser {
            id: user.id,
            email: user.email,
            role: user.role,
        }))
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claimed = AuthenticatedUser::from_http(req).and_then(|user| {
            if user.is_admin() {
                Ok(user)
            } else {
                Err(AuthError::Unauthorized.into())
            }
        });
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let claimed = claimed?;
            let state =
                state.ok_or_else(|| AppError::InternalError("Application state is not configured".into()))?;
            Self::confirm(state, claimed).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_COOKIE, "from-cookie"))
            .insert_header(("Authorization", "Bearer from-header"))
            .to_http_request();
        assert_eq!(access_token_from_request(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_header_fallback() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(access_token_from_request(&req).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_http_request();
        assert_eq!(access_token_from_request(&req), None);
    }

    #[test]
    fn test_owner_or_admin() {
        let owner = Uuid::new_v4();
        let user = AuthenticatedUser {
            id: owner,
            email: "a@b.c".into(),
            role: "user".into(),
        };
        assert!(user.ensure_owner_or_admin(owner).is_ok());
        assert!(user.ensure_owner_or_admin(Uuid::new_v4()).is_err());

        let admin = AuthenticatedUser {
            role: "admin".into(),
            ..user
        };
        assert!(admin.ensure_owner_or_admin(Uuid::new_v4()).is_ok());
    }
}
