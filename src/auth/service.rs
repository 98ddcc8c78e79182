use crate::auth::crypto::RefreshTokenCipher;
use crate::auth::google::{GoogleOAuth, GoogleUser};
use crate::auth::tokens::{AccessClaims, TokenKeys};
use crate::config::Settings;
use crate::db::models::User;
use crate::db::operations::DbOperations;
use crate::error::{AppError, AuthError};
use actix_web::web;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Tokens handed back to the client after a successful sign-in.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService {
    db: DbOperations,
    keys: TokenKeys,
    cipher: RefreshTokenCipher,
    bcrypt_cost: u32,
    google: Option<GoogleOAuth>,
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::ValidationError("A valid email is required".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".into()));
    }
    validate_email(email)?;
    validate_password(password)
}

impl AuthService {
    pub fn new(db: DbOperations, settings: &Settings) -> Result<Self, AppError> {
        let google = settings
            .google
            .is_enabled()
            .then(|| GoogleOAuth::new(settings.google.clone()));

        Ok(Self {
            db,
            keys: TokenKeys::new(&settings.auth),
            cipher: RefreshTokenCipher::from_base64_key(&settings.auth.refresh_token_key)?,
            bcrypt_cost: settings.auth.bcrypt_cost,
            google,
        })
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn google(&self) -> Option<&GoogleOAuth> {
        self.google.as_ref()
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hash = web::block(move || bcrypt::hash(password, cost)).await??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let hash = hash.to_string();
        let valid = web::block(move || bcrypt::verify(password, &hash)).await??;
        Ok(valid)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthSession, AppError> {
        validate_registration(name, email, password)?;
        let email = email.trim().to_lowercase();

        if self.db.get_user_by_email(&email).await?.is_some() {
            warn!("Registration rejected, email already in use: {}", email);
            return Err(AppError::ValidationError("User already exists".into()));
        }

        let hash = self.hash_password(password).await?;
        let user = self
            .db
            .create_user(&User::new(name.trim().to_string(), email, Some(hash)))
            .await?;
        info!("Registered user {}", user.id);

        self.issue_session(user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let user = self
            .db
            .get_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // Accounts created through Google have no password to check
        let hash = user.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        if !self.verify_password(password, hash).await? {
            warn!("Failed login for user {}", user.id);
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        info!("User {} logged in", user.id);
        self.issue_session(user).await
    }

    /// Issues both tokens and stores the encrypted refresh token, replacing
    /// whatever session the user had before.
    async fn issue_session(&self, user: User) -> Result<AuthSession, AppError> {
        let access_token = self.keys.issue_access(&user)?;
        let refresh_token = self.keys.issue_refresh(user.id)?;

        let encrypted = self.cipher.encrypt(&refresh_token)?;
        self.db.set_refresh_token(user.id, Some(&encrypted)).await?;

        Ok(AuthSession {
            user,
            access_token,
            refresh_token,
        })
    }

    /// Validates a refresh token against the stored copy and mints a new
    /// access token. The refresh token itself is left in place.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, String), AppError> {
        let claims = self.keys.verify_refresh(refresh_token)?;
        let user = self
            .db
            .get_user_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let stored = user.refresh_token.as_deref().ok_or(AuthError::InvalidToken)?;
        let matches = match self.cipher.decrypt(stored) {
            Ok(decrypted) => decrypted == refresh_token,
            Err(e) => {
                warn!("Stored refresh token for {} could not be decrypted: {}", user.id, e);
                false
            }
        };
        if !matches {
            return Err(AuthError::InvalidToken.into());
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        let access_token = self.keys.issue_access(&user)?;
        Ok((user, access_token))
    }

    /// Revokes the stored refresh token if the presented one identifies a user.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AppError> {
        let Some(token) = refresh_token else {
            return Ok(());
        };
        // An expired or forged token still logs out locally
        if let Ok(claims) = self.keys.verify_refresh(token) {
            self.db.set_refresh_token(claims.sub, None).await?;
            info!("User {} logged out", claims.sub);
        }
        Ok(())
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.keys.verify_access(token)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.db
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        validate_password(new_password)?;
        let user = self.current_user(user_id).await?;

        if let Some(hash) = user.password_hash.as_deref() {
            if !self.verify_password(current_password, hash).await? {
                return Err(AppError::ValidationError("Current password is incorrect".into()));
            }
        }

        let hash = self.hash_password(new_password).await?;
        self.db.update_password_hash(user_id, &hash).await?;
        info!("Password changed for user {}", user_id);
        Ok(())
    }

    pub fn google_authorize_url(&self, state: &str) -> Result<String, AppError> {
        let google = self
            .google
            .as_ref()
            .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".into()))?;
        google.authorize_url(state)
    }

    pub async fn google_login(&self, code: &str) -> Result<AuthSession, AppError> {
        let google = self
            .google
            .as_ref()
            .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".into()))?;

        let access_token = google.exchange_code(code).await?;
        let profile = google.fetch_user(&access_token).await?;
        let user = self.find_or_create_google_user(profile).await?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }
        self.issue_session(user).await
    }

    async fn find_or_create_google_user(&self, profile: GoogleUser) -> Result<User, AppError> {
        if let Some(user) = self.db.get_user_by_google_id(&profile.sub).await? {
            return Ok(user);
        }

        if let Some(existing) = self.db.get_user_by_email(&profile.email).await? {
            info!("Linking Google account to existing user {}", existing.id);
            return self
                .db
                .link_google_account(existing.id, &profile.sub, profile.picture.as_deref())
                .await;
        }

        let name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| profile.email.split('@').next().unwrap_or_default().to_string());
        let mut user = User::new(name, profile.email.to_lowercase(), None);
        user.google_id = Some(profile.sub);
        user.avatar = profile.picture;

        let user = self.db.create_user(&user).await?;
        info!("Created user {} from Google sign-in", user.id);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_validation() {
        assert!(validate_registration("Jane", "jane@example.com", "secret1").is_ok());
        assert!(validate_registration("  ", "jane@example.com", "secret1").is_err());
        assert!(validate_registration("Jane", "jane.example.com", "secret1").is_err());
        assert!(validate_registration("Jane", "jane@example.com", "short").is_err());
    }

    #[actix_web::test]
    async fn test_password_hashing() {
        let settings = Settings::new_for_test().unwrap();
        let db = DbOperations::new_lazy(&settings.database.url, 1).unwrap();
        let service = AuthService::new(db, &settings).unwrap();

        let hash = service.hash_password("secret1").await.unwrap();
        assert!(service.verify_password("secret1", &hash).await.unwrap());
        assert!(!service.verify_password("secret2", &hash).await.unwrap());
    }

    #[actix_web::test]
    async fn test_google_disabled_without_client_id() {
        let settings = Settings::new_for_test().unwrap();
        let db = DbOperations::new_lazy(&settings.database.url, 1).unwrap();
        let service = AuthService::new(db, &settings).unwrap();

        assert!(service.google().is_none());
        assert!(matches!(
            service.google_authorize_url("state"),
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn test_logout_without_cookie_is_noop() {
        let settings = Settings::new_for_test().unwrap();
        let db = DbOperations::new_lazy(&settings.database.url, 1).unwrap();
        let service = AuthService::new(db, &settings).unwrap();

        assert!(service.logout(None).await.is_ok());
        // Unverifiable token never reaches the database
        assert!(service.logout(Some("garbage")).await.is_ok());
    }
}
