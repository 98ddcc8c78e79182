use crate::config::GoogleConfig;
use crate::error::AppError;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    /// Stable Google account id.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authorization-code flow against Google's OAuth endpoints.
pub struct GoogleOAuth {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Google auth url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("access_type", "online")
            .append_pair("prompt", "select_account")
            .append_pair("state", state);
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let res = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AppError::External(format!(
                "Google token exchange failed with status {}",
                res.status()
            )));
        }

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| AppError::External(format!("Invalid token response: {}", e)))?;
        Ok(token.access_token)
    }

    pub async fn fetch_user(&self, access_token: &str) -> Result<GoogleUser, AppError> {
        let res = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AppError::External(format!(
                "Google userinfo failed with status {}",
                res.status()
            )));
        }

        let user: GoogleUser = res
            .json()
            .await
            .map_err(|e| AppError::External(format!("Invalid userinfo response: {}", e)))?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> GoogleConfig {
        GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret-456".into(),
            redirect_uri: "http://localhost:5000/api/auth/google/callback".into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/userinfo", base),
        }
    }

    #[test]
    fn test_authorize_url() {
        let oauth = GoogleOAuth::new(config("http://unused"));
        let url = oauth.authorize_url("xyz").unwrap();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("scope=openid+email+profile"));
    }

    #[tokio::test]
    async fn test_code_exchange_and_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "1098",
                "email": "jane@gmail.com",
                "name": "Jane",
                "picture": "https://example.com/p.png"
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::new(config(&server.uri()));
        let token = oauth.exchange_code("abc").await.unwrap();
        let user = oauth.fetch_user(&token).await.unwrap();

        assert_eq!(user.sub, "1098");
        assert_eq!(user.email, "jane@gmail.com");
        assert_eq!(user.name.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn test_rejected_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::new(config(&server.uri()));
        let err = oauth.exchange_code("bad").await.unwrap_err();
        assert!(matches!(err, AppError::External(_)));
    }
}
