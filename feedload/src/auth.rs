use crate::model::{AuthHeaders, BearerToken};
use async_trait::async_trait;
use feedload_core::config::RedditConfig;
use feedload_core::{Error, Result};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tracing::{debug, instrument};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange client credentials for request headers carrying a bearer token.
    async fn acquire_token(&self) -> Result<AuthHeaders>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub struct RedditAuth {
    http: reqwest::Client,
    config: RedditConfig,
}

impl RedditAuth {
    pub fn new(http: reqwest::Client, config: RedditConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl TokenProvider for RedditAuth {
    #[instrument(skip(self), fields(endpoint = %self.config.access_url))]
    async fn acquire_token(&self) -> Result<AuthHeaders> {
        let form = [
            ("grant_type", self.config.grant_type.as_str()),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.access_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(USER_AGENT, &self.config.user_agent)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Authentication(format!("unreadable token response: {e}")))?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication("response has no access_token".into()))?;

        debug!("Acquired bearer token");

        Ok(AuthHeaders {
            user_agent: self.config.user_agent.clone(),
            token: BearerToken::new(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> RedditConfig {
        RedditConfig {
            client_id: "client".into(),
            client_secret: "s3cret".into(),
            username: "bot".into(),
            password: "pw".into(),
            access_url: format!("{base}/api/v1/access_token"),
            grant_type: "client_credentials".into(),
            user_agent: "News/0.0.1".into(),
        }
    }

    #[tokio::test]
    async fn exchanges_credentials_for_bearer_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(basic_auth("client", "s3cret"))
            .and(header("user-agent", "News/0.0.1"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("username=bot"))
            .and(body_string_contains("password=pw"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok-1", "token_type": "bearer"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = RedditAuth::new(reqwest::Client::new(), config(&server.uri()));
        let headers = auth.acquire_token().await.unwrap();

        assert_eq!(headers.authorization(), "bearer tok-1");
        assert_eq!(headers.user_agent, "News/0.0.1");
    }

    #[tokio::test]
    async fn rejected_credentials_are_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": 401})))
            .mount(&server)
            .await;

        let auth = RedditAuth::new(reqwest::Client::new(), config(&server.uri()));
        let err = auth.acquire_token().await.unwrap_err();

        assert!(matches!(err, Error::Authentication(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn missing_access_token_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let auth = RedditAuth::new(reqwest::Client::new(), config(&server.uri()));
        let err = auth.acquire_token().await.unwrap_err();

        assert!(matches!(err, Error::Authentication(ref m) if m.contains("access_token")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_authentication_error() {
        // Nothing listens on the discard port.
        let auth = RedditAuth::new(reqwest::Client::new(), config("http://127.0.0.1:9"));
        let err = auth.acquire_token().await.unwrap_err();

        assert_eq!(err.stage(), "auth");
    }
}
