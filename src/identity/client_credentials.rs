//! OAuth2 `client_credentials` exchange, used where no workload identity exists (the CLI).
//!
//! The token URL for each credential provider lives in the parameter store
//! under `/{provider}/token-url`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ensure_verified_transport, ExchangeFuture, TokenExchange, TokenRequest};
use crate::config::OAuthClient;
use crate::error::AppError;
use crate::params::ParameterStore;

pub fn token_url_param(provider: &str) -> String {
    format!("/{}/token-url", provider.trim_matches('/'))
}

pub struct ClientCredentialsExchange {
    client: Client,
    credentials: OAuthClient,
    params: Arc<dyn ParameterStore>,
}

impl ClientCredentialsExchange {
    pub fn new(
        credentials: OAuthClient,
        params: Arc<dyn ParameterStore>,
        timeout_seconds: u64,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, credentials, params })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl TokenExchange for ClientCredentialsExchange {
    fn exchange<'a>(&'a self, request: &'a TokenRequest) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let url = self.params.get(&token_url_param(&request.provider_name))?;
            let url = ensure_verified_transport(&url)?;

            let scope = request.scopes.join(" ");
            let mut form = vec![("grant_type", "client_credentials")];
            if !scope.is_empty() {
                form.push(("scope", scope.as_str()));
            }

            debug!(provider = %request.provider_name, "requesting client_credentials token");
            let response = self
                .client
                .post(url)
                .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
                .form(&form)
                .send()
                .await
                .map_err(|e| AppError::Auth(format!("token endpoint unreachable: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Auth(format!("token endpoint returned HTTP {status}")));
            }
            let parsed: TokenResponse = response
                .json()
                .await
                .map_err(|e| AppError::Auth(format!("malformed token response: {e}")))?;
            parsed
                .access_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Auth("token response carried no access_token".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OAuthFlow;
    use crate::params::JsonFileParams;

    #[test]
    fn token_url_param_shape() {
        assert_eq!(token_url_param("monitor-provider"), "/monitor-provider/token-url");
        assert_eq!(token_url_param("/p/"), "/p/token-url");
    }

    #[tokio::test]
    async fn missing_token_url_is_config_error() {
        let params: Arc<dyn ParameterStore> = Arc::new(JsonFileParams::in_memory());
        let ex = ClientCredentialsExchange::new(
            OAuthClient { client_id: "id".into(), client_secret: "secret".into() },
            params,
            1,
        )
        .unwrap();
        let req = TokenRequest {
            provider_name: "monitor-provider".into(),
            scopes: vec![],
            flow: OAuthFlow::M2m,
            force: false,
            workload_token: None,
        };
        assert!(matches!(ex.exchange(&req).await, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn plain_http_token_url_refused() {
        let store = JsonFileParams::in_memory();
        store.put("/p/token-url", "http://auth.example.com/token", false).unwrap();
        let params: Arc<dyn ParameterStore> = Arc::new(store);
        let ex = ClientCredentialsExchange::new(
            OAuthClient { client_id: "id".into(), client_secret: "secret".into() },
            params,
            1,
        )
        .unwrap();
        let req = TokenRequest {
            provider_name: "p".into(),
            scopes: vec!["s".into()],
            flow: OAuthFlow::M2m,
            force: false,
            workload_token: None,
        };
        let err = ex.exchange(&req).await.unwrap_err();
        assert!(err.to_string().contains("TLS"));
    }
}
