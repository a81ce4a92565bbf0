//! Workload identity exchange — trades the runtime's workload access token for
//! an OAuth2 token held by a named credential provider.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ensure_verified_transport, ExchangeFuture, OAuthFlow, TokenExchange, TokenRequest};
use crate::error::AppError;

/// POSTs to `{endpoint}/identities/oauth2/token`.
#[derive(Debug, Clone)]
pub struct WorkloadExchange {
    client: Client,
    token_url: reqwest::Url,
}

impl WorkloadExchange {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        let base = endpoint.trim_end_matches('/');
        let token_url = ensure_verified_transport(&format!("{base}/identities/oauth2/token"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, token_url })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeBody<'a> {
    workload_identity_token: &'a str,
    resource_credential_provider_name: &'a str,
    scopes: &'a [String],
    #[serde(rename = "oauth2Flow")]
    oauth2_flow: OAuthFlow,
    force_authentication: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
    access_token: Option<String>,
}

impl TokenExchange for WorkloadExchange {
    fn exchange<'a>(&'a self, request: &'a TokenRequest) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let workload = request
                .workload_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Auth("no workload identity token for this session".into()))?;

            let body = ExchangeBody {
                workload_identity_token: workload,
                resource_credential_provider_name: &request.provider_name,
                scopes: &request.scopes,
                oauth2_flow: request.flow,
                force_authentication: request.force,
            };

            debug!(provider = %request.provider_name, url = %self.token_url, "exchanging workload token");
            let response = self
                .client
                .post(self.token_url.clone())
                .json(&body)
                .send()
                .await
                .map_err(|e| AppError::Auth(format!("identity service unreachable: {e}")))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(AppError::Config(format!(
                    "credential provider '{}' not found",
                    request.provider_name
                )));
            }
            if !status.is_success() {
                return Err(AppError::Auth(format!("token exchange returned HTTP {status}")));
            }

            let parsed: ExchangeResponse = response
                .json()
                .await
                .map_err(|e| AppError::Auth(format!("malformed token response: {e}")))?;
            parsed
                .access_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Auth("token response carried no accessToken".into()))
        })
    }
}
