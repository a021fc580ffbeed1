//! HTTP collaborator adapters: the CRM REST API and the document server's
//! command service.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::collaborators::{
    CollaboratorError, CollaboratorResult, CrmApi, CrmCredentials, CrmProfile, DocumentServer,
};
use crate::signing::TokenSigner;

/// CRM responses wrap their payload in `data`.
#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    data: Option<T>,
}

fn default_success() -> bool {
    true
}

fn join_url(base: &str, path: &str) -> CollaboratorResult<Url> {
    let full = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&full).map_err(|e| CollaboratorError::Unavailable(format!("invalid URL: {}", e)))
}

fn status_error(status: StatusCode, action: &str) -> CollaboratorError {
    match status {
        StatusCode::NOT_FOUND => CollaboratorError::NotFound,
        _ => CollaboratorError::Status {
            code: status.as_u16(),
            message: format!("{} returned {}", action, status),
        },
    }
}

/// CRM REST API over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpCrmApi {
    client: reqwest::Client,
}

impl HttpCrmApi {
    pub fn new(timeout: Duration) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        credentials: &CrmCredentials,
        path: &str,
        action: &str,
    ) -> CollaboratorResult<T> {
        let url = join_url(&credentials.api_domain, path)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), action));
        }

        let envelope = response.json::<Envelope<T>>().await?;
        match envelope {
            Envelope {
                success: true,
                data: Some(data),
            } => Ok(data),
            _ => Err(CollaboratorError::Status {
                code: 500,
                message: format!("{} returned no data", action),
            }),
        }
    }
}

#[async_trait]
impl CrmApi for HttpCrmApi {
    async fn get_user_profile(&self, credentials: &CrmCredentials) -> CollaboratorResult<CrmProfile> {
        self.get_data(credentials, "api/v1/users/me", "get me").await
    }

    async fn get_deal(
        &self,
        credentials: &CrmCredentials,
        deal_id: &str,
    ) -> CollaboratorResult<serde_json::Value> {
        let deal_id = deal_id.trim();
        if deal_id.is_empty() || !deal_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CollaboratorError::NotFound);
        }
        self.get_data(credentials, &format!("api/v2/deals/{}", deal_id), "get deal")
            .await
    }
}

#[derive(Serialize)]
struct LicenseCommand<'a> {
    c: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[derive(Deserialize)]
struct CommandResponse {
    error: i64,
}

/// Document server command service client.
#[derive(Debug, Clone)]
pub struct HttpDocumentServer {
    client: reqwest::Client,
    signer: TokenSigner,
}

impl HttpDocumentServer {
    pub fn new(timeout: Duration) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            signer: TokenSigner::new(),
        })
    }
}

#[async_trait]
impl DocumentServer for HttpDocumentServer {
    async fn validate_credentials(
        &self,
        address: &str,
        secret: &str,
        header: &str,
    ) -> CollaboratorResult<()> {
        let url = join_url(address, "coauthoring/CommandService.ashx")?;
        let token = self
            .signer
            .sign(secret, &LicenseCommand { c: "license", token: None }, Duration::from_secs(60))
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        let mut request = self.client.post(url).json(&LicenseCommand {
            c: "license",
            token: Some(token.clone()),
        });
        if !header.trim().is_empty() {
            request = request.header(header.trim(), format!("Bearer {}", token));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), "license command"));
        }

        let body = response.json::<CommandResponse>().await?;
        if body.error != 0 {
            return Err(CollaboratorError::Status {
                code: 403,
                message: format!("document server rejected credentials (error {})", body.error),
            });
        }
        Ok(())
    }
}
