//! Podio REST client.
//!
//! Authenticates with the OAuth2 password grant and reads applications,
//! spaces and items with the resulting bearer token.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::Credentials;
use crate::error::{Error, Result};

use super::classify::TransportError;
use super::source::{Connector, RemoteResult, RemoteSource};
use super::types::{ItemPage, ItemQuery, RemoteApplication, RemoteSpace};

/// Podio API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://api.podio.com";

const RATE_LIMIT_HEADER: &str = "x-rate-limit-remaining";

/// Authenticates against Podio and hands out [`PodioClient`]s.
pub struct PodioConnector {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl PodioConnector {
    /// Create a connector with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend init).
    pub fn new(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("podio-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl Connector for PodioConnector {
    type Source = PodioClient;

    async fn connect(&self) -> RemoteResult<PodioClient> {
        let url = format!("{}/oauth/token/v2", self.endpoint);
        let form = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];

        let response = self.http.post(&url).form(&form).send().await?;
        let token: TokenResponse = decode(response).await?;
        debug!(expires_in = ?token.expires_in, "Obtained Podio access token");

        Ok(PodioClient {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            token: token.access_token,
        })
    }
}

/// Authenticated Podio API session.
pub struct PodioClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl PodioClient {
    async fn get<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        let url = format!("{}{path}", self.endpoint);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        decode(response).await
    }
}

impl RemoteSource for PodioClient {
    async fn get_application(&self, app_id: i64) -> RemoteResult<RemoteApplication> {
        self.get(&format!("/app/{app_id}")).await
    }

    async fn get_space(&self, space_id: i64) -> RemoteResult<RemoteSpace> {
        self.get(&format!("/space/{space_id}")).await
    }

    async fn count_items(&self, app_id: i64) -> RemoteResult<u64> {
        let count: CountResponse = self.get(&format!("/item/app/{app_id}/count")).await?;
        Ok(count.count)
    }

    async fn filter_items(&self, app_id: i64, query: &ItemQuery) -> RemoteResult<ItemPage> {
        let url = format!("{}/item/app/{app_id}/filter/", self.endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(query)
            .send()
            .await?;
        decode(response).await
    }
}

/// Turn a response into `T`, or into a `TransportError` carrying the status,
/// the quota header and the body.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> RemoteResult<T> {
    let status = response.status();
    if !status.is_success() {
        let remaining = response
            .headers()
            .get(RATE_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::http(status.as_u16(), remaining.as_deref(), &body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| TransportError::client(&format!("Failed to parse Podio response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_connector_trims_endpoint() {
        let connector =
            PodioConnector::new("https://api.podio.com/", credentials(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(connector.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_token_response_decodes() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"bearer","expires_in":28800,"refresh_token":"def"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, Some(28800));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        let connector =
            PodioConnector::new("http://127.0.0.1:9", credentials(), Duration::from_secs(2))
                .unwrap();
        let err = connector.connect().await.err().unwrap();
        assert!(err.status.is_none());
        assert!(!err.body.is_empty());
    }
}
