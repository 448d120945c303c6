use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GatewayError, Result};

/// Status and body of one HTTP exchange with the provider.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json_value(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(GatewayError::from)
    }
}

/// Network seam between the job engine and the queue provider. `Err` means the
/// exchange never produced an HTTP status; any status at all is an `Ok` reply.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// `POST` a JSON job payload to a submit endpoint.
    async fn submit(&self, url: &str, payload: &Value) -> Result<RawReply>;

    /// Authenticated `GET` against a status or result endpoint.
    async fn fetch(&self, url: &str) -> Result<RawReply>;

    /// Unauthenticated `GET` of a generated asset.
    async fn download(&self, url: &str) -> Result<RawReply>;
}

pub struct HttpQueueTransport {
    client: Client,
    api_key: String,
}

impl HttpQueueTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Key {}", self.api_key))
            .map_err(|e| GatewayError::Config(format!("Invalid FAL_API_KEY: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn into_raw(response: reqwest::Response) -> Result<RawReply> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RawReply::new(status, body.to_vec()))
    }
}

#[async_trait]
impl QueueTransport for HttpQueueTransport {
    async fn submit(&self, url: &str, payload: &Value) -> Result<RawReply> {
        let response = self
            .client
            .post(url)
            .headers(self.build_headers()?)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;
        Self::into_raw(response).await
    }

    async fn fetch(&self, url: &str) -> Result<RawReply> {
        let response = self
            .client
            .get(url)
            .headers(self.build_headers()?)
            .send()
            .await?;
        Self::into_raw(response).await
    }

    async fn download(&self, url: &str) -> Result<RawReply> {
        let response = self.client.get(url).send().await?;
        Self::into_raw(response).await
    }
}
