use async_trait::async_trait;
use reqwest::Client as HttpClient;
use url::Url;

use crate::error::{Result, StoreError};

use super::receipt::VerifyReceiptRequest;

/// Raw response from the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Delivers a validation request to the server.
#[async_trait]
pub trait ReceiptTransport: Send + Sync {
    async fn post_json(&self, url: &Url, body: &VerifyReceiptRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(concat!("storekeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::network(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReceiptTransport for HttpTransport {
    async fn post_json(&self, url: &Url, body: &VerifyReceiptRequest) -> Result<TransportResponse> {
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::network(e.to_string()))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}
