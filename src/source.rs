use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response};
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::{DashboardError, Result};

const MAX_ERROR_MESSAGE_LEN: usize = 500;

#[async_trait]
pub trait AggregateSource: Send + Sync {
    async fn fetch(&self, endpoint: &str, query: &str) -> Result<JsonValue>;
}

#[derive(Debug, Clone)]
pub struct HttpAggregateSource {
    http_client: HttpClient,
    base_url: Url,
    agency: String,
}

impl HttpAggregateSource {
    pub fn new(base_url: &str, agency: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            agency: agency.to_string(),
        })
    }

    pub fn build_url(&self, endpoint: &str, query: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/');
        let merged = format!(
            "{}/api/{}/{}/",
            base_path,
            self.agency,
            endpoint.trim_matches('/')
        );
        url.set_path(&merged);
        url.set_query(if query.is_empty() { None } else { Some(query) });
        url.set_fragment(None);
        url
    }

    async fn check_response(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_ERROR_MESSAGE_LEN)
            .collect::<String>();
        Err(DashboardError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AggregateSource for HttpAggregateSource {
    async fn fetch(&self, endpoint: &str, query: &str) -> Result<JsonValue> {
        let url = self.build_url(endpoint, query);
        log::debug!("source.get url={}", url);
        let response = self.http_client.get(url).send().await?;
        let response = self.check_response(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
