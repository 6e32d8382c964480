use std::{num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::cms::types::ContentItem;

const POSTS_ENDPOINT: &str = "api/posts";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "postviz/0.1";

type CmsRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Errors emitted by the CMS adapter.
#[derive(Debug, Error)]
pub enum CmsError {
    #[error("invalid CMS base url `{0}`")]
    InvalidBaseUrl(String),
    #[error("CMS request `{context}` failed: {source}")]
    Request {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("CMS returned status {status} for `{context}`")]
    Status {
        context: &'static str,
        status: StatusCode,
    },
}

impl CmsError {
    fn request(context: &'static str, source: reqwest::Error) -> Self {
        CmsError::Request { context, source }
    }
}

/// Read-only access to published content items.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_by_slug(&self, slug: &str) -> Result<Option<ContentItem>, CmsError>;

    async fn list_all(&self) -> Result<Vec<ContentItem>, CmsError>;
}

#[derive(Deserialize)]
struct PostListResponse {
    #[serde(default)]
    items: Vec<ContentItem>,
}

/// REST client for the headless CMS content API.
#[derive(Debug, Clone)]
pub struct RestContentClient {
    base_url: Url,
    http: Client,
    api_token: Option<String>,
    rate_limiter: Arc<CmsRateLimiter>,
    backoff: ExponentialBuilder,
}

impl RestContentClient {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self, CmsError> {
        let parsed =
            Url::parse(base_url).map_err(|_| CmsError::InvalidBaseUrl(base_url.to_string()))?;

        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| CmsError::request("build_client", err))?;

        let quota = Quota::per_second(NonZeroU32::new(4).expect("quota must be non-zero"));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(4)
            .with_jitter();

        Ok(Self {
            base_url: parsed,
            http,
            api_token,
            rate_limiter,
            backoff,
        })
    }

    fn posts_url(&self) -> Result<Url, CmsError> {
        self.base_url
            .join(POSTS_ENDPOINT)
            .map_err(|_| CmsError::InvalidBaseUrl(self.base_url.to_string()))
    }

    async fn fetch_posts(
        &self,
        context: &'static str,
        query: &[(&str, &str)],
    ) -> Result<Vec<ContentItem>, CmsError> {
        let url = self.posts_url()?;

        let attempt = || async {
            self.rate_limiter.until_ready().await;

            let mut request = self.http.get(url.clone()).query(query);
            if let Some(token) = &self.api_token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = request
                .send()
                .await
                .map_err(|err| CmsError::request(context, err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(CmsError::Status { context, status });
            }

            let parsed: PostListResponse = response
                .json()
                .await
                .map_err(|err| CmsError::request(context, err))?;
            Ok(parsed.items)
        };

        let items = attempt
            .retry(self.backoff.clone())
            .when(is_retryable)
            .await?;
        debug!(context, count = items.len(), "fetched content items");
        Ok(items)
    }
}

fn is_retryable(err: &CmsError) -> bool {
    match err {
        CmsError::Request { .. } => true,
        CmsError::Status { status, .. } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        CmsError::InvalidBaseUrl(_) => false,
    }
}

#[async_trait]
impl ContentSource for RestContentClient {
    async fn fetch_by_slug(&self, slug: &str) -> Result<Option<ContentItem>, CmsError> {
        debug_assert!(!slug.is_empty());
        let items = self.fetch_posts("fetch_by_slug", &[("slug", slug)]).await?;
        Ok(items.into_iter().find(|item| item.slug == slug))
    }

    async fn list_all(&self) -> Result<Vec<ContentItem>, CmsError> {
        self.fetch_posts("list_all", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        let err = RestContentClient::new("not a url", None).expect_err("must fail");
        assert!(matches!(err, CmsError::InvalidBaseUrl(_)));
    }

    #[test]
    fn joins_posts_endpoint_onto_base() {
        let client =
            RestContentClient::new("https://cms.example.com/", None).expect("client builds");
        let url = client.posts_url().expect("url joins");
        assert_eq!(url.as_str(), "https://cms.example.com/api/posts");
    }
}
