use crate::config::ApiConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::error::{message_from_body, ApiError};
use super::filters::ListFilters;
use super::resource::Resource;
use super::types::EntityId;

/// HTTP client for the rental API.
///
/// Cheap to clone; every clone shares the same connection pool.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  list_timeout: Duration,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .user_agent(concat!("rentdash/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      base: api_root(&config.base_url)?,
      list_timeout: Duration::from_secs(config.list_timeout_secs),
    })
  }

  /// Override the timeout applied to list and search queries.
  pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
    self.list_timeout = timeout;
    self
  }

  pub fn list_timeout(&self) -> Duration {
    self.list_timeout
  }

  /// Root of the versioned API, always ending in `/api/v1/`.
  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Fetch one page of a collection.
  pub async fn list<R: Resource>(
    &self,
    skip: usize,
    limit: usize,
    filters: &R::Filters,
  ) -> Result<Vec<R>, ApiError> {
    let mut query = vec![("skip", skip.to_string()), ("limit", limit.to_string())];
    query.extend(filters.query_pairs());

    let request = self
      .http
      .get(self.base.join(R::PATH)?)
      .query(&query)
      .timeout(self.list_timeout);

    self.send_json(request).await
  }

  /// Free-text search over a collection.
  pub async fn search<R: Resource>(
    &self,
    term: &str,
    skip: usize,
    limit: usize,
  ) -> Result<Vec<R>, ApiError> {
    let query = [
      ("q", term.to_string()),
      ("skip", skip.to_string()),
      ("limit", limit.to_string()),
    ];

    let request = self
      .http
      .get(self.base.join(&format!("{}/search", R::PATH))?)
      .query(&query)
      .timeout(self.list_timeout);

    self.send_json(request).await
  }

  pub async fn get<R: Resource>(&self, id: EntityId) -> Result<R, ApiError> {
    let request = self.http.get(self.entity_url::<R>(id)?);
    self.send_json(request).await
  }

  pub async fn create<R: Resource>(&self, payload: &R::Create) -> Result<R, ApiError> {
    let request = self.http.post(self.base.join(R::PATH)?).json(payload);
    self.send_json(request).await
  }

  pub async fn update<R: Resource>(
    &self,
    id: EntityId,
    payload: &R::Update,
  ) -> Result<R, ApiError> {
    let request = self.http.put(self.entity_url::<R>(id)?).json(payload);
    self.send_json(request).await
  }

  pub async fn delete<R: Resource>(&self, id: EntityId) -> Result<(), ApiError> {
    let request = self.http.delete(self.entity_url::<R>(id)?);
    self.execute(request).await?;
    Ok(())
  }

  fn entity_url<R: Resource>(&self, id: EntityId) -> Result<Url, ApiError> {
    Ok(self.base.join(&format!("{}/{}", R::PATH, id))?)
  }

  /// Send a request, logging both directions and mapping error statuses.
  async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
    let request = request.build()?;
    let method = request.method().clone();
    let url = request.url().clone();

    debug!(%method, %url, "api request");
    let started = Instant::now();

    let response = self.http.execute(request).await.map_err(|e| {
      warn!(%method, %url, error = %e, "api request failed");
      ApiError::from(e)
    })?;

    let status = response.status();
    debug!(
      %method,
      %url,
      status = status.as_u16(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "api response"
    );

    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = message_from_body(&body);
    warn!(%method, %url, status = status.as_u16(), %message, "api error response");

    Err(ApiError::Status {
      status: status.as_u16(),
      message,
    })
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
    let response = self.execute(request).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
  }
}

/// Build the `/api/v1/` root from a configured base URL.
fn api_root(base_url: &str) -> Result<Url, ApiError> {
  let trimmed = base_url.trim().trim_end_matches('/');
  let root = if trimmed.ends_with("/api/v1") {
    format!("{}/", trimmed)
  } else {
    format!("{}/api/v1/", trimmed)
  };
  Ok(Url::parse(&root)?)
}
