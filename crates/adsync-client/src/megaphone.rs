use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use adsync_core::config::{HttpConfig, RateLimitConfig};
use adsync_core::error::AppError;
use adsync_core::remote::CampaignPayload;
use adsync_core::traits::{RemoteCatalog, RemoteMutator};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::pagination::next_page;
use crate::rate_limit::RateLimiter;

/// HTTP client for the Megaphone ad-ops API.
///
/// Every request is scoped to one organization and shares one
/// [`RateLimiter`]. Listings follow `Link: rel="next"` pagination and are
/// returned as raw records so that callers can decode them one at a time.
///
/// # Examples
///
/// ```no_run
/// use adsync_client::MegaphoneClient;
/// use adsync_core::config::{HttpConfig, RateLimitConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = MegaphoneClient::new(
///     "https://cms.megaphone.fm/api",
///     "org-id",
///     "secret-token",
///     &HttpConfig::default(),
///     &RateLimitConfig::default(),
/// )?;
/// let campaigns = client.fetch_campaigns().await?;
/// println!("Found {} campaigns", campaigns.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MegaphoneClient {
    client: Client,
    /// `{base}/organizations/{org}/`
    org_url: Url,
    http: HttpConfig,
    limiter: Arc<RateLimiter>,
}

impl MegaphoneClient {
    /// Creates a client for one organization.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the base URL or organization id do
    /// not form a valid URL, `AppError::Config` if the token cannot be sent
    /// as a header, and `AppError::ClientError` if the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        organization_id: &str,
        api_token: &str,
        http: &HttpConfig,
        rate_limit: &RateLimitConfig,
    ) -> Result<Self, AppError> {
        let org_url = organization_url(base_url, organization_id)?;

        let mut auth = HeaderValue::from_str(&format!("Token token=\"{}\"", api_token))
            .map_err(|_| AppError::Config("MEGAPHONE_API_TOKEN is not a valid header value".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent("adsync/0.1 (megaphone-mirror)")
            .default_headers(headers)
            .timeout(http.timeout())
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            org_url,
            http: http.clone(),
            limiter: Arc::new(RateLimiter::from_config(rate_limit)),
        })
    }

    /// Every advertiser of the organization, across all pages.
    pub async fn fetch_advertisers(&self) -> Result<Vec<Value>, AppError> {
        self.fetch_all("advertisers").await
    }

    /// Every campaign of the organization, across all pages.
    pub async fn fetch_campaigns(&self) -> Result<Vec<Value>, AppError> {
        self.fetch_all("campaigns").await
    }

    /// Creates a campaign. `title` and `advertiserId` are required; a payload
    /// without them is rejected before any request is made.
    pub async fn post_campaign(&self, payload: &CampaignPayload) -> Result<Value, AppError> {
        let payload = payload.clone().validated_for_create()?;
        let url = self.endpoint("campaigns")?;
        let resp = self.send(Method::POST, &url, Some(&payload)).await?;
        read_json(resp).await
    }

    pub async fn put_campaign(
        &self,
        campaign_id: &str,
        payload: &CampaignPayload,
    ) -> Result<Value, AppError> {
        let url = self.campaign_url(campaign_id)?;
        let resp = self.send(Method::PUT, &url, Some(payload)).await?;
        read_json(resp).await
    }

    pub async fn fetch_campaign(&self, campaign_id: &str) -> Result<Value, AppError> {
        let url = self.campaign_url(campaign_id)?;
        let resp = self.send(Method::GET, &url, None).await?;
        read_json(resp).await
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Value>, AppError> {
        let mut url = self.endpoint(collection)?;
        url.query_pairs_mut()
            .append_pair("per_page", &self.http.page_size.to_string());

        let mut records = Vec::new();
        let mut pages = 0usize;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(url.clone()) {
                return Err(AppError::ClientError(format!(
                    "Pagination of {} loops back to {}",
                    collection, url
                )));
            }
            let resp = self.send(Method::GET, &url, None).await?;
            let next = next_page(resp.headers());
            pages += 1;

            match read_json(resp).await? {
                Value::Array(items) => records.extend(items),
                other => {
                    return Err(AppError::ClientError(format!(
                        "Expected a JSON array from {}, got {}",
                        url,
                        json_kind(&other)
                    )));
                }
            }

            match next {
                Some(next) => {
                    url = self
                        .org_url
                        .join(&next)
                        .map_err(|e| AppError::InvalidUrl(format!("{}: {}", next, e)))?;
                }
                None => break,
            }
        }

        info!(collection, pages, count = records.len(), "Fetched Megaphone listing");
        Ok(records)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.org_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    fn campaign_url(&self, campaign_id: &str) -> Result<Url, AppError> {
        let mut url = self.endpoint("campaigns")?;
        url.path_segments_mut()
            .map_err(|_| AppError::InvalidUrl(self.org_url.to_string()))?
            .push(campaign_id);
        Ok(url)
    }

    /// Sends one request, taking a rate-limit slot per attempt.
    ///
    /// GET requests are retried with backoff on:
    /// - Network errors and timeouts
    /// - Server errors (5xx)
    /// - Rate limiting (429)
    ///
    /// Writes are sent once.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&CampaignPayload>,
    ) -> Result<Response, AppError> {
        let max_attempts = if method == Method::GET {
            self.http.max_retries.max(1)
        } else {
            1
        };
        let base_delay = self.http.retry_base_delay();
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=max_attempts {
            self.limiter.acquire().await;

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    // Rate limited - retry with backoff
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < max_attempts {
                            let delay = backoff(base_delay, attempt, true);
                            debug!(%url, attempt, "Megaphone returned 429, backing off");
                            sleep(delay).await;
                            continue;
                        }
                        return Err(last_error);
                    }

                    // Server error - retry
                    if status.is_server_error() && attempt < max_attempts {
                        last_error = rejection(resp).await;
                        debug!(%url, attempt, status = status.as_u16(), "Megaphone server error, retrying");
                        sleep(backoff(base_delay, attempt, false)).await;
                        continue;
                    }

                    return Err(rejection(resp).await);
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    last_error = if e.is_timeout() {
                        AppError::Timeout(self.http.timeout_secs)
                    } else if e.is_connect() {
                        AppError::NetworkError(format!("Connection failed: {}", e))
                    } else {
                        AppError::ClientError(e.to_string())
                    };

                    if attempt < max_attempts && transient {
                        debug!(%url, attempt, error = %e, "Request failed, retrying");
                        sleep(backoff(base_delay, attempt, false)).await;
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }
}

impl RemoteCatalog for MegaphoneClient {
    async fn list_advertisers(&self) -> Result<Vec<Value>, AppError> {
        self.fetch_advertisers().await
    }

    async fn list_campaigns(&self) -> Result<Vec<Value>, AppError> {
        self.fetch_campaigns().await
    }
}

impl RemoteMutator for MegaphoneClient {
    async fn create_campaign(&self, payload: &CampaignPayload) -> Result<Value, AppError> {
        self.post_campaign(payload).await
    }

    async fn update_campaign(
        &self,
        remote_id: &str,
        payload: &CampaignPayload,
    ) -> Result<Value, AppError> {
        self.put_campaign(remote_id, payload).await
    }

    async fn get_campaign(&self, remote_id: &str) -> Result<Value, AppError> {
        self.fetch_campaign(remote_id).await
    }
}

fn organization_url(base_url: &str, organization_id: &str) -> Result<Url, AppError> {
    let mut base = Url::parse(base_url)
        .map_err(|_| AppError::InvalidUrl(format!("Invalid Megaphone URL: {}", base_url)))?;
    if base.cannot_be_a_base() {
        return Err(AppError::InvalidUrl(format!(
            "Invalid Megaphone URL: {}",
            base_url
        )));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base.join("organizations/").map_err(|e| AppError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| AppError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .push(organization_id)
        .push("");
    Ok(url)
}

/// Delay before retrying after `attempt`: `base * 2^attempt` for rate
/// limiting, `base * attempt` otherwise. Saturates instead of overflowing.
fn backoff(base: Duration, attempt: u32, exponential: bool) -> Duration {
    let factor = if exponential {
        2_u32.saturating_pow(attempt)
    } else {
        attempt
    };
    base.saturating_mul(factor)
}

/// Turns a non-success response into `AppError::RemoteRejected`.
async fn rejection(resp: Response) -> AppError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    AppError::RemoteRejected { status, body }
}

async fn read_json(resp: Response) -> Result<Value, AppError> {
    let text = resp
        .text()
        .await
        .map_err(|e| AppError::ClientError(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> Result<MegaphoneClient, AppError> {
        MegaphoneClient::new(
            base,
            "org-1",
            "token",
            &HttpConfig::default(),
            &RateLimitConfig::default(),
        )
    }

    #[test]
    fn test_organization_url_with_and_without_trailing_slash() {
        let a = client("https://cms.megaphone.fm/api").unwrap();
        let b = client("https://cms.megaphone.fm/api/").unwrap();
        assert_eq!(a.org_url.as_str(), "https://cms.megaphone.fm/api/organizations/org-1/");
        assert_eq!(a.org_url, b.org_url);
    }

    #[test]
    fn test_endpoints() {
        let client = client("https://cms.megaphone.fm/api").unwrap();
        assert_eq!(
            client.endpoint("advertisers").unwrap().as_str(),
            "https://cms.megaphone.fm/api/organizations/org-1/advertisers"
        );
        assert_eq!(
            client.campaign_url("abc 1").unwrap().as_str(),
            "https://cms.megaphone.fm/api/organizations/org-1/campaigns/abc%201"
        );
    }

    #[test]
    fn test_backoff() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1, true), Duration::from_secs(1));
        assert_eq!(backoff(base, 3, true), Duration::from_secs(4));
        assert_eq!(backoff(base, 3, false), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_saturates_for_large_attempts() {
        let base = Duration::from_millis(500);
        let capped = backoff(base, 40, true);
        assert_eq!(capped, base.saturating_mul(u32::MAX));
        assert_eq!(backoff(Duration::MAX, 2, false), Duration::MAX);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = client("not-a-valid-url");
        assert!(matches!(result, Err(AppError::InvalidUrl(_))));
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let result = MegaphoneClient::new(
            "https://cms.megaphone.fm/api",
            "org-1",
            "bad\ntoken",
            &HttpConfig::default(),
            &RateLimitConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
