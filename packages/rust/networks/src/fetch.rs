//! HTTP retrieval of raw feed payloads.

use std::time::{Duration, Instant};

use feedsync_shared::{Feed, FeedSyncError, FetchConfig, Result};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("feedsync/", env!("CARGO_PKG_VERSION"));

/// Downloads feed payloads. Cheap to clone; clones share a connection pool.
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    /// Create a fetcher with the configured timeout and redirect ceiling.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedSyncError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch a feed's raw payload. Any non-2xx status is a fetch error.
    #[instrument(skip_all, fields(feed = %feed.name, network = %feed.network))]
    pub async fn fetch(&self, feed: &Feed) -> Result<Vec<u8>> {
        let url = Url::parse(&feed.url)
            .map_err(|e| FeedSyncError::Fetch(format!("invalid feed URL '{}': {e}", feed.url)))?;
        let start = Instant::now();
        debug!(%url, "fetching feed");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FeedSyncError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedSyncError::Fetch(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedSyncError::Fetch(format!("{url}: body read failed: {e}")))?;

        info!(
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "feed fetched"
        );
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_shared::{FeedId, FieldMapping, NetworkKind, SiteId};

    fn feed(url: String) -> Feed {
        Feed {
            id: FeedId(1),
            site_id: SiteId(1),
            name: "test feed".into(),
            url,
            network: NetworkKind::Adrecord,
            mapping: FieldMapping::default(),
            allow_empty_description: false,
            sync_categories: true,
        }
    }

    #[tokio::test]
    async fn fetches_body() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(r#"{"Products":[]}"#))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let body = fetcher
            .fetch(&feed(format!("{}/feed.json", server.uri())))
            .await
            .unwrap();
        assert_eq!(body, br#"{"Products":[]}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/feed.json"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&feed(format!("{}/feed.json", server.uri())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn invalid_url_is_fetch_error() {
        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher.fetch(&feed("not a url".into())).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");
    }
}
