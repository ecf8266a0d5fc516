use crate::traits::PageSource;
use crate::types::{AggregatorError, Contribution, FetchConfig, Result, SubjectType};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(default)]
    data: Vec<CollectionEntry>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    subject_id: u64,
    #[serde(default)]
    rate: u8,
    #[serde(default)]
    subject: Option<SubjectSummary>,
}

#[derive(Debug, Deserialize)]
struct SubjectSummary {
    #[serde(default)]
    name: String,
}

impl From<CollectionEntry> for Contribution {
    fn from(entry: CollectionEntry) -> Self {
        let subject_name = entry
            .subject
            .map(|s| s.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| entry.subject_id.to_string());

        Self {
            subject_id: entry.subject_id,
            subject_name,
            rate: entry.rate,
        }
    }
}

/// HTTP client for the Bangumi `/users/{id}/collections` endpoint.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// The friend id is pushed as a single path segment, so `/`, `?` and `#`
    /// inside it are percent-encoded rather than reshaping the request.
    pub fn collections_url(&self, source_id: &str, subject_type: SubjectType, limit: u32, offset: u32) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AggregatorError::General(format!("{} cannot be used as a base URL", self.config.base_url)))?
            .pop_if_empty()
            .extend(["users", source_id, "collections"]);
        url.query_pairs_mut()
            .append_pair("subject_type", &subject_type.code().to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(
        &self,
        source_id: &str,
        subject_type: SubjectType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Contribution>> {
        let url = self.collections_url(source_id, subject_type, limit, offset)?;
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::PageFetch {
                source_id: source_id.to_string(),
                offset,
                status: status.as_u16(),
            });
        }

        let page: CollectionPage = response.json().await?;
        Ok(page.data.into_iter().map(Contribution::from).collect())
    }
}
