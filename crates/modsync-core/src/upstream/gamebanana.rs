//! GameBanana implementation of [`UpstreamClient`].
//!
//! Provides:
//! - Paginated browse over the game subfeed, search and category index
//! - Profile-page detail lookups memoised for a short TTL
//! - Category trees with a fallback map built from browsed records
//! - Bounded retries that turn empty or unparseable bodies into retries
//!   instead of empty results

use crate::catalog::{CatalogRecord, Section};
use crate::config::UpstreamConfig;
use crate::network::{
    retry_async, FileDownloader, HttpClient, RetryConfig, RetryDecision, TransferProgress,
};
use crate::upstream::raw;
use crate::upstream::{
    BrowseFilters, BrowsePage, CategoryNode, CategoryTree, ModDetail, ModFile, PortalSection,
};
use crate::upstream::UpstreamClient;
use crate::{ModSyncError, Result};
use async_trait::async_trait;
use mini_moka::sync::Cache;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ObservedCategory {
    name: String,
    items: HashSet<u64>,
}

type ObservedMap = HashMap<Section, BTreeMap<u64, ObservedCategory>>;

/// HTTP client for the GameBanana v11 API.
pub struct GameBananaClient {
    http: Arc<HttpClient>,
    downloader: FileDownloader,
    retry: RetryConfig,
    api_base: String,
    game_id: u64,
    detail_cache: Cache<(Section, u64), ModDetail>,
    observed: Mutex<ObservedMap>,
}

impl GameBananaClient {
    /// Create a client against the public API with default pacing.
    pub fn new() -> Result<Self> {
        Ok(Self::with_http_client(HttpClient::new()?))
    }

    /// Create a client over an existing HTTP client.
    pub fn with_http_client(http: HttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            downloader: FileDownloader::new(http.clone()),
            http,
            retry: RetryConfig::default(),
            api_base: UpstreamConfig::API_BASE.to_string(),
            game_id: UpstreamConfig::GAME_ID,
            detail_cache: Cache::builder()
                .time_to_live(UpstreamConfig::DETAIL_CACHE_TTL)
                .max_capacity(UpstreamConfig::DETAIL_CACHE_CAPACITY)
                .build(),
            observed: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_game_id(mut self, game_id: u64) -> Self {
        self.game_id = game_id;
        self
    }

    /// Use `retry` for API calls and file downloads.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.downloader = FileDownloader::new(self.http.clone()).with_retry(retry.clone());
        self.retry = retry;
        self
    }

    fn browse_url(
        &self,
        section: Section,
        page: u32,
        page_size: u32,
        filters: &BrowseFilters,
    ) -> String {
        let model = section.as_str();
        match (filters.search_term(), filters.category_id) {
            (search, Some(category_id)) => {
                let mut url = format!(
                    "{}/{}/Index?_nPerpage={}&_aFilters[Generic_Game]={}&_aFilters[Generic_Category]={}&_nPage={}",
                    self.api_base, model, page_size, self.game_id, category_id, page
                );
                if let Some(search) = search {
                    url.push_str(&format!("&_sSearchString={}", urlencoding::encode(search)));
                }
                url
            }
            (Some(search), None) => format!(
                "{}/Util/Search/Results?_sSearchString={}&_idGameRow={}&_sModelName={}&_nPage={}",
                self.api_base,
                urlencoding::encode(search),
                self.game_id,
                model,
                page
            ),
            (None, None) => format!(
                "{}/Game/{}/Subfeed?_nPage={}&_nPerpage={}&_csvModelInclusions={}&_csvProperties={}",
                self.api_base,
                self.game_id,
                page,
                page_size,
                model,
                UpstreamConfig::LIST_PROPERTIES
            ),
        }
    }

    /// Fetch and parse with retries. Empty and unparseable bodies count as
    /// transient; running out of attempts yields `UpstreamUnavailable`.
    async fn fetch_parsed<T, P>(&self, url: &str, parse: &P) -> Result<T>
    where
        T: Send,
        P: Fn(&[u8]) -> Result<T> + Sync,
    {
        let (result, stats) =
            retry_async(&self.retry, || self.fetch_once(url, parse), classify).await;

        match result {
            Err(e) if stats.exhausted => Err(ModSyncError::UpstreamUnavailable {
                attempts: stats.attempts,
                message: e.to_string(),
            }),
            other => other,
        }
    }

    async fn fetch_once<T, P>(&self, url: &str, parse: &P) -> Result<T>
    where
        P: Fn(&[u8]) -> Result<T> + Sync,
    {
        let body = self.http.get_body(url).await?;
        parse(&body)
    }

    fn observe(&self, section: Section, records: &[CatalogRecord]) {
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        let categories = observed.entry(section).or_default();
        for record in records {
            if let Some((id, name)) = raw::observed_category(record) {
                let entry = categories.entry(id).or_default();
                entry.name = name;
                entry.items.insert(record.id);
            }
        }
    }

    fn observed_tree(&self, section: Section) -> CategoryTree {
        let observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        let nodes = observed
            .get(&section)
            .map(|categories| {
                categories
                    .iter()
                    .map(|(&id, c)| CategoryNode {
                        id,
                        name: c.name.clone(),
                        item_count: c.items.len() as u64,
                        parent_id: None,
                        icon_url: None,
                        children: Vec::new(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        CategoryTree {
            section,
            nodes,
            canonical: false,
        }
    }

    /// Sort aliases the portal accepts for a section's list endpoints.
    pub async fn allowed_sorts(&self, section: Section) -> Result<Vec<String>> {
        let url = format!(
            "{}/Core/List/Section/AllowedSorts?_sModelName={}&_idGameRow={}",
            self.api_base,
            section.as_str(),
            self.game_id
        );
        self.fetch_parsed(&url, &raw::parse_name_list).await
    }

    /// Field names the portal exposes for a section's items.
    pub async fn allowed_fields(&self, section: Section) -> Result<Vec<String>> {
        let url = format!(
            "{}/Core/Item/Data/AllowedFields?_sItemType={}",
            self.api_base,
            section.as_str()
        );
        self.fetch_parsed(&url, &raw::parse_name_list).await
    }
}

fn classify(e: &ModSyncError) -> RetryDecision {
    match e {
        ModSyncError::RateLimited {
            retry_after_secs, ..
        } => RetryDecision::Slow {
            at_least: retry_after_secs.map(Duration::from_secs),
        },
        ModSyncError::UpstreamMalformed { .. } => RetryDecision::Retry,
        e if e.is_retryable() => RetryDecision::Retry,
        _ => RetryDecision::Stop,
    }
}

#[async_trait]
impl UpstreamClient for GameBananaClient {
    async fn browse(
        &self,
        section: Section,
        page: u32,
        page_size: u32,
        filters: &BrowseFilters,
    ) -> Result<BrowsePage> {
        let page = page.max(1);
        let url = self.browse_url(section, page, page_size, filters);
        let now = chrono::Utc::now().timestamp();

        let result = self
            .fetch_parsed(&url, &|body: &[u8]| raw::parse_list_page(body, section, now))
            .await?;

        debug!(
            "Browsed {} page {}: {} records (total {}, per page {}, complete {})",
            section,
            page,
            result.records.len(),
            result.total_count,
            result.per_page,
            result.is_complete
        );

        self.observe(section, &result.records);
        Ok(result)
    }

    async fn fetch_detail(&self, section: Section, id: u64) -> Result<ModDetail> {
        if let Some(detail) = self.detail_cache.get(&(section, id)) {
            debug!("Detail cache hit for {}/{}", section, id);
            return Ok(detail);
        }

        let url = format!("{}/{}/{}/ProfilePage", self.api_base, section.as_str(), id);
        let detail = self
            .fetch_parsed(&url, &|body: &[u8]| raw::parse_detail(body, section))
            .await
            .map_err(|e| match e {
                ModSyncError::UpstreamStatus { status: 404, .. } => ModSyncError::ModNotFound {
                    id: format!("{}/{}", section, id),
                },
                other => other,
            })?;

        self.detail_cache.insert((section, id), detail.clone());
        Ok(detail)
    }

    async fn list_categories(&self, section: Section) -> Result<CategoryTree> {
        let url = format!(
            "{}/Util/{}/NestedStructure?_idGameRow={}",
            self.api_base,
            section.category_model_name(),
            self.game_id
        );

        // Single attempt: the observed map is an acceptable answer.
        let canonical = self
            .http
            .get_body(&url)
            .await
            .and_then(|body| raw::parse_category_tree(&body));

        match canonical {
            Ok(nodes) if !nodes.is_empty() => Ok(CategoryTree {
                section,
                nodes,
                canonical: true,
            }),
            Ok(_) => {
                debug!("Empty category tree for {}, using observed categories", section);
                Ok(self.observed_tree(section))
            }
            Err(e) => {
                warn!(
                    "Category tree unavailable for {} ({}), using observed categories",
                    section, e
                );
                Ok(self.observed_tree(section))
            }
        }
    }

    async fn list_sections(&self) -> Result<Vec<PortalSection>> {
        let url = format!("{}/Game/{}/CategoryTree", self.api_base, self.game_id);
        let sections = self.fetch_parsed(&url, &raw::parse_sections).await?;
        debug!("Portal lists {} sections", sections.len());
        Ok(sections)
    }

    async fn download_file(
        &self,
        file: &ModFile,
        destination: &Path,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<u64> {
        info!("Downloading {} ({} bytes)", file.file_name, file.file_size);
        self.downloader
            .download(&file.download_url, destination, Some(progress))
            .await
    }
}
