//! Catalog browsing, details and enrichment.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{
    CatalogQuery, CatalogRecord, QueryResult, Section, SectionCount, SortKey,
};
use crate::config::UpstreamConfig;
use crate::enrichment;
use crate::error::Result;
use crate::upstream::{BrowseFilters, CategoryNode, CategoryTree, ModDetail, PortalSection};
use crate::ModSync;

/// A browse request from the UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowseRequest {
    pub section: Section,
    pub search: Option<String>,
    pub category_id: Option<u64>,
    pub sort: SortKey,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub hide_nsfw: bool,
}

impl Default for BrowseRequest {
    fn default() -> Self {
        Self {
            section: Section::Mod,
            search: None,
            category_id: None,
            sort: SortKey::default(),
            page: 1,
            page_size: UpstreamConfig::BROWSE_PAGE_SIZE,
            hide_nsfw: false,
        }
    }
}

/// Where a browse result was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BrowseSource {
    Cache,
    Upstream,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResult {
    pub mods: Vec<CatalogRecord>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub is_complete: bool,
    pub source: BrowseSource,
}

impl ModSync {
    /// Browse a section from the catalog while its last sync is fresh, or
    /// from the portal otherwise. Portal pages are cached on the way.
    pub async fn browse_mods(&self, request: BrowseRequest) -> Result<BrowseResult> {
        let page = request.page.max(1);
        let page_size = request.page_size.max(1);

        if self.inner.synchronizer.is_fresh(request.section)? {
            let found = self.inner.store.query(&CatalogQuery {
                section: Some(request.section),
                text: request.search.clone(),
                category_id: request.category_id,
                sort: request.sort,
                limit: page_size as usize,
                offset: (page as usize - 1) * page_size as usize,
                hide_nsfw: request.hide_nsfw,
            })?;
            let is_complete = found.offset + found.mods.len() >= found.total_count;
            return Ok(BrowseResult {
                total_count: found.total_count as u64,
                mods: found.mods,
                page,
                page_size,
                is_complete,
                source: BrowseSource::Cache,
            });
        }

        debug!("{} cache is empty or stale; browsing upstream", request.section);
        let filters = BrowseFilters {
            search: request.search.clone(),
            category_id: request.category_id,
        };
        let fetched = self
            .inner
            .upstream
            .browse(request.section, page, page_size, &filters)
            .await?;
        if let Err(e) = self.inner.store.upsert(&fetched.records) {
            warn!("Failed to cache browsed {} page {}: {}", request.section, page, e);
        }

        let mut mods = fetched.records;
        if request.hide_nsfw {
            mods.retain(|m| m.nsfw != Some(true));
        }
        Ok(BrowseResult {
            mods,
            total_count: fetched.total_count,
            page,
            page_size: fetched.per_page,
            is_complete: fetched.is_complete,
            source: BrowseSource::Upstream,
        })
    }

    /// Query the local catalog only.
    pub fn search_local_mods(&self, query: CatalogQuery) -> Result<QueryResult> {
        self.inner.store.query(&query)
    }

    pub fn get_cached_mod(&self, section: Section, id: u64) -> Result<Option<CatalogRecord>> {
        self.inner.store.get(section, id)
    }

    /// Cached rows in `section`, or in every section when `None`.
    pub fn local_mod_count(&self, section: Option<Section>) -> Result<usize> {
        self.inner.store.count_by_section(section)
    }

    pub fn section_stats(&self) -> Result<Vec<SectionCount>> {
        self.inner.store.section_counts()
    }

    /// Authoritative detail view. Its NSFW flag and download count are
    /// written back to the cached row.
    pub async fn get_mod_details(&self, section: Section, id: u64) -> Result<ModDetail> {
        let detail = self.inner.upstream.fetch_detail(section, id).await?;
        if let Err(e) = enrichment::apply_detail(&self.inner.store, &detail) {
            warn!("Failed to enrich {}/{}: {}", section, id, e);
        }
        Ok(detail)
    }

    /// Category tree of a section.
    ///
    /// Uses the portal's tree when it has one, then the categories seen on
    /// cached rows. Never fails because the portal has no tree.
    pub async fn list_categories(&self, section: Section) -> Result<CategoryTree> {
        match self.inner.upstream.list_categories(section).await {
            Ok(tree) if !tree.nodes.is_empty() => return Ok(tree),
            Ok(_) => debug!("No upstream categories for {}", section),
            Err(e) => warn!("Category lookup for {} failed: {}", section, e),
        }

        let nodes = self
            .inner
            .store
            .categories(section)?
            .into_iter()
            .map(|c| CategoryNode {
                id: c.id,
                name: c.name,
                item_count: c.item_count as u64,
                parent_id: None,
                icon_url: None,
                children: Vec::new(),
            })
            .collect();
        Ok(CategoryTree {
            section,
            nodes,
            canonical: false,
        })
    }

    /// Content sections the portal lists for the game.
    pub async fn list_sections(&self) -> Result<Vec<PortalSection>> {
        self.inner.upstream.list_sections().await
    }

    /// Schedule background detail lookups. Returns how many were scheduled;
    /// ids already pending are not scheduled twice.
    pub fn enrich_mods(&self, section: Section, ids: &[u64]) -> usize {
        self.inner.enrichment.request(section, ids)
    }

    /// Wait for scheduled enrichment to finish.
    pub async fn wait_for_enrichment(&self) {
        self.inner.enrichment.wait_idle().await
    }
}
