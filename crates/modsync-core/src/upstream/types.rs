//! Portal-facing data types, already normalized from the wire format.

use crate::catalog::{CatalogRecord, Section};
use serde::{Deserialize, Serialize};

/// Optional narrowing of a browse request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseFilters {
    pub search: Option<String>,
    pub category_id: Option<u64>,
}

impl BrowseFilters {
    pub(crate) fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One page of a paginated browse.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowsePage {
    pub records: Vec<CatalogRecord>,
    /// Total matching items as reported by the portal.
    pub total_count: u64,
    pub is_complete: bool,
    /// Page size the portal actually used, which may differ from the request.
    pub per_page: u32,
    /// Rows on the page before records of other sections were dropped. Zero
    /// only when the portal itself ran out of rows.
    pub raw_count: usize,
}

/// Downloadable file attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModFile {
    pub id: u64,
    pub file_name: String,
    pub file_size: u64,
    pub download_url: String,
    pub download_count: u64,
    pub description: Option<String>,
}

/// Authoritative detail view of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModDetail {
    pub id: u64,
    pub section: Section,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<u64>,
    pub category_name: Option<String>,
    pub files: Vec<ModFile>,
    /// Authoritative NSFW flag.
    pub nsfw: bool,
    /// Total downloads across files.
    pub download_count: u64,
    pub thumbnail_url: Option<String>,
}

impl ModDetail {
    /// File with the most downloads, the most likely primary archive.
    pub fn primary_file(&self) -> Option<&ModFile> {
        self.files
            .iter()
            .max_by(|a, b| {
                a.download_count
                    .cmp(&b.download_count)
                    // earlier id wins ties
                    .then_with(|| b.id.cmp(&a.id))
            })
    }

    pub fn file(&self, file_id: u64) -> Option<&ModFile> {
        self.files.iter().find(|f| f.id == file_id)
    }
}

/// Node of a category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: u64,
    pub name: String,
    pub item_count: u64,
    pub parent_id: Option<u64>,
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CategoryNode>,
}

/// Categories of a section.
///
/// `canonical` is false when the portal refused the tree and the nodes were
/// assembled from the category field of records seen while paginating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTree {
    pub section: Section,
    pub nodes: Vec<CategoryNode>,
    pub canonical: bool,
}

/// A content section the portal lists for the game.
///
/// `section` is set for the sections this engine syncs; the portal lists
/// others (maps, tools) that are only informational here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSection {
    pub plural_title: String,
    pub model_name: String,
    pub category_model_name: String,
    pub item_count: u64,
    pub section: Option<Section>,
}
