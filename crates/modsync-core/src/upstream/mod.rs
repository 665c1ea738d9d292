//! Upstream content portal access.
//!
//! [`UpstreamClient`] is the seam the synchronizer, download queue and
//! enrichment queue talk through; [`GameBananaClient`] is the HTTP
//! implementation. Tests substitute scripted implementations.

mod gamebanana;
mod raw;
mod types;

pub use gamebanana::GameBananaClient;
pub use types::{
    BrowseFilters, BrowsePage, CategoryNode, CategoryTree, ModDetail, ModFile, PortalSection,
};

use crate::catalog::Section;
use crate::network::TransferProgress;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Read-only access to the content portal.
///
/// Implementations absorb transient failures internally; an error returned
/// from any method has already exhausted its retries.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetch one page (1-based) of a section.
    async fn browse(
        &self,
        section: Section,
        page: u32,
        page_size: u32,
        filters: &BrowseFilters,
    ) -> Result<BrowsePage>;

    /// Fetch the authoritative detail view of an item.
    async fn fetch_detail(&self, section: Section, id: u64) -> Result<ModDetail>;

    /// Fetch the category tree of a section, falling back to categories
    /// observed on browsed records when the portal has no tree for it.
    async fn list_categories(&self, section: Section) -> Result<CategoryTree>;

    /// Content sections the portal lists for the game, with item counts.
    async fn list_sections(&self) -> Result<Vec<PortalSection>>;

    /// Stream a file to `destination`, reporting byte progress.
    async fn download_file(
        &self,
        file: &ModFile,
        destination: &Path,
        progress: mpsc::Sender<TransferProgress>,
    ) -> Result<u64>;
}
