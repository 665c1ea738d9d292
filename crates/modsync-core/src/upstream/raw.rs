//! GameBanana wire format and its conversion into catalog types.
//!
//! List envelopes are parsed strictly (a broken envelope fails the whole
//! page), records leniently: a record that does not match the expected shape
//! is logged and skipped so one bad row never costs a page.

use crate::catalog::{CatalogRecord, Section};
use crate::config::UpstreamConfig;
use crate::upstream::types::{BrowsePage, CategoryNode, ModDetail, ModFile, PortalSection};
use crate::{ModSyncError, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct RawListEnvelope {
    #[serde(rename = "_aMetadata", default)]
    metadata: RawListMetadata,
    #[serde(rename = "_aRecords")]
    records: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawListMetadata {
    #[serde(rename = "_nRecordCount")]
    record_count: Option<u64>,
    #[serde(rename = "_bIsComplete")]
    is_complete: Option<bool>,
    #[serde(rename = "_nPerpage")]
    per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "_idRow")]
    id: u64,
    #[serde(rename = "_sName")]
    name: String,
    #[serde(rename = "_sProfileUrl")]
    profile_url: Option<String>,
    #[serde(rename = "_tsDateAdded", default)]
    date_added: i64,
    #[serde(rename = "_tsDateModified")]
    date_modified: Option<i64>,
    #[serde(rename = "_nLikeCount", default)]
    like_count: u64,
    #[serde(rename = "_nViewCount", default)]
    view_count: u64,
    #[serde(rename = "_bHasFiles", default)]
    has_files: bool,
    #[serde(rename = "_sInitialVisibility")]
    initial_visibility: Option<String>,
    #[serde(rename = "_bHasContentRatings", default)]
    has_content_ratings: bool,
    #[serde(rename = "_aSubmitter")]
    submitter: Option<RawSubmitter>,
    #[serde(rename = "_aPreviewMedia")]
    preview_media: Option<Value>,
    #[serde(rename = "_aRootCategory")]
    root_category: Option<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawSubmitter {
    #[serde(rename = "_idRow")]
    id: Option<u64>,
    #[serde(rename = "_sName")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(rename = "_idRow")]
    id: Option<u64>,
    #[serde(rename = "_sName")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDetail {
    #[serde(rename = "_idRow")]
    id: u64,
    #[serde(rename = "_sName")]
    name: String,
    #[serde(rename = "_sText")]
    text: Option<String>,
    #[serde(rename = "_aCategory")]
    category: Option<RawCategory>,
    #[serde(rename = "_aFiles", default)]
    files: Option<Vec<RawFile>>,
    #[serde(rename = "_aPreviewMedia")]
    preview_media: Option<Value>,
    #[serde(rename = "_bIsNsfw")]
    is_nsfw: Option<bool>,
    #[serde(rename = "_sInitialVisibility")]
    initial_visibility: Option<String>,
    #[serde(rename = "_bHasContentRatings")]
    has_content_ratings: Option<bool>,
    #[serde(rename = "_aContentRatings")]
    content_ratings: Option<Value>,
    #[serde(rename = "_nDownloadCount")]
    download_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(rename = "_idRow")]
    id: u64,
    #[serde(rename = "_sFile")]
    file_name: String,
    #[serde(rename = "_nFilesize", default)]
    file_size: u64,
    #[serde(rename = "_sDownloadUrl")]
    download_url: Option<String>,
    #[serde(rename = "_nDownloadCount", default)]
    download_count: u64,
    #[serde(rename = "_sDescription")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCategoryNode {
    #[serde(rename = "_idRow")]
    id: u64,
    #[serde(rename = "_sName")]
    name: String,
    #[serde(rename = "_nItemCount", default)]
    item_count: u64,
    #[serde(rename = "_sIconUrl")]
    icon_url: Option<String>,
    #[serde(rename = "_idParentRow")]
    parent_id: Option<u64>,
    #[serde(rename = "_aChildren", default)]
    children: Option<Vec<RawCategoryNode>>,
}

#[derive(Debug, Deserialize)]
struct RawPortalSection {
    #[serde(rename = "_sPluralTitle")]
    plural_title: String,
    #[serde(rename = "_sModelName")]
    model_name: String,
    #[serde(rename = "_sCategoryModelName", default)]
    category_model_name: String,
    #[serde(rename = "_nItemCount", default)]
    item_count: u64,
}

fn malformed(what: &str, e: serde_json::Error) -> ModSyncError {
    ModSyncError::UpstreamMalformed {
        message: format!("{}: {}", what, e),
    }
}

/// Parse one list/search page for `section`.
///
/// Records tagged with another model name (the subfeed mixes item types) are
/// dropped silently, records that fail to parse are dropped with a warning.
pub(crate) fn parse_list_page(body: &[u8], section: Section, now: i64) -> Result<BrowsePage> {
    let envelope: RawListEnvelope =
        serde_json::from_slice(body).map_err(|e| malformed("list envelope", e))?;

    let returned = envelope.records.len();
    let mut records = Vec::with_capacity(returned);

    for value in envelope.records {
        if let Some(model) = value.get("_sModelName").and_then(Value::as_str) {
            if model != section.as_str() {
                continue;
            }
        }

        match serde_json::from_value::<RawRecord>(value) {
            Ok(raw) => records.push(record_from_raw(raw, section, now)),
            Err(e) => warn!("Skipping malformed {} record: {}", section, e),
        }
    }

    let per_page = envelope
        .metadata
        .per_page
        .filter(|&n| n > 0)
        .unwrap_or(returned as u32);

    Ok(BrowsePage {
        total_count: envelope.metadata.record_count.unwrap_or(returned as u64),
        is_complete: envelope.metadata.is_complete.unwrap_or(returned == 0),
        per_page,
        raw_count: returned,
        records,
    })
}

fn record_from_raw(raw: RawRecord, section: Section, now: i64) -> CatalogRecord {
    // List pages only carry a proxy; absence of both signals means "unknown".
    let flagged =
        raw.initial_visibility.as_deref() == Some("warn") || raw.has_content_ratings;

    let (submitter_id, submitter_name) = match raw.submitter {
        Some(s) => (s.id, s.name),
        None => (None, None),
    };
    let (category_id, category_name) = match raw.root_category {
        Some(c) => (c.id, c.name),
        None => (None, None),
    };

    CatalogRecord {
        id: raw.id,
        section,
        profile_url: raw
            .profile_url
            .unwrap_or_else(|| default_profile_url(section, raw.id)),
        name: raw.name,
        category_id,
        category_name,
        submitter_id,
        submitter_name,
        like_count: raw.like_count,
        view_count: raw.view_count,
        download_count: None,
        date_added: raw.date_added,
        date_modified: raw.date_modified.unwrap_or(raw.date_added),
        has_files: raw.has_files,
        nsfw: flagged.then_some(true),
        thumbnail_url: raw.preview_media.as_ref().and_then(thumbnail_url),
        cached_at: now,
    }
}

fn default_profile_url(section: Section, id: u64) -> String {
    format!(
        "{}/{}s/{}",
        UpstreamConfig::SITE_BASE,
        section.as_str().to_ascii_lowercase(),
        id
    )
}

/// First preview image, preferring the 530px rendition.
fn thumbnail_url(preview: &Value) -> Option<String> {
    let image = preview.get("_aImages")?.as_array()?.first()?;
    let base = image.get("_sBaseUrl")?.as_str()?;
    let file = image
        .get("_sFile530")
        .and_then(Value::as_str)
        .or_else(|| image.get("_sFile").and_then(Value::as_str))?;
    Some(format!("{}/{}", base.trim_end_matches('/'), file))
}

fn has_ratings(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// Parse a profile page into a detail record.
pub(crate) fn parse_detail(body: &[u8], section: Section) -> Result<ModDetail> {
    let raw: RawDetail = serde_json::from_slice(body).map_err(|e| malformed("detail", e))?;

    let nsfw = raw.is_nsfw.unwrap_or_else(|| {
        raw.initial_visibility.as_deref() == Some("warn")
            || raw.has_content_ratings.unwrap_or(false)
            || raw.content_ratings.as_ref().is_some_and(has_ratings)
    });

    let files: Vec<ModFile> = raw
        .files
        .unwrap_or_default()
        .into_iter()
        .map(|f| ModFile {
            download_url: f
                .download_url
                .unwrap_or_else(|| format!("{}/dl/{}", UpstreamConfig::SITE_BASE, f.id)),
            id: f.id,
            file_name: f.file_name,
            file_size: f.file_size,
            download_count: f.download_count,
            description: f.description.filter(|d| !d.is_empty()),
        })
        .collect();

    let download_count = raw
        .download_count
        .unwrap_or_else(|| files.iter().map(|f| f.download_count).sum());

    let (category_id, category_name) = match raw.category {
        Some(c) => (c.id, c.name),
        None => (None, None),
    };

    Ok(ModDetail {
        id: raw.id,
        section,
        name: raw.name,
        description: raw.text.filter(|t| !t.is_empty()),
        category_id,
        category_name,
        files,
        nsfw,
        download_count,
        thumbnail_url: raw.preview_media.as_ref().and_then(thumbnail_url),
    })
}

/// Parse a nested category structure.
pub(crate) fn parse_category_tree(body: &[u8]) -> Result<Vec<CategoryNode>> {
    let nodes: Vec<RawCategoryNode> =
        serde_json::from_slice(body).map_err(|e| malformed("category tree", e))?;
    Ok(nodes.into_iter().map(category_from_raw).collect())
}

fn category_from_raw(raw: RawCategoryNode) -> CategoryNode {
    CategoryNode {
        id: raw.id,
        name: raw.name,
        item_count: raw.item_count,
        parent_id: raw.parent_id.filter(|&p| p != 0),
        icon_url: raw.icon_url,
        children: raw
            .children
            .unwrap_or_default()
            .into_iter()
            .map(category_from_raw)
            .collect(),
    }
}

/// Parse the game's section list.
pub(crate) fn parse_sections(body: &[u8]) -> Result<Vec<PortalSection>> {
    let sections: Vec<RawPortalSection> =
        serde_json::from_slice(body).map_err(|e| malformed("section list", e))?;
    Ok(sections
        .into_iter()
        .map(|raw| PortalSection {
            section: Section::ALL
                .into_iter()
                .find(|s| s.as_str() == raw.model_name),
            plural_title: raw.plural_title,
            model_name: raw.model_name,
            category_model_name: raw.category_model_name,
            item_count: raw.item_count,
        })
        .collect())
}

/// Category carried on a raw list record, for building the observed map.
pub(crate) fn observed_category(record: &CatalogRecord) -> Option<(u64, String)> {
    let id = record.category_id?;
    let name = record
        .category_name
        .clone()
        .unwrap_or_else(|| format!("Category {}", id));
    Some((id, name))
}

/// Parse an introspection response that is a plain list of names.
pub(crate) fn parse_name_list(body: &[u8]) -> Result<Vec<String>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| malformed("name list", e))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(k, _)| Value::String(k)).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Object(o) => o
                .get("_sAlias")
                .or_else(|| o.get("_sName"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect())
}
