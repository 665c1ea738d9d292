//! Catalog data model.

use crate::error::{ModSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level content partition on the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    /// Visual mods.
    Mod,
    /// Audio mods.
    Sound,
}

impl Section {
    /// Every section a full sync walks, in sync order.
    pub const ALL: [Section; 2] = [Section::Mod, Section::Sound];

    /// Model name used in portal URLs and stored rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Mod => "Mod",
            Section::Sound => "Sound",
        }
    }

    /// Model name of the section's category tree.
    pub fn category_model_name(&self) -> &'static str {
        match self {
            Section::Mod => "ModCategory",
            Section::Sound => "SoundCategory",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Section::Mod => "Mods",
            Section::Sound => "Sounds",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = ModSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mod" | "mods" | "visual" => Ok(Section::Mod),
            "sound" | "sounds" | "audio" => Ok(Section::Sound),
            other => Err(ModSyncError::Validation {
                field: "section".to_string(),
                message: format!("unknown section '{}'", other),
            }),
        }
    }
}

/// One portal item as cached locally. Identity is `(section, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: u64,
    pub section: Section,
    pub name: String,
    pub category_id: Option<u64>,
    pub category_name: Option<String>,
    pub submitter_id: Option<u64>,
    pub submitter_name: Option<String>,
    pub like_count: u64,
    pub view_count: u64,
    /// Only known after a detail lookup.
    pub download_count: Option<u64>,
    /// Unix seconds.
    pub date_added: i64,
    /// Unix seconds.
    pub date_modified: i64,
    pub has_files: bool,
    /// `None` when the portal has not told us yet.
    pub nsfw: Option<bool>,
    pub thumbnail_url: Option<String>,
    pub profile_url: String,
    /// Unix seconds of the last content change written to the cache.
    pub cached_at: i64,
}

impl CatalogRecord {
    /// Hash of the fields a list page provides, used to tell a real change
    /// from a re-delivery of the same content.
    pub(crate) fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.section.as_str().to_string(),
            self.id.to_string(),
            self.name.clone(),
            format!("{:?}", self.category_id),
            self.category_name.clone().unwrap_or_default(),
            format!("{:?}", self.submitter_id),
            self.submitter_name.clone().unwrap_or_default(),
            self.like_count.to_string(),
            self.view_count.to_string(),
            self.date_added.to_string(),
            self.date_modified.to_string(),
            self.has_files.to_string(),
            format!("{:?}", self.nsfw),
            self.thumbnail_url.clone().unwrap_or_default(),
            self.profile_url.clone(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0x1f]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Sort order for catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Relevance,
    Likes,
    DateAdded,
    DateModified,
    Views,
    Name,
}

impl FromStr for SortKey {
    type Err = ModSyncError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "relevance" | "default" => Ok(SortKey::Relevance),
            "likes" | "popular" => Ok(SortKey::Likes),
            "dateadded" | "new" | "newest" => Ok(SortKey::DateAdded),
            "datemodified" | "updated" => Ok(SortKey::DateModified),
            "views" => Ok(SortKey::Views),
            "name" => Ok(SortKey::Name),
            _ => Err(ModSyncError::Validation {
                field: "sortBy".to_string(),
                message: format!("unknown sort key '{}'", s),
            }),
        }
    }
}

/// Parameters of a catalog query.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub section: Option<Section>,
    pub text: Option<String>,
    pub category_id: Option<u64>,
    pub sort: SortKey,
    pub limit: usize,
    pub offset: usize,
    /// Exclude rows known to be NSFW. Unknown rows are kept.
    pub hide_nsfw: bool,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            section: None,
            text: None,
            category_id: None,
            sort: SortKey::Relevance,
            limit: 50,
            offset: 0,
            hide_nsfw: false,
        }
    }
}

impl CatalogQuery {
    pub fn section(section: Section) -> Self {
        Self {
            section: Some(section),
            ..Self::default()
        }
    }

    /// Trimmed text query, `None` when blank.
    pub(crate) fn text_term(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Page of catalog rows plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub mods: Vec<CatalogRecord>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub query_time_ms: f64,
}

/// Row count of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCount {
    pub section: Section,
    pub count: usize,
}

/// Category observed on cached rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: u64,
    pub name: String,
    pub item_count: usize,
}
