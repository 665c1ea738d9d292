//! Local catalog, portal browsing and enrichment handlers.

use crate::handlers::{
    get_section_param, get_str_param, get_u64_param, parse_params, require_section_param,
    require_u64_param,
};
use crate::server::AppState;
use modsync_core::{BrowseRequest, CatalogQuery, ModSyncError, Result, Section, SortKey};
use serde_json::{json, Value};

/// Build a catalog query from `searchLocalMods` options.
fn catalog_query(params: &Value) -> Result<CatalogQuery> {
    let sort = match get_str_param(params, "sortBy", "sort_by") {
        Some(raw) => raw.parse::<SortKey>().map_err(|e| ModSyncError::InvalidParams {
            message: e.to_string(),
        })?,
        None => SortKey::default(),
    };
    let defaults = CatalogQuery::default();

    Ok(CatalogQuery {
        section: get_section_param(params)?,
        text: get_str_param(params, "query", "query")
            .or_else(|| get_str_param(params, "search", "search"))
            .map(String::from),
        category_id: get_u64_param(params, "categoryId", "category_id"),
        sort,
        limit: get_u64_param(params, "limit", "limit").map_or(defaults.limit, |v| v as usize),
        offset: get_u64_param(params, "offset", "offset").map_or(0, |v| v as usize),
        hide_nsfw: params
            .get("hideNsfw")
            .or_else(|| params.get("hide_nsfw"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub async fn search_local_mods(state: &AppState, params: &Value) -> Result<Value> {
    let result = state.engine.search_local_mods(catalog_query(params)?)?;
    Ok(serde_json::to_value(result)?)
}

pub async fn get_local_mod_count(state: &AppState, params: &Value) -> Result<Value> {
    let count = state.engine.local_mod_count(get_section_param(params)?)?;
    Ok(json!(count))
}

pub async fn get_section_stats(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.section_stats()?)?)
}

pub async fn browse_mods(state: &AppState, params: &Value) -> Result<Value> {
    let request: BrowseRequest = parse_params(params)?;
    Ok(serde_json::to_value(state.engine.browse_mods(request).await?)?)
}

pub async fn get_mod_details(state: &AppState, params: &Value) -> Result<Value> {
    let section = get_section_param(params)?.unwrap_or(Section::Mod);
    let mod_id = require_u64_param(params, "modId", "mod_id")?;
    Ok(serde_json::to_value(
        state.engine.get_mod_details(section, mod_id).await?,
    )?)
}

pub async fn list_categories(state: &AppState, params: &Value) -> Result<Value> {
    let section = require_section_param(params)?;
    Ok(serde_json::to_value(
        state.engine.list_categories(section).await?,
    )?)
}

pub async fn list_sections(state: &AppState, _params: &Value) -> Result<Value> {
    Ok(serde_json::to_value(state.engine.list_sections().await?)?)
}

pub async fn enrich_mods(state: &AppState, params: &Value) -> Result<Value> {
    let section = get_section_param(params)?.unwrap_or(Section::Mod);
    let ids: Vec<u64> = params
        .get("modIds")
        .or_else(|| params.get("mod_ids"))
        .and_then(Value::as_array)
        .ok_or_else(|| ModSyncError::InvalidParams {
            message: "Missing required parameter: modIds".to_string(),
        })?
        .iter()
        .filter_map(Value::as_u64)
        .collect();

    let scheduled = state.engine.enrich_mods(section, &ids);
    Ok(json!({"scheduled": scheduled}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_query_from_options() {
        let query = catalog_query(&json!({
            "section": "Mod",
            "query": "haze",
            "sortBy": "likes",
            "limit": 10,
            "offset": 20,
            "hideNsfw": true
        }))
        .unwrap();
        assert_eq!(query.section, Some(Section::Mod));
        assert_eq!(query.text.as_deref(), Some("haze"));
        assert_eq!(query.sort, SortKey::Likes);
        assert_eq!((query.limit, query.offset), (10, 20));
        assert!(query.hide_nsfw);
    }

    #[test]
    fn test_bad_sort_is_invalid_params() {
        let err = catalog_query(&json!({"sortBy": "sideways"})).unwrap_err();
        assert_eq!(err.to_rpc_error_code(), -32602);
    }
}
