//! Response wrapping for frontend compatibility.
//!
//! Queries answer with the bare data shapes the UI types declare. Mutations
//! answer `{success, ...}` so the UI can treat them uniformly.

use serde_json::{json, Value};

/// Wrap API responses to match the frontend's expected format.
pub fn wrap_response(method: &str, result: Value) -> Value {
    match method {
        // Bool-returning mutations
        "wipeModCache" | "removeFromQueue" => {
            json!({
                "success": result.as_bool().unwrap_or(false)
            })
        }

        // Mutations returning the affected mod
        "enableMod" | "disableMod" | "setModPriority" | "uninstallMod" => {
            json!({
                "success": true,
                "mod": result
            })
        }

        // Sync starts report whether a run began; maintenance reports counts
        "syncAllMods" | "syncSection" | "cleanupAddons" | "fixGameinfo" => {
            let mut wrapped = json!({"success": true});
            if let (Some(target), Some(source)) = (wrapped.as_object_mut(), result.as_object()) {
                target.extend(source.clone());
            }
            wrapped
        }

        // Queries that may come back null answer with an empty list
        "getDownloadQueue" | "getConflicts" | "getInstalledMods" | "getLoadOrder"
        | "getSectionStats" | "listSections" => {
            if result.is_null() {
                json!([])
            } else {
                result
            }
        }

        // Default: return as-is (for methods not explicitly handled)
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_bool_method() {
        let wrapped = wrap_response("removeFromQueue", json!(true));
        assert!(wrapped.get("success").unwrap().as_bool().unwrap());

        let wrapped = wrap_response("removeFromQueue", json!(false));
        assert!(!wrapped.get("success").unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_wrap_mod_mutation() {
        let wrapped = wrap_response("enableMod", json!({"id": "abc"}));
        assert_eq!(wrapped, json!({"success": true, "mod": {"id": "abc"}}));
    }

    #[test]
    fn test_wrap_sync_start() {
        let wrapped = wrap_response("syncAllMods", json!({"started": false, "reason": "already-running"}));
        assert_eq!(
            wrapped,
            json!({"success": true, "started": false, "reason": "already-running"})
        );
    }

    #[test]
    fn test_null_list_becomes_empty() {
        assert_eq!(wrap_response("getConflicts", Value::Null), json!([]));
    }

    #[test]
    fn test_passthrough_method() {
        let data = json!({"mods": [], "totalCount": 0, "offset": 0, "limit": 50});
        let wrapped = wrap_response("searchLocalMods", data.clone());
        assert_eq!(wrapped, data);

        assert_eq!(wrap_response("getCurrentDownload", Value::Null), Value::Null);
    }

    #[test]
    fn test_wrap_cleanup_merges_counts() {
        let wrapped = wrap_response("cleanupAddons", json!({"removedArchives": 2}));
        assert_eq!(wrapped, json!({"success": true, "removedArchives": 2}));
    }
}
