//! Pairwise conflict detection over installed mods.
//!
//! Only enabled mods take part. Two independent facts are reported per pair:
//! an identical priority (the load order becomes ambiguous) and overlapping
//! content paths. Each `(pair, kind)` appears once whatever the input order.

use crate::installed::InstalledMod;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    Priority,
    SameFile,
}

/// One conflict between two installed mods.
///
/// `mod_a` sorts before `mod_b`, so the pair is unordered in meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPair {
    pub mod_a: String,
    pub mod_b: String,
    pub kind: ConflictKind,
    pub detail: String,
}

/// Content paths compare case-insensitively with `/` separators.
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_lowercase()
}

/// Compute every conflict among the enabled mods in `mods`.
///
/// The result is sorted by `(mod_a, mod_b, kind)`.
pub fn detect(mods: &[InstalledMod]) -> Vec<ConflictPair> {
    // Keyed by (a, b, kind) with a < b; the BTreeMap dedups and orders.
    let mut found: BTreeMap<(String, String, ConflictKind), String> = BTreeMap::new();

    let enabled: BTreeMap<&str, (&InstalledMod, BTreeSet<String>)> = mods
        .iter()
        .filter(|m| m.enabled)
        .map(|m| {
            let paths = m.content_paths.iter().map(|p| normalize_path(p)).collect();
            (m.id.as_str(), (m, paths))
        })
        .collect();
    let entries: Vec<_> = enabled.into_iter().collect();

    for (i, (id_a, (a, paths_a))) in entries.iter().enumerate() {
        for (id_b, (b, paths_b)) in &entries[i + 1..] {
            let key = |kind| (id_a.to_string(), id_b.to_string(), kind);

            if a.priority == b.priority {
                found.entry(key(ConflictKind::Priority)).or_insert_with(|| {
                    format!(
                        "{} and {} share priority {}",
                        a.name, b.name, a.priority
                    )
                });
            }

            let shared: Vec<&str> = paths_a.intersection(paths_b).map(String::as_str).collect();
            if !shared.is_empty() {
                found
                    .entry(key(ConflictKind::SameFile))
                    .or_insert_with(|| format!("both provide {}", shared.join(", ")));
            }
        }
    }

    found
        .into_iter()
        .map(|((mod_a, mod_b, kind), detail)| ConflictPair {
            mod_a,
            mod_b,
            kind,
            detail,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_mod(id: &str, priority: u32, paths: &[&str]) -> InstalledMod {
        InstalledMod {
            id: id.to_string(),
            name: id.to_uppercase(),
            file_name: format!("pak{:02}_dir.vpk", priority),
            path: PathBuf::from(id),
            enabled: true,
            priority,
            size: 0,
            installed_at: None,
            content_paths: paths.iter().map(|p| p.to_string()).collect(),
            origin: None,
            description: None,
            thumbnail_url: None,
        }
    }

    #[test]
    fn test_shared_priority_reported_once_in_any_order() {
        let a = create_test_mod("a", 5, &["a.vpk"]);
        let b = create_test_mod("b", 5, &["b.vpk"]);

        let forward = detect(&[a.clone(), b.clone()]);
        let backward = detect(&[b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].kind, ConflictKind::Priority);
        assert_eq!((forward[0].mod_a.as_str(), forward[0].mod_b.as_str()), ("a", "b"));
    }

    #[test]
    fn test_shared_file_adds_exactly_one_pair() {
        let a = create_test_mod("a", 5, &["shared.vpk", "a.vpk"]);
        let b = create_test_mod("b", 5, &["Shared.VPK"]);

        let conflicts = detect(&[b, a]);
        let kinds: Vec<_> = conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ConflictKind::Priority, ConflictKind::SameFile]);
        assert!(conflicts[1].detail.contains("shared.vpk"));
    }

    #[test]
    fn test_disabled_mods_never_conflict() {
        let a = create_test_mod("a", 5, &["x.vpk"]);
        let mut b = create_test_mod("b", 5, &["x.vpk"]);
        b.enabled = false;
        assert!(detect(&[a, b]).is_empty());
    }

    #[test]
    fn test_distinct_mods_do_not_conflict() {
        let mods = vec![
            create_test_mod("a", 1, &["a.vpk"]),
            create_test_mod("b", 2, &["b.vpk"]),
            create_test_mod("c", 3, &["c.vpk"]),
        ];
        assert!(detect(&mods).is_empty());
    }

    #[test]
    fn test_duplicate_input_does_not_duplicate_output() {
        let a = create_test_mod("a", 5, &["x.vpk"]);
        let b = create_test_mod("b", 5, &["x.vpk"]);
        let conflicts = detect(&[a.clone(), b.clone(), a, b]);
        assert_eq!(conflicts.len(), 2);
    }

    #[test]
    fn test_wire_kind_names() {
        assert_eq!(
            serde_json::to_value(ConflictKind::SameFile).unwrap(),
            serde_json::json!("same-file")
        );
    }
}
