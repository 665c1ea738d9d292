//! Mods present in the game's addon tree.

pub mod manager;
pub mod metadata;
pub mod naming;
pub mod types;
pub mod vpk;

pub use manager::InstalledModManager;
pub use metadata::{MetadataStore, ModMetadata};
pub use types::{CleanupReport, InstallInfo, InstalledMod, ModOrigin};
