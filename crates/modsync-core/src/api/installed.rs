//! Installed mods, load order and conflicts.

use crate::conflicts::{self, ConflictPair};
use crate::error::Result;
use crate::game::{self, GameinfoStatus};
use crate::installed::{CleanupReport, InstalledMod};
use crate::ModSync;

impl ModSync {
    pub fn installed_mods(&self) -> Result<Vec<InstalledMod>> {
        self.inner.installed()?.list()
    }

    pub fn enable_mod(&self, id: &str) -> Result<InstalledMod> {
        self.inner.installed()?.enable(id)
    }

    pub fn disable_mod(&self, id: &str) -> Result<InstalledMod> {
        self.inner.installed()?.disable(id)
    }

    pub fn set_mod_priority(&self, id: &str, priority: u32) -> Result<InstalledMod> {
        self.inner.installed()?.set_priority(id, priority)
    }

    pub fn uninstall_mod(&self, id: &str) -> Result<InstalledMod> {
        self.inner.installed()?.uninstall(id)
    }

    /// Enabled mods in mount order; earlier entries win.
    pub fn load_order(&self) -> Result<Vec<InstalledMod>> {
        self.inner.installed()?.load_order()
    }

    /// Conflicts among the enabled mods, recomputed on every call.
    pub fn conflicts(&self) -> Result<Vec<ConflictPair>> {
        Ok(conflicts::detect(&self.installed_mods()?))
    }

    /// Remove leftover zip, 7z and rar files from the addon directories.
    pub fn cleanup_addons(&self) -> Result<CleanupReport> {
        self.inner.installed()?.cleanup_archives()
    }

    /// Whether the game's `gameinfo.gi` mounts the addon directory.
    pub fn gameinfo_status(&self) -> Result<GameinfoStatus> {
        game::gameinfo_status(self.inner.installed()?.game_path())
    }

    /// Rewrite `gameinfo.gi` so the game mounts the addon directory.
    pub fn fix_gameinfo(&self) -> Result<GameinfoStatus> {
        game::fix_gameinfo(self.inner.installed()?.game_path())
    }
}
