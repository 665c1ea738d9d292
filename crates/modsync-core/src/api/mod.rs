//! API implementation submodules.
//!
//! Each submodule contains `impl ModSync` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod catalog;
mod downloads;
mod installed;
mod state;
mod sync;

pub use builder::ModSyncBuilder;
pub use catalog::{BrowseRequest, BrowseResult, BrowseSource};
pub use downloads::DownloadRequest;
pub(crate) use state::EngineState;
