//! Local catalog cache of portal items.

mod store;
mod types;

pub use store::CatalogStore;
pub use types::{
    CatalogQuery, CatalogRecord, CategorySummary, QueryResult, Section, SectionCount, SortKey,
};
