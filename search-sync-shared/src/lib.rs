//! # Search Sync Shared
//!
//! Types shared by every stage of the read-model synchronization pipeline:
//!
//! - [`ChangeEvent`]: one committed write-side mutation
//! - [`TodoDocument`] / [`ProductDocument`]: the read-side projections
//! - [`SearchQuery`] / [`SearchPage`]: the query model of the document store

pub mod document;
pub mod event;
pub mod query;
pub mod timestamp;

pub use document::{IndexedDocument, ProductDocument, TodoDocument, CREATED_AT_FIELD};
pub use event::{
    Change, ChangeEvent, Dimensions, EntityKind, EntitySnapshot, Manufacturer, Operation,
    ProductSnapshot, ShapeError, TodoSnapshot,
};
pub use timestamp::parse_lenient;
pub use query::{
    FilterExpr, FilterTerm, QueryMode, QueryParseError, SearchPage, SearchQuery,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
