//! In-memory implementation of the document store.

mod matching;
mod store;

pub use store::InMemoryStore;
