pub mod config;
pub mod document_store;
pub mod relational_store;
pub mod retry;
pub mod store_pair;

pub use config::{DocumentStoreConfig, RelationalStoreConfig};
pub use document_store::DocumentStore;
pub use relational_store::RelationalStore;
pub use store_pair::{StoreHealth, StorePair};
